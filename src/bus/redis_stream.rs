//! Redis Streams publisher.
//!
//! Each message is appended with `XADD <topic> * payload <json>`. The entry id
//! Redis returns is the delivery acknowledgement; consumers read the stream
//! through their own consumer groups.

use redis::aio::ConnectionManager;

use async_trait::async_trait;

use crate::error::BusError;

use super::MessageBus;

/// Field name under which the JSON payload is stored in each stream entry.
pub const PAYLOAD_FIELD: &str = "payload";

/// Message bus backed by Redis Streams.
#[derive(Clone)]
pub struct RedisStreamBus {
    /// Redis connection manager (handles reconnection automatically).
    redis: ConnectionManager,
}

impl RedisStreamBus {
    /// Connects to Redis.
    ///
    /// # Errors
    ///
    /// Returns `BusError::ConnectionFailed` if the client cannot be built or
    /// the first connection fails.
    pub async fn connect(redis_url: &str) -> Result<Self, BusError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| BusError::ConnectionFailed(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| BusError::ConnectionFailed(e.to_string()))?;

        Ok(Self { redis })
    }
}

#[async_trait]
impl MessageBus for RedisStreamBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<String, BusError> {
        let mut conn = self.redis.clone();
        let id: String = redis::cmd("XADD")
            .arg(topic)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| BusError::PublishFailed {
                topic: topic.to_string(),
                message: e.to_string(),
            })?;
        Ok(id)
    }
}
