//! Message bus used to publish correction events.
//!
//! - **MessageBus**: publish one payload to a topic and wait for its acknowledgement
//! - **RedisStreamBus**: Redis Streams implementation, one `XADD` per message

pub mod redis_stream;

use async_trait::async_trait;

use crate::error::BusError;

pub use redis_stream::RedisStreamBus;

/// A topic-based publisher with per-message acknowledgement.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes `payload` to `topic`, resolving once the bus has acknowledged
    /// it. Returns the bus-assigned message id.
    async fn publish(&self, topic: &str, payload: String) -> Result<String, BusError>;
}
