//! Correction publishing.
//!
//! Every correction is published as its own task. A semaphore caps how many
//! are in flight, and failures are counted with an atomic counter shared by
//! all tasks. Failed publishes are not retried within the run.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::audit::CorrectionEvent;
use crate::bus::MessageBus;

/// Errors reported by the publisher.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Some corrections were not acknowledged by the bus.
    #[error("{failed} of {total} messages did not publish successfully")]
    Partial { failed: usize, total: usize },
}

/// Publishes correction events to one topic.
pub struct Publisher {
    bus: Arc<dyn MessageBus>,
    topic: String,
    concurrency: usize,
}

impl Publisher {
    pub fn new(bus: Arc<dyn MessageBus>, topic: impl Into<String>, concurrency: usize) -> Self {
        Self {
            bus,
            topic: topic.into(),
            concurrency: concurrency.max(1),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publishes every event and waits for all acknowledgements.
    ///
    /// Returns the number of acknowledged messages.
    ///
    /// # Errors
    ///
    /// Returns `PublishError::Partial` naming the failed and total counts if
    /// any event could not be encoded, published or acknowledged.
    pub async fn publish_all(&self, events: &[CorrectionEvent]) -> Result<usize, PublishError> {
        let total = events.len();
        if total == 0 {
            return Ok(0);
        }

        info!(total, topic = %self.topic, concurrency = self.concurrency, "Publishing corrections");

        let failed = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (index, event) in events.iter().enumerate() {
            let payload = match event.to_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(index, sku = %event.sku, error = %e, "Failed to encode correction");
                    failed.fetch_add(1, Ordering::SeqCst);
                    continue;
                }
            };

            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                failed.fetch_add(1, Ordering::SeqCst);
                continue;
            };

            let bus = Arc::clone(&self.bus);
            let topic = self.topic.clone();
            let failed = Arc::clone(&failed);
            let sku = event.sku.clone();

            tasks.spawn(async move {
                let _permit = permit;
                match bus.publish(&topic, payload).await {
                    Ok(message_id) => {
                        debug!(index, sku = %sku, message_id = %message_id, "Published correction");
                    }
                    Err(e) => {
                        failed.fetch_add(1, Ordering::SeqCst);
                        warn!(index, sku = %sku, error = %e, "Failed to publish correction");
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                failed.fetch_add(1, Ordering::SeqCst);
                error!(error = %e, "Publish task panicked");
            }
        }

        let failed = failed.load(Ordering::SeqCst);
        if failed > 0 {
            return Err(PublishError::Partial { failed, total });
        }

        info!(published = total, topic = %self.topic, "Corrections published");
        Ok(total)
    }
}
