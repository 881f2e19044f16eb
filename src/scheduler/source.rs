//! Feeds products from the authoritative store into the job queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::TryStreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::storage::{CatalogStore, DatabaseError};

use super::job::Job;

/// Dispatch progress is logged every this many jobs.
pub const PROGRESS_INTERVAL: usize = 50;

/// Errors that stop dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Reading the product batch failed.
    #[error("Failed to read product batch: {0}")]
    Store(#[from] DatabaseError),

    /// Every worker dropped its end of the job queue.
    #[error("Job queue closed after {dispatched} jobs")]
    QueueClosed { dispatched: usize },
}

/// Reads one batch of products and enqueues a job for each.
pub struct JobSource {
    store: Arc<dyn CatalogStore>,
    batch_size: usize,
}

impl JobSource {
    pub fn new(store: Arc<dyn CatalogStore>, batch_size: usize) -> Self {
        Self { store, batch_size }
    }

    /// Enqueues up to `batch_size` jobs and returns how many were sent.
    ///
    /// Sending waits while the queue is full. Dispatch stops early, without
    /// error, once `abort` is set; the count then covers only the jobs that
    /// were actually enqueued. The store cursor is released on every return
    /// path.
    pub async fn dispatch(
        &self,
        jobs: &mpsc::Sender<Job>,
        abort: &AtomicBool,
    ) -> Result<usize, DispatchError> {
        let mut products = self.store.sample_products(self.batch_size);
        let mut dispatched = 0usize;

        while dispatched < self.batch_size {
            if abort.load(Ordering::SeqCst) {
                warn!(dispatched, "Abort requested, dispatch stopped");
                break;
            }

            let Some(product) = products.try_next().await? else {
                break;
            };

            debug!(product_id = product.id, model_number = %product.model_number, "Dispatching job");
            jobs.send(Job::from(product))
                .await
                .map_err(|_| DispatchError::QueueClosed { dispatched })?;
            dispatched += 1;

            if dispatched % PROGRESS_INTERVAL == 0 {
                info!(dispatched, batch_size = self.batch_size, "Dispatch progress");
            }
        }

        info!(dispatched, "Dispatch finished");
        Ok(dispatched)
    }
}
