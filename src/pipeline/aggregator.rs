//! Result aggregation.
//!
//! The reduction is commutative: outcomes may arrive in any order and produce
//! the same counts. What it does insist on is completeness. A run whose
//! result queue closes before every dispatched job has reported is an error,
//! never a smaller report.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::audit::{CheckError, CorrectionEvent, Problem};
use crate::scheduler::JobOutcome;

use super::report::{AuditReport, CategoryCounts};

/// Errors that prevent a complete aggregate.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// Fewer outcomes arrived than jobs were dispatched.
    #[error("Lost results: expected {expected} outcomes, received {received}")]
    LostResults { expected: usize, received: usize },

    /// A worker reported a run-ending failure.
    #[error("Check of product {product_id} ({model_number}) failed: {source}")]
    Fatal {
        product_id: i64,
        model_number: String,
        #[source]
        source: CheckError,
    },
}

/// Tallies classified products and collects their corrections.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    counts: CategoryCounts,
    received: usize,
    total_variants: usize,
    mismatched_variants: usize,
    corrections: Vec<CorrectionEvent>,
}

/// A complete aggregate, ready for reporting and publishing.
#[derive(Debug)]
pub struct Aggregate {
    pub counts: CategoryCounts,
    pub total_variants: usize,
    pub mismatched_variants: usize,
    pub corrections: Vec<CorrectionEvent>,
}

impl Aggregate {
    pub fn report(&self, run_id: Uuid, started_at: DateTime<Utc>) -> AuditReport {
        AuditReport::new(
            run_id,
            started_at,
            self.counts,
            self.total_variants,
            self.mismatched_variants,
            self.corrections.len(),
        )
    }
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one classified product.
    pub fn record(&mut self, problem: Problem) {
        self.received += 1;
        self.counts.increment(problem.category());
        self.total_variants += problem.variant_count();
        if let Problem::PriceStockMismatch {
            count, corrections, ..
        } = problem
        {
            self.mismatched_variants += count;
            self.corrections.extend(corrections);
        }
    }

    /// Receives outcomes until the queue closes.
    ///
    /// # Errors
    ///
    /// Returns `AggregateError::Fatal` on the first run-ending outcome. The
    /// receiver is dropped on return, so workers still sending stop as well.
    pub async fn drain(&mut self, mut results: mpsc::Receiver<JobOutcome>) -> Result<(), AggregateError> {
        while let Some(outcome) = results.recv().await {
            match outcome.result {
                Ok(problem) => {
                    debug!(
                        product_id = outcome.job.id,
                        worker_id = %outcome.worker_id,
                        category = %problem.category(),
                        "Outcome received"
                    );
                    self.record(problem);
                }
                Err(source) => {
                    error!(
                        product_id = outcome.job.id,
                        model_number = %outcome.job.model_number,
                        error = %source,
                        "Fatal outcome received"
                    );
                    return Err(AggregateError::Fatal {
                        product_id: outcome.job.id,
                        model_number: outcome.job.model_number,
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    /// Completes the aggregate, requiring exactly `expected` outcomes.
    ///
    /// # Errors
    ///
    /// Returns `AggregateError::LostResults` if the count differs.
    pub fn finish(self, expected: usize) -> Result<Aggregate, AggregateError> {
        if self.received != expected {
            return Err(AggregateError::LostResults {
                expected,
                received: self.received,
            });
        }
        Ok(Aggregate {
            counts: self.counts,
            total_variants: self.total_variants,
            mismatched_variants: self.mismatched_variants,
            corrections: self.corrections,
        })
    }

    /// Receives exactly `expected` outcomes and completes the aggregate.
    pub async fn collect(
        results: mpsc::Receiver<JobOutcome>,
        expected: usize,
    ) -> Result<Aggregate, AggregateError> {
        let mut aggregator = Self::new();
        aggregator.drain(results).await?;
        aggregator.finish(expected)
    }
}
