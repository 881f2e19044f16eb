//! Job and outcome types passed between the dispatcher, the workers and the
//! aggregator.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audit::{CheckError, Problem};
use crate::storage::ProductRecord;

/// One unit of work: a product to check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Authoritative product id.
    pub id: i64,
    /// Business key shared with the storefront and pricing source.
    pub model_number: String,
}

impl Job {
    pub fn new(id: i64, model_number: impl Into<String>) -> Self {
        Self {
            id,
            model_number: model_number.into(),
        }
    }
}

impl From<ProductRecord> for Job {
    fn from(record: ProductRecord) -> Self {
        Self {
            id: record.id,
            model_number: record.model_number,
        }
    }
}

/// What a worker sends back for each job it took.
#[derive(Debug)]
pub struct JobOutcome {
    pub job: Job,
    pub worker_id: String,
    pub result: Result<Problem, CheckError>,
    pub duration: Duration,
}

impl JobOutcome {
    /// Whether this outcome must abort the run.
    ///
    /// Failures the pool isolates arrive as `Ok(Problem::FetchFailed)`, so any
    /// error left here is run-ending.
    pub fn is_fatal(&self) -> bool {
        self.result.is_err()
    }
}
