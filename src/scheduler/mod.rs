//! Job dispatch and the worker pool.
//!
//! # Architecture
//!
//! ```text
//!      ┌──────────────┐
//!      │  JobSource   │  reads one product batch from the store
//!      └──────┬───────┘
//!             │ bounded job queue (default capacity 1)
//!   ┌─────────┼─────────┐
//!   ▼         ▼         ▼
//! ┌──────┐ ┌──────┐ ┌──────┐
//! │  W1  │ │  W2  │ │  Wn  │  Comparator per job, under a timeout
//! └──┬───┘ └──┬───┘ └──┬───┘
//!    └────────┼────────┘
//!             │ result queue, one JobOutcome per job
//!             ▼
//!        aggregator
//! ```
//!
//! The small job queue keeps dispatch paced to worker throughput. A shared
//! abort flag lets any worker stop the whole run after a fatal error.

pub mod job;
pub mod source;
pub mod worker_pool;

pub use job::{Job, JobOutcome};
pub use source::{DispatchError, JobSource, PROGRESS_INTERVAL};
pub use worker_pool::{FetchFailurePolicy, PoolError, PoolStats, WorkerPool, WorkerPoolConfig};
