//! Reconciliation pass orchestration.
//!
//! # Architecture
//!
//! - **Config**: every knob of a run, from the environment and CLI overrides
//! - **Aggregator**: commutative reduction of outcomes into counts and corrections
//! - **Report**: per-category counts and ratios, text and JSON
//! - **Publisher**: concurrent, capped correction publishing with failure counting
//! - **Orchestrator**: wires the store, sources, worker pool and bus for one pass
//!
//! # Pass Flow
//!
//! 1. **Dispatch**: the job source reads one product batch and enqueues jobs
//! 2. **Check**: workers classify each product, one outcome per job
//! 3. **Aggregate**: outcomes are counted as they arrive; the total must match
//!    the number of jobs dispatched
//! 4. **Publish**: when corrections are enabled and any exist, they are sent
//!    to the message bus
//!
//! # Example
//!
//! ```rust,ignore
//! use catalog_audit::pipeline::{AuditConfig, AuditOrchestrator};
//!
//! let config = AuditConfig::from_env()?.with_batch_size(50);
//! let orchestrator = AuditOrchestrator::connect(config).await?;
//!
//! let outcome = orchestrator.run().await?;
//! println!("{}", outcome.report);
//! outcome.ensure_published()?;
//! ```

pub mod aggregator;
pub mod config;
pub mod orchestrator;
pub mod publisher;
pub mod report;

pub use aggregator::{Aggregate, AggregateError, ResultAggregator};
pub use config::{AuditConfig, ConfigError};
pub use orchestrator::{AuditError, AuditOrchestrator, AuditOutcome, PublishStatus};
pub use publisher::{PublishError, Publisher};
pub use report::{ratio, AuditReport, CategoryCounts};
