//! catalog-audit: reconciles a storefront catalog with its system of record.
//!
//! A run samples products from the authoritative store, checks each one on
//! the storefront (listing, variants, price/stock) with a pool of workers,
//! aggregates the findings into a report and optionally publishes
//! price/stock corrections to a message bus.

pub mod audit;
pub mod bus;
pub mod cli;
pub mod error;
pub mod pipeline;
pub mod pricing;
pub mod scheduler;
pub mod storage;
pub mod storefront;

// Re-export commonly used error types
pub use error::{BusError, PricingError, StorefrontError};
