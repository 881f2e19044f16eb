//! Read contract of the authoritative store.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use super::database::DatabaseError;

/// A non-deleted product from the system of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Internal numeric product id.
    pub id: i64,
    /// Business key shared with the storefront (the model number).
    pub model_number: String,
}

impl ProductRecord {
    pub fn new(id: i64, model_number: impl Into<String>) -> Self {
        Self {
            id,
            model_number: model_number.into(),
        }
    }
}

/// How the product batch is sampled.
///
/// Downstream consumers attach no meaning to the order; random sampling only
/// spreads coverage across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingOrder {
    /// Let the database shuffle rows before applying the limit.
    #[default]
    Random,
    /// Take rows in whatever order the database returns them.
    Unordered,
}

impl std::str::FromStr for SamplingOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "random" | "rand" => Ok(Self::Random),
            "none" | "unordered" => Ok(Self::Unordered),
            other => Err(format!("unknown sampling order '{other}'")),
        }
    }
}

impl std::fmt::Display for SamplingOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Random => write!(f, "random"),
            Self::Unordered => write!(f, "none"),
        }
    }
}

/// Read-only queries the audit needs from the system of record.
///
/// Implementations must tolerate concurrent calls from every worker.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Streams up to `limit` non-deleted products.
    ///
    /// The underlying cursor is released when the stream is dropped, whether it
    /// was drained or abandoned after an error.
    fn sample_products(&self, limit: usize) -> BoxStream<'_, Result<ProductRecord, DatabaseError>>;

    /// Lists the variant SKUs recorded for a product.
    async fn variant_skus(&self, product_id: i64) -> Result<Vec<String>, DatabaseError>;
}
