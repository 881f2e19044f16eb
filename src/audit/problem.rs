//! Classification results and correction payloads.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pricing::VariantRecord;

/// A corrective price/stock fact to publish for one storefront SKU.
///
/// Values always come from the pricing source, never from the storefront.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionEvent {
    pub sku: String,
    pub price: f64,
    pub qty: i64,
    pub source: String,
    /// Unix seconds at which the mismatch was observed.
    pub timestamp: i64,
}

impl CorrectionEvent {
    /// Builds a correction from a pricing-source record.
    pub fn from_record(record: &VariantRecord, timestamp: i64) -> Self {
        Self {
            sku: record.sku.clone(),
            price: record.price,
            qty: record.qty,
            source: record.source.clone(),
            timestamp,
        }
    }

    /// JSON payload sent over the bus.
    pub fn to_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Outcome of checking one product. Exactly one per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Problem {
    /// No storefront listing carries the business key.
    NotFound,
    /// More than one listing carries the business key. Needs manual triage.
    NotUnique { listing_ids: Vec<String> },
    /// The listing's variant SKUs differ from the authoritative set.
    VariantMismatch {
        authoritative: Vec<String>,
        storefront: Vec<String>,
    },
    /// Some variants disagree on price or stock with the pricing source.
    PriceStockMismatch {
        count: usize,
        variant_count: usize,
        corrections: Vec<CorrectionEvent>,
    },
    /// Listing, variants and price/stock all agree.
    Ok { variant_count: usize },
    /// An external source could not be read for this product.
    FetchFailed { reason: String },
}

impl Problem {
    pub fn category(&self) -> Category {
        match self {
            Problem::NotFound => Category::NotFound,
            Problem::NotUnique { .. } => Category::NotUnique,
            Problem::VariantMismatch { .. } => Category::VariantMismatch,
            Problem::PriceStockMismatch { .. } => Category::PriceStockMismatch,
            Problem::Ok { .. } => Category::Ok,
            Problem::FetchFailed { .. } => Category::FetchFailed,
        }
    }

    /// Number of variants that reached the price/stock comparison.
    pub fn variant_count(&self) -> usize {
        match self {
            Problem::PriceStockMismatch { variant_count, .. } | Problem::Ok { variant_count } => {
                *variant_count
            }
            _ => 0,
        }
    }

    pub fn corrections(&self) -> &[CorrectionEvent] {
        match self {
            Problem::PriceStockMismatch { corrections, .. } => corrections,
            _ => &[],
        }
    }
}

/// Report category of a [`Problem`].
///
/// `ALL` lists the categories in the order the comparator evaluates them;
/// `FetchFailed` sits outside that order since it can interrupt any step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    NotFound,
    NotUnique,
    VariantMismatch,
    PriceStockMismatch,
    Ok,
    FetchFailed,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::NotFound,
        Category::NotUnique,
        Category::VariantMismatch,
        Category::PriceStockMismatch,
        Category::Ok,
        Category::FetchFailed,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::NotFound => "Not found",
            Category::NotUnique => "Not unique",
            Category::VariantMismatch => "Incorrect variants",
            Category::PriceStockMismatch => "Incorrect price/stock",
            Category::Ok => "Correct",
            Category::FetchFailed => "Fetch failed",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
