//! Per-product classification.
//!
//! Checking a product walks a fixed, priority-ordered list of checks:
//!
//! ```text
//!   Listing ──► Variants ──► PriceStock
//!     │            │             │
//!     ▼            ▼             ▼
//!  NotFound   VariantMismatch  PriceStockMismatch
//!  NotUnique                   Ok
//! ```
//!
//! Each check either hands its evidence to the next one or ends the walk with
//! a terminal [`Problem`]. A product that ends at an earlier check is never
//! evaluated by a later one, and later checks only fetch the data they need
//! once the earlier ones have passed.
//!
//! The decision functions are pure; [`Comparator`] does the fetching.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{PricingError, StorefrontError};
use crate::pricing::{PricingSource, VariantRecord};
use crate::scheduler::Job;
use crate::storage::{CatalogStore, DatabaseError};
use crate::storefront::{Listing, StorefrontSource};

use super::problem::{CorrectionEvent, Problem};

/// Errors raised while checking a single product.
#[derive(Debug, Error)]
pub enum CheckError {
    /// The authoritative store failed. Always aborts the run.
    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),

    #[error("Storefront fetch failed: {0}")]
    Storefront(#[from] StorefrontError),

    #[error("Pricing fetch failed: {0}")]
    Pricing(#[from] PricingError),

    #[error("Check timed out after {0:?}")]
    Timeout(Duration),
}

impl CheckError {
    /// Whether this error must abort the whole run rather than the one job.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CheckError::Store(_))
    }
}

/// Result of one check in the listing, variants, price/stock sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision<T> {
    /// Passed; carry the evidence to the next check.
    Continue(T),
    /// Classification is final.
    Terminal(Problem),
}

/// Listing check: zero candidates is `NotFound`, several is `NotUnique`.
pub fn decide_listing(mut listings: Vec<Listing>) -> Decision<Listing> {
    match listings.len() {
        0 => Decision::Terminal(Problem::NotFound),
        1 => Decision::Continue(listings.remove(0)),
        _ => Decision::Terminal(Problem::NotUnique {
            listing_ids: listings.into_iter().map(|l| l.id).collect(),
        }),
    }
}

/// Compares SKU sets without regard to order.
///
/// An empty authoritative set also matches a storefront set holding a single
/// empty SKU: that is how the storefront represents a product without real
/// variants.
pub fn variants_match(authoritative: &[String], storefront: &[String]) -> bool {
    if authoritative.is_empty() && storefront.len() == 1 && storefront[0].is_empty() {
        return true;
    }
    if authoritative.len() != storefront.len() {
        return false;
    }
    let mut a = authoritative.to_vec();
    let mut b = storefront.to_vec();
    a.sort_unstable();
    b.sort_unstable();
    a == b
}

/// Variant check: passes the authoritative SKUs on when the sets match.
pub fn decide_variants(authoritative: Vec<String>, listing: &Listing) -> Decision<Vec<String>> {
    let storefront = listing.variant_skus();
    if variants_match(&authoritative, &storefront) {
        Decision::Continue(authoritative)
    } else {
        Decision::Terminal(Problem::VariantMismatch {
            authoritative,
            storefront,
        })
    }
}

/// Whether the storefront disagrees with the pricing source for one SKU.
///
/// A price difference only counts when both sides have stock, and a quantity
/// difference only counts when both sides have a price. Stale prices on
/// out-of-stock items are not defects.
pub fn is_price_stock_mismatch(truth: &VariantRecord, shown: &VariantRecord) -> bool {
    let price_differs = truth.price != shown.price && truth.qty > 0 && shown.qty > 0;
    let qty_differs = truth.qty != shown.qty && truth.price > 0.0 && shown.price > 0.0;
    price_differs || qty_differs
}

/// Reads the storefront's own price/stock figures off a listing.
///
/// Price text that does not parse as a decimal counts as zero.
pub fn storefront_records(listing: &Listing) -> HashMap<String, VariantRecord> {
    listing
        .variants
        .iter()
        .map(|variant| {
            let price = variant.price.trim().parse::<f64>().unwrap_or_else(|_| {
                warn!(
                    listing_id = %listing.id,
                    sku = %variant.sku,
                    price = %variant.price,
                    "Unparsable storefront price, treating as 0"
                );
                0.0
            });
            (
                variant.sku.clone(),
                VariantRecord {
                    sku: variant.sku.clone(),
                    price,
                    qty: variant.available,
                    source: String::new(),
                },
            )
        })
        .collect()
}

/// Price/stock check over every authoritative SKU.
///
/// A SKU missing from either side compares as price 0 and quantity 0.
pub fn decide_price_stock(
    skus: &[String],
    pricing: &[VariantRecord],
    storefront: &HashMap<String, VariantRecord>,
    timestamp: i64,
) -> Problem {
    let truth: HashMap<&str, &VariantRecord> =
        pricing.iter().map(|r| (r.sku.as_str(), r)).collect();
    let missing = VariantRecord::default();

    let mut corrections = Vec::new();
    for sku in skus {
        let expected = truth.get(sku.as_str()).copied().unwrap_or(&missing);
        let shown = storefront.get(sku).unwrap_or(&missing);
        if is_price_stock_mismatch(expected, shown) {
            info!(
                sku = %sku,
                price = expected.price,
                storefront_price = shown.price,
                qty = expected.qty,
                storefront_qty = shown.qty,
                "Price/stock mismatch"
            );
            let mut record = expected.clone();
            record.sku = sku.clone();
            corrections.push(CorrectionEvent::from_record(&record, timestamp));
        }
    }

    if corrections.is_empty() {
        Problem::Ok {
            variant_count: skus.len(),
        }
    } else {
        Problem::PriceStockMismatch {
            count: corrections.len(),
            variant_count: skus.len(),
            corrections,
        }
    }
}

/// Fetches evidence for a product and classifies it.
pub struct Comparator {
    store: Arc<dyn CatalogStore>,
    storefront: Arc<dyn StorefrontSource>,
    pricing: Arc<dyn PricingSource>,
}

impl Comparator {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        storefront: Arc<dyn StorefrontSource>,
        pricing: Arc<dyn PricingSource>,
    ) -> Self {
        Self {
            store,
            storefront,
            pricing,
        }
    }

    /// Classifies one product.
    ///
    /// # Errors
    ///
    /// Returns `CheckError` when a source cannot be read. Whether that ends
    /// the run is up to the caller; see [`CheckError::is_fatal`].
    pub async fn check(&self, job: &Job) -> Result<Problem, CheckError> {
        let key = job.model_number.as_str();

        let listings = self.storefront.find_listings(key).await?;
        let listing = match decide_listing(listings) {
            Decision::Continue(listing) => listing,
            Decision::Terminal(problem) => {
                match &problem {
                    Problem::NotUnique { listing_ids } => warn!(
                        product_id = job.id,
                        model_number = %key,
                        listing_ids = ?listing_ids,
                        "Product has redundant storefront copies"
                    ),
                    _ => info!(product_id = job.id, model_number = %key, "Product does not exist on storefront"),
                }
                return Ok(problem);
            }
        };

        let authoritative = self.store.variant_skus(job.id).await?;
        let skus = match decide_variants(authoritative, &listing) {
            Decision::Continue(skus) => skus,
            Decision::Terminal(problem) => {
                info!(
                    product_id = job.id,
                    model_number = %key,
                    listing_id = %listing.id,
                    "Variants do not match"
                );
                return Ok(problem);
            }
        };

        let pricing = self.pricing.price_stock(key).await?;
        let shown = storefront_records(&listing);
        let problem = decide_price_stock(&skus, &pricing, &shown, Utc::now().timestamp());

        debug!(product_id = job.id, model_number = %key, category = %problem.category(), "Product checked");
        Ok(problem)
    }
}
