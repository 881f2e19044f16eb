//! Product classification.
//!
//! [`Comparator`] turns one product into one [`Problem`]; [`Problem`] and
//! [`Category`] are what the rest of the pipeline counts and publishes.

pub mod comparator;
pub mod problem;

pub use comparator::{
    decide_listing, decide_price_stock, decide_variants, is_price_stock_mismatch,
    storefront_records, variants_match, CheckError, Comparator, Decision,
};
pub use problem::{Category, CorrectionEvent, Problem};
