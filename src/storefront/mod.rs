//! Storefront listings.
//!
//! The storefront is searched by business key. The search is fuzzy (title
//! wildcard OR exact SKU), so the client narrows the hits down to listings
//! whose model-number metafield equals the key before handing them back.
//!
//! - **StorefrontSource**: the contract the comparator depends on
//! - **ShopifyClient**: GraphQL Admin API implementation

pub mod client;
pub mod types;

pub use client::{escape_search_term, search_query, ShopifyClient, StorefrontConfig};
pub use types::{Listing, ListingImage, ListingVariant, StorefrontSource};
