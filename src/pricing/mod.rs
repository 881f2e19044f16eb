//! Pricing source: ground-truth price and stock per SKU.

pub mod client;

pub use client::{DisabledPricing, PricingClient, PricingConfig, PricingSource, VariantRecord};
