//! Error types for the external sources the audit talks to.
//!
//! Defines error types for each external collaborator:
//! - Storefront (GraphQL product search)
//! - Pricing source (price/stock facts)
//! - Message bus (correction publishing)
//!
//! Store, scheduling and pipeline errors live next to the code that raises them.

use thiserror::Error;

/// Errors that can occur while querying the storefront.
#[derive(Debug, Error)]
pub enum StorefrontError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Storefront returned status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("GraphQL errors: {0}")]
    GraphQl(String),

    #[error("Failed to parse storefront response: {0}")]
    ParseError(String),
}

/// Errors that can occur while querying the pricing source.
#[derive(Debug, Error)]
pub enum PricingError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Pricing source returned status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Pricing source reported failure for '{0}'")]
    Unsuccessful(String),

    #[error("Failed to parse pricing response: {0}")]
    ParseError(String),
}

/// Errors that can occur while talking to the message bus.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Message bus connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Publish to '{topic}' failed: {message}")]
    PublishFailed { topic: String, message: String },
}
