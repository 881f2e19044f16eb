//! HTTP client for the external pricing engine.
//!
//! The engine answers `GET {base}/modelNo/{key}` with
//! `{"success": bool, "data": [{"sku", "price", "qty", "source"}]}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::PricingError;

/// A per-SKU price/stock fact.
///
/// Produced by the pricing source, and by the comparator when it reads the
/// storefront's variant edges.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VariantRecord {
    pub sku: String,
    pub price: f64,
    pub qty: i64,
    #[serde(default)]
    pub source: String,
}

/// Something that can report price/stock facts for a business key.
#[async_trait]
pub trait PricingSource: Send + Sync {
    async fn price_stock(&self, business_key: &str) -> Result<Vec<VariantRecord>, PricingError>;
}

/// Connection settings for the pricing engine.
#[derive(Debug, Clone)]
pub struct PricingConfig {
    /// Base URL of the engine, without a trailing path.
    pub base_url: String,
    /// Optional bearer token sent as `Authorization`.
    pub token: Option<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl PricingConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

#[derive(Debug, Deserialize)]
struct PriceStockResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Vec<VariantRecord>>,
}

/// Pricing engine client.
pub struct PricingClient {
    base_url: String,
    token: Option<String>,
    http_client: Client,
}

impl PricingClient {
    pub fn new(config: &PricingConfig) -> Result<Self, PricingError> {
        let http_client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            http_client,
        })
    }

    fn url_for(&self, business_key: &str) -> String {
        format!(
            "{}/modelNo/{}",
            self.base_url,
            urlencoding::encode(business_key)
        )
    }
}

#[async_trait]
impl PricingSource for PricingClient {
    async fn price_stock(&self, business_key: &str) -> Result<Vec<VariantRecord>, PricingError> {
        let mut request = self.http_client.get(self.url_for(business_key));
        if let Some(ref token) = self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PricingError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: PriceStockResponse = response
            .json()
            .await
            .map_err(|e| PricingError::ParseError(e.to_string()))?;

        if !parsed.success {
            return Err(PricingError::Unsuccessful(business_key.to_string()));
        }

        let records = parsed.data.unwrap_or_default();
        tracing::debug!(business_key = %business_key, records = records.len(), "Pricing facts fetched");
        Ok(records)
    }
}

/// Pricing source used when no engine is configured: it knows no facts, so no
/// SKU ever compares as mismatched.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledPricing;

#[async_trait]
impl PricingSource for DisabledPricing {
    async fn price_stock(&self, _business_key: &str) -> Result<Vec<VariantRecord>, PricingError> {
        Ok(Vec::new())
    }
}
