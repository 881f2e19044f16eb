//! Audit run configuration.
//!
//! Everything a run needs is collected here once, from defaults, the
//! environment and CLI overrides, then handed to the orchestrator.

use std::time::Duration;

use thiserror::Error;

use crate::pricing::PricingConfig;
use crate::scheduler::{FetchFailurePolicy, WorkerPoolConfig};
use crate::storage::SamplingOrder;
use crate::storefront::StorefrontConfig;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for one audit run.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    // Store settings
    /// Authoritative store URL (`mysql://…` or `sqlite://…`).
    pub database_url: String,
    /// Maximum number of products checked per run.
    pub batch_size: usize,
    /// How the product batch is sampled.
    pub sampling: SamplingOrder,

    // Scheduling settings
    /// Number of concurrent workers.
    pub num_workers: usize,
    /// Capacity of the job queue between dispatcher and workers.
    pub job_queue_capacity: usize,
    /// Capacity of the result queue; `None` means the batch size.
    pub result_queue_capacity: Option<usize>,
    /// Time limit for checking one product.
    pub job_timeout: Duration,
    /// Handling of storefront/pricing failures.
    pub fetch_failures: FetchFailurePolicy,

    // Correction settings
    /// Whether corrections are published.
    pub fix_enabled: bool,
    /// Maximum number of in-flight publishes.
    pub publish_concurrency: usize,

    // Sources
    /// Storefront connection settings.
    pub storefront: StorefrontConfig,
    /// Pricing source base URL. Without one no price facts are available.
    pub pricing_url: Option<String>,
    /// Optional bearer token for the pricing source.
    pub pricing_token: Option<String>,

    // Bus settings
    /// Redis URL of the message bus.
    pub redis_url: Option<String>,
    /// Stream that receives price/stock corrections.
    pub price_stock_topic: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            batch_size: 200,
            sampling: SamplingOrder::Random,

            num_workers: 2,
            job_queue_capacity: 1,
            result_queue_capacity: None,
            job_timeout: Duration::from_secs(120),
            fetch_failures: FetchFailurePolicy::Isolate,

            fix_enabled: false,
            publish_concurrency: 32,

            storefront: StorefrontConfig::default(),
            pricing_url: None,
            pricing_token: None,

            redis_url: None,
            price_stock_topic: None,
        }
    }
}

impl AuditConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DATABASE_URL`: authoritative store URL (required)
    /// - `AUDIT_BATCH_SIZE`: products per run (default: 200)
    /// - `AUDIT_SAMPLING`: `random` or `none` (default: random)
    /// - `AUDIT_WORKERS`: worker count (default: 2)
    /// - `AUDIT_JOB_QUEUE_CAPACITY`: job queue capacity (default: 1)
    /// - `AUDIT_RESULT_QUEUE_CAPACITY`: result queue capacity (default: batch size)
    /// - `AUDIT_JOB_TIMEOUT_SECS`: per-product timeout (default: 120)
    /// - `AUDIT_FETCH_FAILURES`: `isolate` or `abort` (default: isolate)
    /// - `AUDIT_FIX` or `IS_DO_FIX`: publish corrections (default: false)
    /// - `AUDIT_PUBLISH_CONCURRENCY`: in-flight publishes (default: 32)
    /// - `SHOPIFY_SHOP`, `SHOPIFY_TOKEN`, `SHOPIFY_LOCATION_ID`: storefront access
    /// - `SHOPIFY_API_VERSION`: Admin API version (default: 2022-01)
    /// - `SHOPIFY_ENDPOINT`: full GraphQL endpoint override
    /// - `PRICING_URL` or `NEXUS_PRICE_ENGINE`: pricing source base URL
    /// - `PRICING_TOKEN`: pricing source bearer token
    /// - `REDIS_URL`: message bus URL (required with corrections)
    /// - `PRICE_STOCK_TOPIC` or `PUBSUB_PRICE_STOCK`: correction stream (required with corrections)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or have invalid values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary variable lookup.
    ///
    /// Used by [`from_env`](Self::from_env); the lookup makes the parsing
    /// testable without touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |keys: &[&'static str]| -> Option<(String, &'static str)> {
            keys.iter()
                .find_map(|&key| lookup(key).map(|val| (val, key)))
        };

        // Store settings - DATABASE_URL is required
        config.database_url = lookup("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        if let Some((val, key)) = var(&["AUDIT_BATCH_SIZE"]) {
            config.batch_size = parse_env_value(&val, key)?;
        }

        if let Some((val, key)) = var(&["AUDIT_SAMPLING"]) {
            config.sampling = parse_env_value(&val, key)?;
        }

        // Scheduling settings
        if let Some((val, key)) = var(&["AUDIT_WORKERS"]) {
            config.num_workers = parse_env_value(&val, key)?;
        }

        if let Some((val, key)) = var(&["AUDIT_JOB_QUEUE_CAPACITY"]) {
            config.job_queue_capacity = parse_env_value(&val, key)?;
        }

        if let Some((val, key)) = var(&["AUDIT_RESULT_QUEUE_CAPACITY"]) {
            config.result_queue_capacity = Some(parse_env_value(&val, key)?);
        }

        if let Some((val, key)) = var(&["AUDIT_JOB_TIMEOUT_SECS"]) {
            let secs: u64 = parse_env_value(&val, key)?;
            config.job_timeout = Duration::from_secs(secs);
        }

        if let Some((val, key)) = var(&["AUDIT_FETCH_FAILURES"]) {
            config.fetch_failures = parse_env_value(&val, key)?;
        }

        // Correction settings
        if let Some((val, key)) = var(&["AUDIT_FIX", "IS_DO_FIX"]) {
            config.fix_enabled = parse_env_bool(&val, key)?;
        }

        if let Some((val, key)) = var(&["AUDIT_PUBLISH_CONCURRENCY"]) {
            config.publish_concurrency = parse_env_value(&val, key)?;
        }

        // Storefront settings
        if let Some(val) = lookup("SHOPIFY_SHOP") {
            config.storefront.shop = val;
        }
        if let Some(val) = lookup("SHOPIFY_TOKEN") {
            config.storefront.access_token = val;
        }
        if let Some(val) = lookup("SHOPIFY_LOCATION_ID") {
            config.storefront.location_id = val;
        }
        if let Some(val) = lookup("SHOPIFY_API_VERSION") {
            config.storefront.api_version = val;
        }
        config.storefront.endpoint = lookup("SHOPIFY_ENDPOINT").filter(|v| !v.is_empty());

        // Pricing settings
        config.pricing_url = var(&["PRICING_URL", "NEXUS_PRICE_ENGINE"])
            .map(|(val, _)| val)
            .filter(|v| !v.is_empty());
        config.pricing_token = lookup("PRICING_TOKEN").filter(|v| !v.is_empty());

        // Bus settings
        config.redis_url = lookup("REDIS_URL").filter(|v| !v.is_empty());
        config.price_stock_topic = var(&["PRICE_STOCK_TOPIC", "PUBSUB_PRICE_STOCK"])
            .map(|(val, _)| val)
            .filter(|v| !v.is_empty());

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "database_url cannot be empty".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        // Scheduling validation
        if self.num_workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "num_workers must be greater than 0".to_string(),
            ));
        }

        if self.job_queue_capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "job_queue_capacity must be greater than 0".to_string(),
            ));
        }

        if self.result_queue_capacity() < self.batch_size {
            return Err(ConfigError::ValidationFailed(format!(
                "result_queue_capacity ({}) must be at least batch_size ({})",
                self.result_queue_capacity(),
                self.batch_size
            )));
        }

        if self.job_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "job_timeout must be greater than 0".to_string(),
            ));
        }

        if self.publish_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "publish_concurrency must be greater than 0".to_string(),
            ));
        }

        // Storefront validation
        if self.storefront.shop.is_empty() && self.storefront.endpoint.is_none() {
            return Err(ConfigError::ValidationFailed(
                "storefront shop or endpoint must be set".to_string(),
            ));
        }

        if self.storefront.access_token.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "storefront access_token cannot be empty".to_string(),
            ));
        }

        if self.storefront.location_id.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "storefront location_id cannot be empty".to_string(),
            ));
        }

        // Bus validation, only needed when corrections are published
        if self.fix_enabled {
            if self.redis_url.is_none() {
                return Err(ConfigError::ValidationFailed(
                    "redis_url is required when corrections are enabled".to_string(),
                ));
            }
            if self.price_stock_topic.is_none() {
                return Err(ConfigError::ValidationFailed(
                    "price_stock_topic is required when corrections are enabled".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Effective result queue capacity.
    pub fn result_queue_capacity(&self) -> usize {
        self.result_queue_capacity.unwrap_or(self.batch_size)
    }

    /// Worker pool settings derived from this configuration.
    pub fn worker_pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig::new(self.num_workers)
            .with_job_timeout(self.job_timeout)
            .with_fetch_failures(self.fetch_failures)
    }

    /// Pricing client settings, if a pricing source is configured.
    pub fn pricing_config(&self) -> Option<PricingConfig> {
        self.pricing_url.as_ref().map(|url| {
            let config = PricingConfig::new(url.clone());
            match &self.pricing_token {
                Some(token) => config.with_token(token.clone()),
                None => config,
            }
        })
    }

    /// Builder method to set database URL.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    /// Builder method to set the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Builder method to set the sampling order.
    pub fn with_sampling(mut self, sampling: SamplingOrder) -> Self {
        self.sampling = sampling;
        self
    }

    /// Builder method to set the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.num_workers = workers;
        self
    }

    /// Builder method to set the job queue capacity.
    pub fn with_job_queue_capacity(mut self, capacity: usize) -> Self {
        self.job_queue_capacity = capacity;
        self
    }

    /// Builder method to set the result queue capacity.
    pub fn with_result_queue_capacity(mut self, capacity: usize) -> Self {
        self.result_queue_capacity = Some(capacity);
        self
    }

    /// Builder method to set the per-product timeout.
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Builder method to set the fetch failure policy.
    pub fn with_fetch_failures(mut self, policy: FetchFailurePolicy) -> Self {
        self.fetch_failures = policy;
        self
    }

    /// Builder method to enable or disable corrections.
    pub fn with_fix(mut self, enabled: bool) -> Self {
        self.fix_enabled = enabled;
        self
    }

    /// Builder method to set publish concurrency.
    pub fn with_publish_concurrency(mut self, concurrency: usize) -> Self {
        self.publish_concurrency = concurrency;
        self
    }

    /// Builder method to set storefront settings.
    pub fn with_storefront(mut self, storefront: StorefrontConfig) -> Self {
        self.storefront = storefront;
        self
    }

    /// Builder method to set the pricing source URL.
    pub fn with_pricing_url(mut self, url: impl Into<String>) -> Self {
        self.pricing_url = Some(url.into());
        self
    }

    /// Builder method to set the message bus.
    pub fn with_bus(mut self, redis_url: impl Into<String>, topic: impl Into<String>) -> Self {
        self.redis_url = Some(redis_url.into());
        self.price_stock_topic = Some(topic.into());
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid_config() -> AuditConfig {
        AuditConfig::new()
            .with_database_url("sqlite::memory:")
            .with_storefront(StorefrontConfig {
                shop: "shop.example.com".to_string(),
                access_token: "shpat_test".to_string(),
                location_id: "42".to_string(),
                ..Default::default()
            })
    }

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE_VARS: [(&str, &str); 4] = [
        ("DATABASE_URL", "mysql://audit@localhost/catalog"),
        ("SHOPIFY_SHOP", "shop.example.com"),
        ("SHOPIFY_TOKEN", "shpat_test"),
        ("SHOPIFY_LOCATION_ID", "42"),
    ];

    fn with_base(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        let mut vars = BASE_VARS.to_vec();
        vars.extend_from_slice(extra);
        vars
    }

    #[test]
    fn test_default_config() {
        let config = AuditConfig::default();
        assert_eq!(config.batch_size, 200);
        assert_eq!(config.sampling, SamplingOrder::Random);
        assert_eq!(config.num_workers, 2);
        assert_eq!(config.job_queue_capacity, 1);
        assert_eq!(config.result_queue_capacity(), 200);
        assert_eq!(config.job_timeout, Duration::from_secs(120));
        assert_eq!(config.fetch_failures, FetchFailurePolicy::Isolate);
        assert!(!config.fix_enabled);
        assert_eq!(config.publish_concurrency, 32);
        assert_eq!(config.storefront.api_version, "2022-01");
        assert!(config.pricing_config().is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = valid_config()
            .with_batch_size(10)
            .with_sampling(SamplingOrder::Unordered)
            .with_workers(4)
            .with_job_queue_capacity(2)
            .with_result_queue_capacity(50)
            .with_job_timeout(Duration::from_secs(5))
            .with_fetch_failures(FetchFailurePolicy::Abort)
            .with_fix(true)
            .with_publish_concurrency(8)
            .with_pricing_url("http://pricing.local")
            .with_bus("redis://localhost:6379", "price-stock");

        assert_eq!(config.batch_size, 10);
        assert_eq!(config.sampling, SamplingOrder::Unordered);
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.job_queue_capacity, 2);
        assert_eq!(config.result_queue_capacity(), 50);
        assert_eq!(config.publish_concurrency, 8);
        assert!(config.fix_enabled);
        assert!(config.validate().is_ok());

        let pool = config.worker_pool_config();
        assert_eq!(pool.num_workers, 4);
        assert_eq!(pool.job_timeout, Duration::from_secs(5));
        assert_eq!(pool.fetch_failures, FetchFailurePolicy::Abort);

        let pricing = config.pricing_config().unwrap();
        assert_eq!(pricing.base_url, "http://pricing.local");
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validation_zero_values() {
        let cases = [
            (valid_config().with_batch_size(0), "batch_size"),
            (valid_config().with_workers(0), "num_workers"),
            (valid_config().with_job_queue_capacity(0), "job_queue_capacity"),
            (valid_config().with_job_timeout(Duration::ZERO), "job_timeout"),
            (valid_config().with_publish_concurrency(0), "publish_concurrency"),
        ];
        for (config, field) in cases {
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains(field), "{err} should mention {field}");
        }
    }

    #[test]
    fn test_validation_result_queue_smaller_than_batch() {
        let config = valid_config()
            .with_batch_size(100)
            .with_result_queue_capacity(10);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("result_queue_capacity"));
    }

    #[test]
    fn test_validation_storefront_required() {
        let config = valid_config().with_storefront(StorefrontConfig::default());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("storefront"));
    }

    #[test]
    fn test_validation_fix_requires_bus() {
        let config = valid_config().with_fix(true);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("redis_url"));
    }

    #[test]
    fn test_from_lookup_requires_database_url() {
        let err = AuditConfig::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "DATABASE_URL"));
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = AuditConfig::from_lookup(lookup_from(&BASE_VARS)).unwrap();
        assert_eq!(config.database_url, "mysql://audit@localhost/catalog");
        assert_eq!(config.batch_size, 200);
        assert_eq!(config.storefront.location_gid(), "gid://shopify/Location/42");
        assert!(config.pricing_url.is_none());
        assert!(!config.fix_enabled);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars = with_base(&[
            ("AUDIT_BATCH_SIZE", "50"),
            ("AUDIT_SAMPLING", "none"),
            ("AUDIT_WORKERS", "8"),
            ("AUDIT_JOB_TIMEOUT_SECS", "30"),
            ("AUDIT_FETCH_FAILURES", "abort"),
            ("AUDIT_FIX", "true"),
            ("PRICING_URL", "http://pricing.local"),
            ("PRICING_TOKEN", "secret"),
            ("REDIS_URL", "redis://bus:6379"),
            ("PRICE_STOCK_TOPIC", "price-stock"),
            ("SHOPIFY_ENDPOINT", "http://localhost:9000/graphql.json"),
        ]);
        let config = AuditConfig::from_lookup(lookup_from(&vars)).unwrap();

        assert_eq!(config.batch_size, 50);
        assert_eq!(config.result_queue_capacity(), 50);
        assert_eq!(config.sampling, SamplingOrder::Unordered);
        assert_eq!(config.num_workers, 8);
        assert_eq!(config.job_timeout, Duration::from_secs(30));
        assert_eq!(config.fetch_failures, FetchFailurePolicy::Abort);
        assert!(config.fix_enabled);
        assert_eq!(config.pricing_token.as_deref(), Some("secret"));
        assert_eq!(config.redis_url.as_deref(), Some("redis://bus:6379"));
        assert_eq!(config.price_stock_topic.as_deref(), Some("price-stock"));
        assert_eq!(
            config.storefront.endpoint_url(),
            "http://localhost:9000/graphql.json"
        );
    }

    #[test]
    fn test_from_lookup_legacy_names() {
        let vars = with_base(&[
            ("IS_DO_FIX", "1"),
            ("NEXUS_PRICE_ENGINE", "http://nexus.local"),
            ("REDIS_URL", "redis://bus:6379"),
            ("PUBSUB_PRICE_STOCK", "legacy-topic"),
        ]);
        let config = AuditConfig::from_lookup(lookup_from(&vars)).unwrap();

        assert!(config.fix_enabled);
        assert_eq!(config.pricing_url.as_deref(), Some("http://nexus.local"));
        assert_eq!(config.price_stock_topic.as_deref(), Some("legacy-topic"));
    }

    #[test]
    fn test_from_lookup_invalid_value() {
        let vars = with_base(&[("AUDIT_WORKERS", "many")]);
        let err = AuditConfig::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "AUDIT_WORKERS"));

        let vars = with_base(&[("AUDIT_FETCH_FAILURES", "retry")]);
        assert!(AuditConfig::from_lookup(lookup_from(&vars)).is_err());
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("true", "test").unwrap());
        assert!(parse_env_bool("1", "test").unwrap());
        assert!(parse_env_bool("YES", "test").unwrap());
        assert!(!parse_env_bool("off", "test").unwrap());
        assert!(!parse_env_bool("", "test").unwrap());
        assert!(parse_env_bool("maybe", "test").is_err());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingEnvVar("TEST_VAR".to_string());
        assert!(err.to_string().contains("TEST_VAR"));

        let err = ConfigError::InvalidValue {
            key: "KEY".to_string(),
            message: "bad value".to_string(),
        };
        assert!(err.to_string().contains("KEY"));
        assert!(err.to_string().contains("bad value"));
    }
}
