//! Audit orchestrator: one reconciliation pass from dispatch to publish.
//!
//! The orchestrator owns the collaborators for a run. It does not hold any
//! per-run state, so the same instance can run repeatedly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::audit::{CheckError, Comparator, CorrectionEvent, Problem};
use crate::bus::{MessageBus, RedisStreamBus};
use crate::error::{BusError, PricingError, StorefrontError};
use crate::pricing::{DisabledPricing, PricingClient, PricingSource};
use crate::scheduler::{DispatchError, Job, JobSource, PoolError, WorkerPool};
use crate::storage::{CatalogStore, DatabaseError, SqlCatalogStore};
use crate::storefront::{ShopifyClient, StorefrontSource};

use super::aggregator::{AggregateError, ResultAggregator};
use super::config::{AuditConfig, ConfigError};
use super::publisher::{PublishError, Publisher};
use super::report::AuditReport;

/// Errors that end a run without a report.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Store connection failed.
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Storefront client could not be built.
    #[error("Storefront client error: {0}")]
    Storefront(#[from] StorefrontError),

    /// Pricing client could not be built.
    #[error("Pricing client error: {0}")]
    Pricing(#[from] PricingError),

    /// Message bus connection failed.
    #[error("Message bus error: {0}")]
    Bus(#[from] BusError),

    /// Corrections are enabled but no bus was supplied.
    #[error("Corrections are enabled but no message bus is configured")]
    MissingBus,

    /// Reading or enqueueing the product batch failed.
    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    /// A worker did not exit cleanly.
    #[error("Worker pool failed: {0}")]
    Pool(#[from] PoolError),

    /// Aggregation was incomplete or saw a fatal check.
    #[error("Aggregation failed: {0}")]
    Aggregate(#[from] AggregateError),

    /// The single-product check failed.
    #[error("Check failed: {0}")]
    Check(#[from] CheckError),
}

/// What happened to the corrections of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishStatus {
    /// Corrections are disabled for this run.
    Disabled,
    /// Enabled, but the run produced no corrections.
    NothingToPublish,
    /// Every correction was acknowledged.
    Published { count: usize },
    /// Some corrections were not acknowledged.
    Failed { failed: usize, total: usize },
}

/// Result of a completed pass.
#[derive(Debug, Clone, Serialize)]
pub struct AuditOutcome {
    pub report: AuditReport,
    pub publish: PublishStatus,
    #[serde(skip)]
    pub corrections: Vec<CorrectionEvent>,
}

impl AuditOutcome {
    /// Fails when corrections were only partially published.
    ///
    /// # Errors
    ///
    /// Returns `PublishError::Partial` naming the failed and total counts.
    pub fn ensure_published(&self) -> Result<(), PublishError> {
        match self.publish {
            PublishStatus::Failed { failed, total } => Err(PublishError::Partial { failed, total }),
            _ => Ok(()),
        }
    }
}

/// Runs reconciliation passes.
pub struct AuditOrchestrator {
    config: AuditConfig,
    store: Arc<dyn CatalogStore>,
    comparator: Arc<Comparator>,
    publisher: Option<Publisher>,
}

impl AuditOrchestrator {
    /// Creates an orchestrator from explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Config` if the configuration is invalid and
    /// `AuditError::MissingBus` if corrections are enabled without a bus.
    pub fn new(
        config: AuditConfig,
        store: Arc<dyn CatalogStore>,
        storefront: Arc<dyn StorefrontSource>,
        pricing: Arc<dyn PricingSource>,
        bus: Option<Arc<dyn MessageBus>>,
    ) -> Result<Self, AuditError> {
        config.validate()?;

        let publisher = if config.fix_enabled {
            let bus = bus.ok_or(AuditError::MissingBus)?;
            let topic = config
                .price_stock_topic
                .clone()
                .ok_or_else(|| ConfigError::MissingEnvVar("PRICE_STOCK_TOPIC".to_string()))?;
            Some(Publisher::new(bus, topic, config.publish_concurrency))
        } else {
            None
        };

        let comparator = Arc::new(Comparator::new(Arc::clone(&store), storefront, pricing));

        Ok(Self {
            config,
            store,
            comparator,
            publisher,
        })
    }

    /// Connects to every collaborator named in the configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuditError` if the configuration is invalid or the store or
    /// message bus cannot be reached.
    pub async fn connect(config: AuditConfig) -> Result<Self, AuditError> {
        config.validate()?;

        let store = SqlCatalogStore::connect(&config.database_url, config.sampling).await?;
        let storefront = ShopifyClient::new(&config.storefront)?;

        let pricing: Arc<dyn PricingSource> = match config.pricing_config() {
            Some(pricing) => Arc::new(PricingClient::new(&pricing)?),
            None => {
                warn!("No pricing source configured, price/stock will never mismatch");
                Arc::new(DisabledPricing)
            }
        };

        let bus: Option<Arc<dyn MessageBus>> = match (&config.redis_url, config.fix_enabled) {
            (Some(url), true) => Some(Arc::new(RedisStreamBus::connect(url).await?)),
            _ => None,
        };

        Self::new(config, Arc::new(store), Arc::new(storefront), pricing, bus)
    }

    /// Runs one reconciliation pass.
    ///
    /// Returns once the batch has been dispatched, checked, aggregated and,
    /// when enabled, published. A partial publish failure still yields an
    /// outcome; see [`AuditOutcome::ensure_published`].
    ///
    /// # Errors
    ///
    /// Returns `AuditError` on a fatal check, a store failure, a worker panic
    /// or a lost result.
    pub async fn run(&self) -> Result<AuditOutcome, AuditError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("audit_run", run_id = %run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid) -> Result<AuditOutcome, AuditError> {
        let started_at = Utc::now();
        info!(
            batch_size = self.config.batch_size,
            workers = self.config.num_workers,
            fix = self.config.fix_enabled,
            "Audit run started"
        );

        let abort = Arc::new(AtomicBool::new(false));
        let (job_tx, job_rx) = mpsc::channel::<Job>(self.config.job_queue_capacity);
        let (result_tx, result_rx) = mpsc::channel(self.config.result_queue_capacity());

        let pool = WorkerPool::start(
            self.config.worker_pool_config(),
            Arc::clone(&self.comparator),
            job_rx,
            result_tx,
            Arc::clone(&abort),
        );

        let source = JobSource::new(Arc::clone(&self.store), self.config.batch_size);
        let dispatch = async {
            let dispatched = source.dispatch(&job_tx, &abort).await;
            if dispatched.is_err() {
                abort.store(true, Ordering::SeqCst);
            }
            drop(job_tx);
            dispatched
        };

        let mut aggregator = ResultAggregator::new();
        let (dispatched, drained) = tokio::join!(dispatch, aggregator.drain(result_rx));
        let workers = pool.join().await?;

        drained?;
        let dispatched = dispatched?;
        let aggregate = aggregator.finish(dispatched)?;
        let report = aggregate.report(run_id, started_at).with_workers(workers);

        info!(
            products = report.products,
            not_found = report.counts.not_found,
            not_unique = report.counts.not_unique,
            variant_mismatch = report.counts.variant_mismatch,
            price_stock_mismatch = report.counts.price_stock_mismatch,
            ok = report.counts.ok,
            fetch_failed = report.counts.fetch_failed,
            corrections = report.corrections,
            "Audit run aggregated"
        );

        let publish = match &self.publisher {
            None => PublishStatus::Disabled,
            Some(_) if aggregate.corrections.is_empty() => PublishStatus::NothingToPublish,
            Some(publisher) => match publisher.publish_all(&aggregate.corrections).await {
                Ok(count) => PublishStatus::Published { count },
                Err(PublishError::Partial { failed, total }) => {
                    warn!(failed, total, topic = %publisher.topic(), "Corrections partially published");
                    PublishStatus::Failed { failed, total }
                }
            },
        };

        Ok(AuditOutcome {
            report,
            publish,
            corrections: aggregate.corrections,
        })
    }

    /// Checks a single product without dispatching a batch.
    ///
    /// # Errors
    ///
    /// Returns `CheckError` if a source fails or the check times out.
    pub async fn check_one(&self, job: &Job) -> Result<Problem, CheckError> {
        match tokio::time::timeout(self.config.job_timeout, self.comparator.check(job)).await {
            Ok(result) => result,
            Err(_) => Err(CheckError::Timeout(self.config.job_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PricingError, StorefrontError};
    use crate::pricing::VariantRecord;
    use crate::storage::ProductRecord;
    use crate::storefront::{Listing, ListingVariant, StorefrontConfig};
    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Mutex;

    /// In-memory catalog: `products` in order, SKUs by product id.
    struct MemoryStore {
        products: Vec<ProductRecord>,
        skus: HashMap<i64, Vec<String>>,
        broken_cursor: bool,
    }

    #[async_trait]
    impl CatalogStore for MemoryStore {
        fn sample_products(&self, limit: usize) -> BoxStream<'_, Result<ProductRecord, DatabaseError>> {
            if self.broken_cursor {
                return Box::pin(stream::iter(vec![Err(DatabaseError::ConnectionFailed(
                    "cursor lost".to_string(),
                ))]));
            }
            Box::pin(stream::iter(
                self.products.iter().take(limit).cloned().map(Ok).collect::<Vec<_>>(),
            ))
        }

        async fn variant_skus(&self, product_id: i64) -> Result<Vec<String>, DatabaseError> {
            Ok(self.skus.get(&product_id).cloned().unwrap_or_default())
        }
    }

    struct MemoryStorefront {
        listings: HashMap<String, Vec<Listing>>,
    }

    #[async_trait]
    impl StorefrontSource for MemoryStorefront {
        async fn find_listings(&self, key: &str) -> Result<Vec<Listing>, StorefrontError> {
            if key == "FLAKY" {
                return Err(StorefrontError::UnexpectedStatus {
                    status: 502,
                    body: "bad gateway".to_string(),
                });
            }
            Ok(self.listings.get(key).cloned().unwrap_or_default())
        }
    }

    struct MemoryPricing {
        records: HashMap<String, Vec<VariantRecord>>,
    }

    #[async_trait]
    impl PricingSource for MemoryPricing {
        async fn price_stock(&self, key: &str) -> Result<Vec<VariantRecord>, PricingError> {
            Ok(self.records.get(key).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct RecordingBus {
        payloads: Mutex<Vec<String>>,
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MessageBus for RecordingBus {
        async fn publish(&self, topic: &str, payload: String) -> Result<String, BusError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BusError::PublishFailed {
                    topic: topic.to_string(),
                    message: "nack".to_string(),
                });
            }
            self.payloads.lock().await.push(payload);
            Ok("0-1".to_string())
        }
    }

    fn listing(key: &str, variants: &[(&str, &str, i64)]) -> Listing {
        Listing {
            id: format!("gid://shopify/Product/{key}"),
            title: key.to_string(),
            model_number: Some(key.to_string()),
            variants: variants
                .iter()
                .map(|(sku, price, available)| ListingVariant {
                    sku: sku.to_string(),
                    price: price.to_string(),
                    available: *available,
                })
                .collect(),
            images: Vec::new(),
        }
    }

    fn config() -> AuditConfig {
        AuditConfig::new()
            .with_database_url("sqlite::memory:")
            .with_batch_size(10)
            .with_storefront(StorefrontConfig {
                shop: "shop.example.com".to_string(),
                access_token: "shpat_test".to_string(),
                location_id: "42".to_string(),
                ..Default::default()
            })
    }

    /// Five products, one per terminal category.
    fn catalog() -> (MemoryStore, MemoryStorefront, MemoryPricing) {
        let products = vec![
            ProductRecord::new(1, "ABC123"),
            ProductRecord::new(2, "MISSING"),
            ProductRecord::new(3, "DUPE"),
            ProductRecord::new(4, "WRONGVAR"),
            ProductRecord::new(5, "FINE"),
        ];
        let skus = HashMap::from([
            (1, vec!["ABC123-RED".to_string()]),
            (4, vec!["WRONGVAR-1".to_string()]),
            (5, vec!["FINE-1".to_string(), "FINE-2".to_string()]),
        ]);
        let listings = HashMap::from([
            ("ABC123".to_string(), vec![listing("ABC123", &[("ABC123-RED", "19.99", 5)])]),
            ("DUPE".to_string(), vec![listing("DUPE", &[]), listing("DUPE", &[])]),
            ("WRONGVAR".to_string(), vec![listing("WRONGVAR", &[("WRONGVAR-2", "1.00", 1)])]),
            (
                "FINE".to_string(),
                vec![listing("FINE", &[("FINE-2", "5.00", 1), ("FINE-1", "5.00", 0)])],
            ),
        ]);
        let fact = |sku: &str, price: f64, qty: i64| VariantRecord {
            sku: sku.to_string(),
            price,
            qty,
            source: "nexus".to_string(),
        };
        let records = HashMap::from([
            ("ABC123".to_string(), vec![fact("ABC123-RED", 24.99, 5)]),
            ("FINE".to_string(), vec![fact("FINE-1", 5.0, 0), fact("FINE-2", 5.0, 1)]),
        ]);

        (
            MemoryStore {
                products,
                skus,
                broken_cursor: false,
            },
            MemoryStorefront { listings },
            MemoryPricing { records },
        )
    }

    fn orchestrator(config: AuditConfig, bus: Option<Arc<RecordingBus>>) -> AuditOrchestrator {
        let (store, storefront, pricing) = catalog();
        AuditOrchestrator::new(
            config,
            Arc::new(store),
            Arc::new(storefront),
            Arc::new(pricing),
            bus.map(|b| b as Arc<dyn MessageBus>),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_run_classifies_every_product() {
        let outcome = orchestrator(config(), None).run().await.unwrap();
        let report = &outcome.report;

        assert_eq!(report.products, 5);
        assert_eq!(report.counts.not_found, 1);
        assert_eq!(report.counts.not_unique, 1);
        assert_eq!(report.counts.variant_mismatch, 1);
        assert_eq!(report.counts.price_stock_mismatch, 1);
        assert_eq!(report.counts.ok, 1);
        assert_eq!(report.total_variants, 3);
        assert_eq!(report.mismatched_variants, 1);
        assert_eq!(outcome.publish, PublishStatus::Disabled);
        assert_eq!(outcome.corrections.len(), 1);
        assert_eq!(outcome.corrections[0].price, 24.99);
    }

    #[tokio::test]
    async fn test_run_publishes_corrections() {
        let bus = Arc::new(RecordingBus::default());
        let config = config()
            .with_fix(true)
            .with_bus("redis://localhost:6379", "price-stock");

        let outcome = orchestrator(config, Some(bus.clone())).run().await.unwrap();

        assert_eq!(outcome.publish, PublishStatus::Published { count: 1 });
        assert!(outcome.ensure_published().is_ok());
        let payloads = bus.payloads.lock().await;
        let event: CorrectionEvent = serde_json::from_str(&payloads[0]).unwrap();
        assert_eq!(event.sku, "ABC123-RED");
        assert_eq!(event.qty, 5);
    }

    #[tokio::test]
    async fn test_run_reports_partial_publish() {
        let bus = Arc::new(RecordingBus {
            fail: true,
            ..Default::default()
        });
        let config = config()
            .with_fix(true)
            .with_bus("redis://localhost:6379", "price-stock");

        let outcome = orchestrator(config, Some(bus)).run().await.unwrap();

        assert_eq!(outcome.publish, PublishStatus::Failed { failed: 1, total: 1 });
        let err = outcome.ensure_published().unwrap_err();
        assert_eq!(err.to_string(), "1 of 1 messages did not publish successfully");
    }

    #[tokio::test]
    async fn test_run_isolates_fetch_failures() {
        let (mut store, storefront, pricing) = catalog();
        store.products.push(ProductRecord::new(6, "FLAKY"));
        let orchestrator = AuditOrchestrator::new(
            config(),
            Arc::new(store),
            Arc::new(storefront),
            Arc::new(pricing),
            None,
        )
        .unwrap();

        let report = orchestrator.run().await.unwrap().report;
        assert_eq!(report.products, 6);
        assert_eq!(report.counts.fetch_failed, 1);
    }

    #[tokio::test]
    async fn test_run_store_failure_aborts() {
        let (mut store, storefront, pricing) = catalog();
        store.broken_cursor = true;
        let orchestrator = AuditOrchestrator::new(
            config(),
            Arc::new(store),
            Arc::new(storefront),
            Arc::new(pricing),
            None,
        )
        .unwrap();

        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, AuditError::Dispatch(DispatchError::Store(_))));
    }

    #[tokio::test]
    async fn test_fix_without_bus_is_rejected() {
        let (store, storefront, pricing) = catalog();
        let config = config()
            .with_fix(true)
            .with_bus("redis://localhost:6379", "price-stock");

        let result = AuditOrchestrator::new(
            config,
            Arc::new(store),
            Arc::new(storefront),
            Arc::new(pricing),
            None,
        );
        assert!(matches!(result, Err(AuditError::MissingBus)));
    }

    #[tokio::test]
    async fn test_check_one() {
        let orchestrator = orchestrator(config(), None);

        let problem = orchestrator.check_one(&Job::new(5, "FINE")).await.unwrap();
        assert_eq!(problem, Problem::Ok { variant_count: 2 });

        let problem = orchestrator.check_one(&Job::new(2, "MISSING")).await.unwrap();
        assert_eq!(problem, Problem::NotFound);
    }

    #[test]
    fn test_publish_status_json() {
        let json = serde_json::to_value(PublishStatus::Failed { failed: 2, total: 5 }).unwrap();
        assert_eq!(json, serde_json::json!({"status": "failed", "failed": 2, "total": 5}));
    }
}
