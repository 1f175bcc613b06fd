//! # Inventory Service
//!
//! The engine's external interface. Wires the store, clock and notification
//! sink into the ledger, query service and the two background tasks.
//!
//! ## Lifecycle
//! ```text
//! InventoryServiceBuilder::new()
//!     .store(..) .clock(..) .sink(..) .config(..)
//!     .build()            ─► spawns AlertDispatcher + AnalyticsAggregator
//!          │
//!          ▼
//! record_transaction / queries / analytics ...
//!          │
//!          ▼
//! shutdown()              ─► rejects new transactions, drains both tasks
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use stockwise_core::metrics::{AnalyticsSummary, ProductSalesSummary, RiskEntry};
use stockwise_core::validation::{validate_product_id, validate_product_name, validate_threshold};
use stockwise_core::{InventoryTransaction, Product, StockAlert, TransactionType, ValidationError};
use stockwise_db::Database;
use tracing::info;

use crate::alerts::{AlertDispatcher, AlertHandle, NotificationSink, TracingSink};
use crate::analytics::{AnalyticsAggregator, AnalyticsHandle, RebuildReport};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::ledger::{ProductLocks, StockLedger};
use crate::query::QueryService;
use crate::store::{InventoryStore, SqliteStore};

// =============================================================================
// Builder
// =============================================================================

/// Assembles an [`InventoryService`].
///
/// Defaults: [`SystemClock`] at the configured offset, [`TracingSink`],
/// [`EngineConfig::default`]. A store is required.
#[derive(Default)]
pub struct InventoryServiceBuilder {
    store: Option<Arc<dyn InventoryStore>>,
    clock: Option<Arc<dyn Clock>>,
    sink: Option<Arc<dyn NotificationSink>>,
    config: EngineConfig,
}

impl InventoryServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(mut self, store: Arc<dyn InventoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the service and starts its background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> EngineResult<InventoryService> {
        self.config.validate()?;

        let store = self
            .store
            .ok_or_else(|| EngineError::Config("an inventory store is required".into()))?;
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock::new(self.config.utc_offset()?)),
        };
        let sink: Arc<dyn NotificationSink> = match self.sink {
            Some(sink) => sink,
            None => Arc::new(TracingSink),
        };

        let alerts = AlertDispatcher::new(
            Arc::clone(&store),
            sink,
            Arc::clone(&clock),
            self.config.alerts.mode,
        )
        .start();
        let analytics = AnalyticsAggregator::new(Arc::clone(&store), Arc::clone(&clock)).start();

        let locks = ProductLocks::new();
        let ledger = StockLedger::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            Arc::clone(&locks),
            alerts.clone(),
            analytics.clone(),
            &self.config.ledger,
        );
        let queries = QueryService::new(Arc::clone(&store), Arc::clone(&clock), locks);

        info!(
            alert_mode = %self.config.alerts.mode,
            utc_offset_minutes = self.config.clock.utc_offset_minutes,
            "Inventory service started"
        );

        Ok(InventoryService {
            store,
            clock,
            ledger,
            queries,
            alerts,
            analytics,
            config: self.config,
            closed: AtomicBool::new(false),
        })
    }
}

// =============================================================================
// Service
// =============================================================================

/// Stock ledger, alerting and analytics behind one handle.
pub struct InventoryService {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
    ledger: StockLedger,
    queries: QueryService,
    alerts: AlertHandle,
    analytics: AnalyticsHandle,
    config: EngineConfig,
    closed: AtomicBool,
}

impl InventoryService {
    pub fn builder() -> InventoryServiceBuilder {
        InventoryServiceBuilder::new()
    }

    /// Opens the configured SQLite database and starts the service on it.
    pub async fn open(config: EngineConfig) -> EngineResult<Self> {
        let db = Database::new(config.db_config()?).await?;
        Self::builder()
            .store(Arc::new(SqliteStore::new(db)))
            .config(config)
            .build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // =========================================================================
    // Ledger
    // =========================================================================

    /// Records a stock movement.
    ///
    /// See [`StockLedger::apply`] for the error cases. Fails with
    /// `ShuttingDown` once [`shutdown`](Self::shutdown) has begun.
    pub async fn record_transaction(
        &self,
        product_id: &str,
        quantity: i64,
        transaction_type: TransactionType,
        reference: Option<&str>,
    ) -> EngineResult<InventoryTransaction> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::ShuttingDown);
        }
        self.ledger
            .apply(product_id, quantity, transaction_type, reference)
            .await
    }

    pub async fn list_transactions(
        &self,
        product_id: &str,
    ) -> EngineResult<Vec<InventoryTransaction>> {
        self.queries.list_transactions(product_id).await
    }

    pub async fn list_low_stock(&self) -> EngineResult<Vec<Product>> {
        self.queries.list_low_stock().await
    }

    pub async fn set_threshold(&self, product_id: &str, threshold: i64) -> EngineResult<Product> {
        self.queries.set_threshold(product_id, threshold).await
    }

    pub async fn list_alerts(&self, product_id: &str) -> EngineResult<Vec<StockAlert>> {
        self.queries.list_alerts(product_id).await
    }

    // =========================================================================
    // Catalog Seeding
    // =========================================================================

    /// Adds a product to the catalog.
    pub async fn insert_product(&self, product: Product) -> EngineResult<Product> {
        validate_product_id(&product.id)?;
        validate_product_name(&product.name)?;
        validate_threshold(product.low_stock_threshold)?;
        if product.stock_quantity < 0 {
            return Err(ValidationError::Negative {
                field: "stock_quantity".to_string(),
            }
            .into());
        }

        Ok(self.store.insert_product(&product).await?)
    }

    pub async fn product(&self, product_id: &str) -> EngineResult<Product> {
        validate_product_id(product_id)?;
        self.store
            .product(product_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Product", product_id))
    }

    // =========================================================================
    // Analytics
    // =========================================================================

    pub async fn product_analytics(
        &self,
        product_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<AnalyticsSummary> {
        self.analytics.product_analytics(product_id, start, end).await
    }

    /// Best sellers; `None` uses `analytics.default_top_selling_limit`.
    pub async fn top_selling_products(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        limit: Option<usize>,
    ) -> EngineResult<Vec<ProductSalesSummary>> {
        let limit = limit.unwrap_or(self.config.analytics.default_top_selling_limit);
        self.analytics.top_selling_products(start, end, limit).await
    }

    pub async fn stockout_risk(&self) -> EngineResult<Vec<RiskEntry>> {
        self.analytics.stockout_risk().await
    }

    /// Recomputes daily metrics for `start..=end` from the ledger.
    pub async fn rebuild_analytics(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<RebuildReport> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::ShuttingDown);
        }
        self.analytics.rebuild(start, end).await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Waits until every committed transaction has reached analytics and
    /// alerting.
    pub async fn flush(&self) -> EngineResult<()> {
        self.analytics.flush().await?;
        self.alerts.flush().await
    }

    /// Stops accepting transactions and drains the background tasks.
    pub async fn shutdown(&self) -> EngineResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        info!("Inventory service shutting down");
        self.analytics.shutdown().await?;
        self.alerts.shutdown().await?;
        info!("Inventory service stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::test_sinks::RecordingSink;
    use crate::clock::ManualClock;
    use crate::config::AlertMode;
    use crate::store::InMemoryStore;
    use chrono::{Duration, TimeZone, Utc};
    use stockwise_core::RiskLevel;
    use stockwise_db::DbConfig;

    fn start() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn product(id: &str, stock: i64, threshold: i64) -> Product {
        let mut p = Product::new(format!("Product {}", id), stock, threshold, start());
        p.id = id.to_string();
        p
    }

    struct Fixture {
        service: InventoryService,
        clock: Arc<ManualClock>,
        sink: Arc<RecordingSink>,
    }

    fn fixture_on(store: Arc<dyn InventoryStore>, mode: AlertMode) -> Fixture {
        let clock = Arc::new(ManualClock::at(start()));
        let sink = Arc::new(RecordingSink::default());
        let mut config = EngineConfig::default();
        config.alerts.mode = mode;
        config.ledger.initial_retry_backoff_ms = 1;
        config.ledger.max_retry_backoff_ms = 4;

        let service = InventoryService::builder()
            .store(store)
            .clock(clock.clone())
            .sink(sink.clone())
            .config(config)
            .build()
            .unwrap();

        Fixture {
            service,
            clock,
            sink,
        }
    }

    fn fixture() -> Fixture {
        fixture_on(Arc::new(InMemoryStore::new()), AlertMode::Edge)
    }

    #[tokio::test]
    async fn test_builder_requires_store() {
        let err = InventoryService::builder().build().err().unwrap();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[tokio::test]
    async fn test_low_stock_lifecycle() {
        let f = fixture();
        let svc = &f.service;
        svc.insert_product(product("p1", 100, 20)).await.unwrap();

        svc.record_transaction("p1", 90, TransactionType::Sale, Some("ORD-1"))
            .await
            .unwrap();
        f.clock.advance(Duration::minutes(5));
        svc.record_transaction("p1", 5, TransactionType::Sale, None)
            .await
            .unwrap();
        svc.flush().await.unwrap();

        let alerts = svc.list_alerts("p1").await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].active);
        assert_eq!(alerts[0].stock_at_trigger, 10);
        assert_eq!(f.sink.notices().len(), 1);
        assert_eq!(svc.list_low_stock().await.unwrap().len(), 1);

        f.clock.advance(Duration::minutes(5));
        svc.record_transaction("p1", 50, TransactionType::Restock, Some("PO-9"))
            .await
            .unwrap();
        svc.flush().await.unwrap();

        let alerts = svc.list_alerts("p1").await.unwrap();
        assert!(alerts.iter().all(|a| !a.active));
        assert!(svc.list_low_stock().await.unwrap().is_empty());

        let history = svc.list_transactions("p1").await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history.last().unwrap().resulting_stock, 55);
        assert_eq!(svc.product("p1").await.unwrap().stock_quantity, 55);
    }

    #[tokio::test]
    async fn test_threshold_change_applies_to_next_commit() {
        let f = fixture();
        let svc = &f.service;
        svc.insert_product(product("p1", 30, 10)).await.unwrap();

        svc.set_threshold("p1", 40).await.unwrap();
        svc.flush().await.unwrap();
        assert!(f.sink.notices().is_empty());

        svc.record_transaction("p1", 1, TransactionType::Sale, None)
            .await
            .unwrap();
        svc.flush().await.unwrap();

        let notices = f.sink.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].threshold, 40);
    }

    #[tokio::test]
    async fn test_analytics_through_service() {
        let f = fixture();
        let svc = &f.service;
        svc.insert_product(product("a", 100, 10)).await.unwrap();
        svc.insert_product(product("b", 100, 10)).await.unwrap();

        svc.record_transaction("a", 10, TransactionType::Sale, None)
            .await
            .unwrap();
        svc.record_transaction("b", 25, TransactionType::Sale, None)
            .await
            .unwrap();
        f.clock.advance(Duration::days(1));
        svc.record_transaction("a", 30, TransactionType::Sale, None)
            .await
            .unwrap();
        svc.flush().await.unwrap();

        let summary = svc.product_analytics("a", day(3), day(4)).await.unwrap();
        assert_eq!(summary.total_sales, 40);
        assert_eq!(summary.sales_trend, vec![(day(3), 10), (day(4), 30)]);

        let top = svc.top_selling_products(day(3), day(4), None).await.unwrap();
        assert_eq!(top[0].product_id, "a");
        assert_eq!(top[1].product_id, "b");

        let risk = svc.stockout_risk().await.unwrap();
        assert!(risk.iter().all(|r| r.risk_level == RiskLevel::Low));

        let before = svc.product_analytics("a", day(3), day(4)).await.unwrap();
        let report = svc.rebuild_analytics(day(3), day(4)).await.unwrap();
        assert_eq!(report.transactions_replayed, 3);
        let after = svc.product_analytics("a", day(3), day(4)).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_oversized_quantities_rejected_and_analytics_survive() {
        let f = fixture();
        let svc = &f.service;
        svc.insert_product(product("p1", 0, 5)).await.unwrap();

        let huge = 1_i64 << 62;
        for t in [TransactionType::Purchase, TransactionType::Sale, TransactionType::Purchase] {
            let err = svc.record_transaction("p1", huge, t, None).await.unwrap_err();
            assert!(matches!(err, EngineError::Validation(_)));
        }

        svc.record_transaction("p1", 12, TransactionType::Purchase, None)
            .await
            .unwrap();
        svc.record_transaction("p1", 4, TransactionType::Sale, None)
            .await
            .unwrap();
        svc.flush().await.unwrap();

        let summary = svc.product_analytics("p1", day(3), day(3)).await.unwrap();
        assert_eq!(summary.total_restocks, 12);
        assert_eq!(summary.total_sales, 4);
        assert_eq!(svc.product("p1").await.unwrap().stock_quantity, 8);
    }

    #[tokio::test]
    async fn test_insert_product_validation() {
        let f = fixture();
        let err = f
            .service
            .insert_product(product("p1", -1, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let mut unnamed = product("p2", 1, 5);
        unnamed.name = "  ".into();
        assert!(f.service.insert_product(unnamed).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_transactions() {
        let f = fixture();
        f.service
            .insert_product(product("p1", 10, 2))
            .await
            .unwrap();

        f.service.shutdown().await.unwrap();
        f.service.shutdown().await.unwrap();

        let err = f
            .service
            .record_transaction("p1", 1, TransactionType::Sale, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ShuttingDown));
        assert_eq!(f.service.product("p1").await.unwrap().stock_quantity, 10);
    }

    #[tokio::test]
    async fn test_service_on_sqlite() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let f = fixture_on(Arc::new(SqliteStore::new(db)), AlertMode::Edge);
        let svc = &f.service;
        svc.insert_product(product("p1", 100, 20)).await.unwrap();

        svc.record_transaction("p1", 90, TransactionType::Sale, None)
            .await
            .unwrap();
        let err = svc
            .record_transaction("p1", 20, TransactionType::Sale, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientStock { .. }));
        svc.flush().await.unwrap();

        assert_eq!(svc.list_transactions("p1").await.unwrap().len(), 1);
        assert_eq!(svc.list_alerts("p1").await.unwrap().len(), 1);

        let summary = svc.product_analytics("p1", day(3), day(3)).await.unwrap();
        assert_eq!(summary.total_sales, 90);

        let report = svc.rebuild_analytics(day(3), day(3)).await.unwrap();
        assert_eq!(report.transactions_replayed, 1);
        assert_eq!(report.metrics_written, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_level_mode_on_sqlite_concurrent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let f = fixture_on(Arc::new(SqliteStore::new(db)), AlertMode::Level);
        let svc = Arc::new(f.service);
        svc.insert_product(product("p1", 40, 30)).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let svc = Arc::clone(&svc);
            tasks.push(tokio::spawn(async move {
                svc.record_transaction("p1", 2, TransactionType::Sale, None)
                    .await
            }));
        }
        for t in tasks {
            t.await.unwrap().unwrap();
        }
        svc.flush().await.unwrap();

        assert_eq!(svc.product("p1").await.unwrap().stock_quantity, 20);
        // 38, 36, 34, 32 stay above 30; the remaining six commits are low.
        assert_eq!(f.sink.notices().len(), 6);
        assert_eq!(svc.list_alerts("p1").await.unwrap().len(), 1);
    }
}
