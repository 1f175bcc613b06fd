//! # Inventory Store Port
//!
//! The engine reaches storage only through [`InventoryStore`].
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────────────────┐
//! │ StockLedger  │   │ AlertDispatcher  │   │ AnalyticsAggregator  │
//! └──────┬───────┘   └────────┬─────────┘   └──────────┬───────────┘
//!        │                    │                        │
//!        └────────────────────┼────────────────────────┘
//!                             ▼
//!                 ┌───────────────────────┐
//!                 │  dyn InventoryStore   │
//!                 └───────────┬───────────┘
//!                 ┌───────────┴───────────┐
//!                 ▼                       ▼
//!         ┌───────────────┐      ┌────────────────┐
//!         │ InMemoryStore │      │  SqliteStore   │
//!         │ (RwLock)      │      │ (stockwise-db) │
//!         └───────────────┘      └────────────────┘
//! ```
//!
//! ## Contract
//! - [`InventoryStore::commit_stock_change`] is atomic: the product's stock
//!   and the transaction record are written together or not at all. It
//!   fails with [`StoreError::Conflict`] when the product's stock no longer
//!   equals `expected_stock` or the product is inactive.
//! - [`InventoryStore::record_daily_metric`] writes at most once per
//!   transaction id and reports whether it wrote.

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use stockwise_core::{DailyInventoryMetric, InventoryTransaction, Product, StockAlert};

use crate::error::StoreResult;

/// A stock change ready to commit.
#[derive(Debug, Clone)]
pub struct StockCommit {
    /// Stock the change was computed from.
    pub expected_stock: i64,

    /// The transaction to record. `resulting_stock` becomes the new stock.
    pub transaction: InventoryTransaction,
}

/// Persistence port for products, the ledger, alerts and daily metrics.
#[async_trait]
pub trait InventoryStore: Send + Sync + 'static {
    // =========================================================================
    // Products
    // =========================================================================

    async fn product(&self, id: &str) -> StoreResult<Option<Product>>;

    /// All products, ordered by id.
    async fn products(&self) -> StoreResult<Vec<Product>>;

    async fn insert_product(&self, product: &Product) -> StoreResult<Product>;

    /// Returns `None` if the product does not exist.
    async fn set_threshold(
        &self,
        id: &str,
        threshold: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Product>>;

    /// Active products with stock at or below threshold, ordered by id.
    async fn low_stock_products(&self) -> StoreResult<Vec<Product>>;

    // =========================================================================
    // Ledger
    // =========================================================================

    /// Atomically writes the new stock level and the transaction record.
    ///
    /// Returns the transaction with its assigned `sequence`.
    async fn commit_stock_change(&self, commit: StockCommit) -> StoreResult<InventoryTransaction>;

    /// A product's transactions ordered by `created_at`, then `sequence`.
    async fn transactions_for_product(
        &self,
        product_id: &str,
    ) -> StoreResult<Vec<InventoryTransaction>>;

    /// Transactions with `from <= created_at < to`, ordered by `sequence`.
    async fn transactions_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<InventoryTransaction>>;

    // =========================================================================
    // Alerts
    // =========================================================================

    async fn active_alert(&self, product_id: &str) -> StoreResult<Option<StockAlert>>;

    /// Fails with `Duplicate` if the product already has an active alert.
    async fn insert_alert(&self, alert: &StockAlert) -> StoreResult<()>;

    /// Returns false if the alert was not active.
    async fn resolve_alert(&self, alert_id: &str, now: DateTime<Utc>) -> StoreResult<bool>;

    /// Alert history, newest first.
    async fn alerts_for_product(&self, product_id: &str) -> StoreResult<Vec<StockAlert>>;

    // =========================================================================
    // Daily Metrics
    // =========================================================================

    async fn daily_metric(
        &self,
        product_id: &str,
        date: NaiveDate,
    ) -> StoreResult<Option<DailyInventoryMetric>>;

    /// Writes `metric` unless `transaction_id` was already applied.
    ///
    /// Returns true if the row was written.
    async fn record_daily_metric(
        &self,
        metric: &DailyInventoryMetric,
        transaction_id: &str,
    ) -> StoreResult<bool>;

    /// Rows with `start <= date <= end`, ordered by product id then date.
    async fn metrics_between(
        &self,
        product_id: Option<&str>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<Vec<DailyInventoryMetric>>;

    /// Deletes rows and applied-transaction marks in the date range.
    async fn clear_metrics_between(&self, start: NaiveDate, end: NaiveDate) -> StoreResult<u64>;
}
