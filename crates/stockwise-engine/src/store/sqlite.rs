//! [`InventoryStore`] over the SQLite repositories in `stockwise-db`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use stockwise_core::{DailyInventoryMetric, InventoryTransaction, Product, StockAlert};
use stockwise_db::Database;

use super::{InventoryStore, StockCommit};
use crate::error::StoreResult;

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        SqliteStore { db }
    }
}

#[async_trait]
impl InventoryStore for SqliteStore {
    async fn product(&self, id: &str) -> StoreResult<Option<Product>> {
        Ok(self.db.products().get_by_id(id).await?)
    }

    async fn products(&self) -> StoreResult<Vec<Product>> {
        Ok(self.db.products().list_all().await?)
    }

    async fn insert_product(&self, product: &Product) -> StoreResult<Product> {
        Ok(self.db.products().insert(product).await?)
    }

    async fn set_threshold(
        &self,
        id: &str,
        threshold: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Product>> {
        Ok(self.db.products().set_threshold(id, threshold, now).await?)
    }

    async fn low_stock_products(&self) -> StoreResult<Vec<Product>> {
        Ok(self.db.products().list_low_stock().await?)
    }

    async fn commit_stock_change(&self, commit: StockCommit) -> StoreResult<InventoryTransaction> {
        Ok(self
            .db
            .ledger()
            .commit(commit.expected_stock, &commit.transaction)
            .await?)
    }

    async fn transactions_for_product(
        &self,
        product_id: &str,
    ) -> StoreResult<Vec<InventoryTransaction>> {
        Ok(self.db.ledger().list_for_product(product_id).await?)
    }

    async fn transactions_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<InventoryTransaction>> {
        Ok(self.db.ledger().list_between(from, to).await?)
    }

    async fn active_alert(&self, product_id: &str) -> StoreResult<Option<StockAlert>> {
        Ok(self.db.alerts().active_for_product(product_id).await?)
    }

    async fn insert_alert(&self, alert: &StockAlert) -> StoreResult<()> {
        Ok(self.db.alerts().insert(alert).await?)
    }

    async fn resolve_alert(&self, alert_id: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        Ok(self.db.alerts().resolve(alert_id, now).await?)
    }

    async fn alerts_for_product(&self, product_id: &str) -> StoreResult<Vec<StockAlert>> {
        Ok(self.db.alerts().list_for_product(product_id).await?)
    }

    async fn daily_metric(
        &self,
        product_id: &str,
        date: NaiveDate,
    ) -> StoreResult<Option<DailyInventoryMetric>> {
        Ok(self.db.metrics().get(product_id, date).await?)
    }

    async fn record_daily_metric(
        &self,
        metric: &DailyInventoryMetric,
        transaction_id: &str,
    ) -> StoreResult<bool> {
        Ok(self.db.metrics().record(metric, transaction_id).await?)
    }

    async fn metrics_between(
        &self,
        product_id: Option<&str>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<Vec<DailyInventoryMetric>> {
        Ok(self.db.metrics().list_between(product_id, start, end).await?)
    }

    async fn clear_metrics_between(&self, start: NaiveDate, end: NaiveDate) -> StoreResult<u64> {
        Ok(self.db.metrics().clear_between(start, end).await?)
    }
}
