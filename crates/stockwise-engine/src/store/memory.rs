//! In-memory [`InventoryStore`] for tests and embedding.
//!
//! All state sits behind one `tokio::sync::RwLock`. Every write is a
//! synchronous critical section under the write guard, so a cancelled
//! caller never leaves a half-applied commit.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use stockwise_core::{DailyInventoryMetric, InventoryTransaction, Product, StockAlert};
use tokio::sync::RwLock;
use tracing::debug;

use super::{InventoryStore, StockCommit};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Default)]
struct State {
    products: BTreeMap<String, Product>,
    transactions: Vec<InventoryTransaction>,
    transaction_ids: HashSet<String>,
    next_sequence: i64,
    alerts: Vec<StockAlert>,
    metrics: BTreeMap<(String, NaiveDate), DailyInventoryMetric>,
    /// transaction id -> metric date it was folded into
    applied: HashMap<String, NaiveDate>,

    pending_conflicts: u32,
    unavailable: bool,
}

impl State {
    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable {
            return Err(StoreError::Unavailable("in-memory store offline".into()));
        }
        Ok(())
    }
}

/// Thread-safe in-memory store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` commits fail with a conflict, as if another
    /// process had changed the product in between.
    pub async fn simulate_conflicts(&self, n: u32) {
        self.state.write().await.pending_conflicts = n;
    }

    /// Makes every call fail with `Unavailable` while set.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Number of committed transactions.
    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.transactions.len()
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn product(&self, id: &str) -> StoreResult<Option<Product>> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state.products.get(id).cloned())
    }

    async fn products(&self) -> StoreResult<Vec<Product>> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state.products.values().cloned().collect())
    }

    async fn insert_product(&self, product: &Product) -> StoreResult<Product> {
        let mut state = self.state.write().await;
        state.check_available()?;

        if state.products.contains_key(&product.id) {
            return Err(StoreError::Duplicate {
                entity: "Product".into(),
                id: product.id.clone(),
            });
        }
        state.products.insert(product.id.clone(), product.clone());
        Ok(product.clone())
    }

    async fn set_threshold(
        &self,
        id: &str,
        threshold: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Product>> {
        let mut state = self.state.write().await;
        state.check_available()?;

        Ok(state.products.get_mut(id).map(|p| {
            p.low_stock_threshold = threshold;
            p.updated_at = now;
            p.clone()
        }))
    }

    async fn low_stock_products(&self) -> StoreResult<Vec<Product>> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state
            .products
            .values()
            .filter(|p| p.active && p.is_low_stock())
            .cloned()
            .collect())
    }

    async fn commit_stock_change(&self, commit: StockCommit) -> StoreResult<InventoryTransaction> {
        let StockCommit {
            expected_stock,
            transaction: mut tx,
        } = commit;

        let mut state = self.state.write().await;
        state.check_available()?;

        if state.pending_conflicts > 0 {
            state.pending_conflicts -= 1;
            debug!(product_id = %tx.product_id, "Simulated commit conflict");
            return Err(StoreError::Conflict {
                product_id: tx.product_id,
            });
        }

        if state.transaction_ids.contains(&tx.id) {
            return Err(StoreError::Duplicate {
                entity: "InventoryTransaction".into(),
                id: tx.id,
            });
        }

        let product = match state.products.get_mut(&tx.product_id) {
            Some(p) if p.active && p.stock_quantity == expected_stock => p,
            _ => {
                return Err(StoreError::Conflict {
                    product_id: tx.product_id,
                })
            }
        };
        product.stock_quantity = tx.resulting_stock;
        product.updated_at = tx.created_at;

        state.next_sequence += 1;
        tx.sequence = state.next_sequence;
        state.transaction_ids.insert(tx.id.clone());
        state.transactions.push(tx.clone());

        Ok(tx)
    }

    async fn transactions_for_product(
        &self,
        product_id: &str,
    ) -> StoreResult<Vec<InventoryTransaction>> {
        let state = self.state.read().await;
        state.check_available()?;

        // Stored in sequence order; a stable sort keeps it as the tiebreak.
        let mut txs: Vec<InventoryTransaction> = state
            .transactions
            .iter()
            .filter(|t| t.product_id == product_id)
            .cloned()
            .collect();
        txs.sort_by_key(|t| t.created_at);
        Ok(txs)
    }

    async fn transactions_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<InventoryTransaction>> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.created_at >= from && t.created_at < to)
            .cloned()
            .collect())
    }

    async fn active_alert(&self, product_id: &str) -> StoreResult<Option<StockAlert>> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state
            .alerts
            .iter()
            .find(|a| a.active && a.product_id == product_id)
            .cloned())
    }

    async fn insert_alert(&self, alert: &StockAlert) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.check_available()?;

        if !state.products.contains_key(&alert.product_id) {
            return Err(StoreError::Corrupt(format!(
                "alert references unknown product {}",
                alert.product_id
            )));
        }
        if state
            .alerts
            .iter()
            .any(|a| a.id == alert.id || (a.active && a.product_id == alert.product_id))
        {
            return Err(StoreError::Duplicate {
                entity: "StockAlert".into(),
                id: alert.product_id.clone(),
            });
        }
        state.alerts.push(alert.clone());
        Ok(())
    }

    async fn resolve_alert(&self, alert_id: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        state.check_available()?;

        match state.alerts.iter_mut().find(|a| a.id == alert_id && a.active) {
            Some(alert) => {
                alert.active = false;
                alert.resolved_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn alerts_for_product(&self, product_id: &str) -> StoreResult<Vec<StockAlert>> {
        let state = self.state.read().await;
        state.check_available()?;

        let mut alerts: Vec<StockAlert> = state
            .alerts
            .iter()
            .rev()
            .filter(|a| a.product_id == product_id)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }

    async fn daily_metric(
        &self,
        product_id: &str,
        date: NaiveDate,
    ) -> StoreResult<Option<DailyInventoryMetric>> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state.metrics.get(&(product_id.to_string(), date)).cloned())
    }

    async fn record_daily_metric(
        &self,
        metric: &DailyInventoryMetric,
        transaction_id: &str,
    ) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        state.check_available()?;

        if state.applied.contains_key(transaction_id) {
            debug!(transaction_id = %transaction_id, "Transaction already applied to metrics");
            return Ok(false);
        }
        state
            .applied
            .insert(transaction_id.to_string(), metric.date);
        state.metrics.insert(
            (metric.product_id.clone(), metric.date),
            metric.clone(),
        );
        Ok(true)
    }

    async fn metrics_between(
        &self,
        product_id: Option<&str>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<Vec<DailyInventoryMetric>> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state
            .metrics
            .values()
            .filter(|m| m.date >= start && m.date <= end)
            .filter(|m| product_id.map_or(true, |id| m.product_id == id))
            .cloned()
            .collect())
    }

    async fn clear_metrics_between(&self, start: NaiveDate, end: NaiveDate) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        state.check_available()?;

        let in_range = |d: &NaiveDate| *d >= start && *d <= end;
        let before = state.metrics.len();
        state.metrics.retain(|(_, d), _| !in_range(d));
        state.applied.retain(|_, d| !in_range(d));
        Ok((before - state.metrics.len()) as u64)
    }
}
