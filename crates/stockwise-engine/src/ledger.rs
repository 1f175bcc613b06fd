//! # Stock Ledger
//!
//! Applies inventory transactions: the only writer of product stock.
//!
//! ## Apply Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          StockLedger::apply                             │
//! │                                                                         │
//! │  validate quantity + reference ──► reject before touching the store    │
//! │              │                                                          │
//! │              ▼                                                          │
//! │  ProductLocks::lock(product_id)    one async mutex per product         │
//! │              │                                                          │
//! │              ▼                                                          │
//! │  ┌──► load product ──► StockMutator::apply ──► commit (CAS on stock)   │
//! │  │                                                │                     │
//! │  │   Conflict (another process wrote the row)     │ Ok                  │
//! │  └─────────── backoff, retry ◄────────────────────┤                     │
//! │                                                   ▼                     │
//! │                         publish tx ──► AnalyticsAggregator              │
//! │                         signal     ──► AlertDispatcher                  │
//! │                         (still under the product lock)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Distinct products never contend. Publishing never blocks and its
//! failures never undo a commit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use stockwise_core::validation::{validate_product_id, validate_quantity, validate_reference};
use stockwise_core::{InventoryTransaction, Product, StockMutator, TransactionType};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::alerts::{AlertHandle, StockSignal};
use crate::analytics::AnalyticsHandle;
use crate::clock::Clock;
use crate::config::LedgerSettings;
use crate::error::{EngineError, EngineResult, StoreError};
use crate::store::{InventoryStore, StockCommit};

// =============================================================================
// Per-Product Locks
// =============================================================================

/// Lock table keyed by product id.
///
/// Entries are created on first use and removed when the last holder or
/// waiter lets go.
#[derive(Debug, Default)]
pub struct ProductLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Exclusive access to one product until dropped.
pub struct ProductLockGuard {
    locks: Arc<ProductLocks>,
    product_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ProductLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Waits for exclusive access to `product_id`.
    pub async fn lock(self: &Arc<Self>, product_id: &str) -> ProductLockGuard {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(map.entry(product_id.to_string()).or_default())
        };

        let guard = mutex.lock_owned().await;
        ProductLockGuard {
            locks: Arc::clone(self),
            product_id: product_id.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of products currently locked or waited on.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ProductLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut map = self.locks.inner.lock().unwrap_or_else(|e| e.into_inner());
        // Only the table's own reference left: nobody holds or waits.
        if map
            .get(&self.product_id)
            .is_some_and(|m| Arc::strong_count(m) == 1)
        {
            map.remove(&self.product_id);
        }
    }
}

// =============================================================================
// Ledger
// =============================================================================

/// Applies transactions and emits post-commit signals.
pub struct StockLedger {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
    locks: Arc<ProductLocks>,
    alerts: AlertHandle,
    analytics: AnalyticsHandle,
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl StockLedger {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        clock: Arc<dyn Clock>,
        locks: Arc<ProductLocks>,
        alerts: AlertHandle,
        analytics: AnalyticsHandle,
        settings: &LedgerSettings,
    ) -> Self {
        StockLedger {
            store,
            clock,
            locks,
            alerts,
            analytics,
            max_attempts: settings.max_commit_retries.max(1),
            initial_backoff: Duration::from_millis(settings.initial_retry_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_retry_backoff_ms),
        }
    }

    /// Applies one transaction to a product's stock.
    ///
    /// ## Errors
    /// - `Validation` - bad quantity or reference (nothing touched)
    /// - `NotFound` - product missing or inactive
    /// - `InsufficientStock` - stock would go negative (nothing written)
    /// - `Conflict` - commit kept losing to another writer
    /// - `Storage` - the store failed (nothing written)
    pub async fn apply(
        &self,
        product_id: &str,
        quantity: i64,
        transaction_type: TransactionType,
        reference: Option<&str>,
    ) -> EngineResult<InventoryTransaction> {
        validate_product_id(product_id)?;
        validate_quantity(transaction_type, quantity)?;
        validate_reference(reference)?;

        let _lock = self.locks.lock(product_id).await;

        let mut backoff = ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut attempt = 0;
        let (committed, product) = loop {
            attempt += 1;

            let product = self
                .store
                .product(product_id)
                .await?
                .filter(|p| p.active)
                .ok_or_else(|| EngineError::not_found("Product", product_id))?;

            let change = StockMutator::apply(transaction_type, quantity, product.stock_quantity)?;

            let tx = InventoryTransaction {
                id: Uuid::new_v4().to_string(),
                product_id: product.id.clone(),
                quantity,
                transaction_type,
                delta: change.delta,
                reference: reference.map(str::to_string),
                resulting_stock: change.resulting_stock,
                sequence: 0,
                created_at: self.clock.now(),
            };

            let commit = StockCommit {
                expected_stock: product.stock_quantity,
                transaction: tx,
            };

            match self.store.commit_stock_change(commit).await {
                Ok(committed) => break (committed, product),
                Err(StoreError::Conflict { .. }) if attempt < self.max_attempts => {
                    let wait = backoff.next_backoff().unwrap_or(self.max_backoff);
                    debug!(
                        product_id = %product_id,
                        attempt = attempt,
                        wait_ms = wait.as_millis() as u64,
                        "Stock changed underneath commit, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(StoreError::Conflict { .. }) => {
                    warn!(product_id = %product_id, attempts = attempt, "Commit retries exhausted");
                    return Err(EngineError::Conflict {
                        product_id: product_id.to_string(),
                        attempts: attempt,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        };

        info!(
            product_id = %committed.product_id,
            transaction_id = %committed.id,
            transaction_type = %committed.transaction_type,
            delta = committed.delta,
            resulting_stock = committed.resulting_stock,
            "Stock transaction committed"
        );

        self.publish(&committed, &product);
        Ok(committed)
    }

    /// Hands the commit to analytics and alerting.
    fn publish(&self, committed: &InventoryTransaction, product: &Product) {
        if let Err(e) = self.analytics.publish(committed.clone()) {
            let err = EngineError::Dependency(e.to_string());
            warn!(transaction_id = %committed.id, error = %err, "Analytics publish failed");
        }

        let signal = if committed.resulting_stock <= product.low_stock_threshold {
            StockSignal::Low {
                product_id: product.id.clone(),
                product_name: product.name.clone(),
                stock: committed.resulting_stock,
                threshold: product.low_stock_threshold,
            }
        } else {
            StockSignal::Healthy {
                product_id: product.id.clone(),
                stock: committed.resulting_stock,
            }
        };

        if let Err(e) = self.alerts.signal(signal) {
            let err = EngineError::Dependency(e.to_string());
            warn!(transaction_id = %committed.id, error = %err, "Alert signal failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::test_sinks::RecordingSink;
    use crate::alerts::AlertDispatcher;
    use crate::analytics::AnalyticsAggregator;
    use crate::clock::ManualClock;
    use crate::config::AlertMode;
    use crate::store::InMemoryStore;
    use chrono::{DateTime, TimeZone, Utc};
    use stockwise_core::{ValidationError, MAX_QUANTITY};

    fn pinned_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        ledger: Arc<StockLedger>,
        locks: Arc<ProductLocks>,
        alerts: AlertHandle,
        analytics: AnalyticsHandle,
        sink: Arc<RecordingSink>,
        product: Product,
    }

    async fn fixture(stock: i64, threshold: i64, max_commit_retries: u32) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at(pinned_now()));
        let sink = Arc::new(RecordingSink::default());

        let product = Product::new("Hex Bolt", stock, threshold, Utc::now());
        store.insert_product(&product).await.unwrap();

        let alerts =
            AlertDispatcher::new(store.clone(), sink.clone(), clock.clone(), AlertMode::Edge)
                .start();
        let analytics = AnalyticsAggregator::new(store.clone(), clock.clone()).start();
        let locks = ProductLocks::new();

        let settings = LedgerSettings {
            max_commit_retries,
            initial_retry_backoff_ms: 1,
            max_retry_backoff_ms: 4,
        };
        let ledger = Arc::new(StockLedger::new(
            store.clone(),
            clock,
            locks.clone(),
            alerts.clone(),
            analytics.clone(),
            &settings,
        ));

        Fixture {
            store,
            ledger,
            locks,
            alerts,
            analytics,
            sink,
            product,
        }
    }

    async fn stock_of(f: &Fixture) -> i64 {
        f.store
            .product(&f.product.id)
            .await
            .unwrap()
            .unwrap()
            .stock_quantity
    }

    #[tokio::test]
    async fn test_sale_then_insufficient_stock() {
        let f = fixture(100, 20, 3).await;

        let tx = f
            .ledger
            .apply(&f.product.id, 90, TransactionType::Sale, Some("ORD-1"))
            .await
            .unwrap();
        assert_eq!(tx.delta, -90);
        assert_eq!(tx.resulting_stock, 10);
        assert_eq!(tx.reference.as_deref(), Some("ORD-1"));

        let err = f
            .ledger
            .apply(&f.product.id, 20, TransactionType::Sale, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientStock {
                available: 10,
                requested: 20
            }
        ));

        assert_eq!(stock_of(&f).await, 10);
        assert_eq!(f.store.transaction_count().await, 1);

        // The first sale crossed the threshold.
        f.alerts.flush().await.unwrap();
        assert_eq!(f.sink.notices().len(), 1);
        assert_eq!(f.sink.notices()[0].stock, 10);
    }

    #[tokio::test]
    async fn test_adjustment_sets_absolute_level() {
        let f = fixture(37, 5, 3).await;

        let tx = f
            .ledger
            .apply(&f.product.id, 12, TransactionType::Adjustment, None)
            .await
            .unwrap();
        assert_eq!(tx.delta, -25);
        assert_eq!(stock_of(&f).await, 12);

        let tx = f
            .ledger
            .apply(&f.product.id, 0, TransactionType::Adjustment, None)
            .await
            .unwrap();
        assert_eq!(tx.delta, -12);
        assert_eq!(tx.resulting_stock, 0);
    }

    #[tokio::test]
    async fn test_validation_rejects_before_store() {
        let f = fixture(10, 5, 3).await;
        f.store.set_unavailable(true).await;

        let err = f
            .ledger
            .apply(&f.product.id, 0, TransactionType::Sale, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::MustBePositive { .. })
        ));

        let long = "x".repeat(256);
        let err = f
            .ledger
            .apply(&f.product.id, 1, TransactionType::Sale, Some(&long))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::TooLong { .. })
        ));

        let err = f
            .ledger
            .apply(&f.product.id, -3, TransactionType::Adjustment, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::Negative { .. })
        ));

        let err = f
            .ledger
            .apply(&f.product.id, 1 << 62, TransactionType::Purchase, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::OutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_largest_quantities_keep_analytics_running() {
        let f = fixture(0, 5, 3).await;

        for t in [
            TransactionType::Purchase,
            TransactionType::Sale,
            TransactionType::Purchase,
            TransactionType::Purchase,
        ] {
            f.ledger
                .apply(&f.product.id, MAX_QUANTITY, t, None)
                .await
                .unwrap();
        }
        f.analytics.flush().await.unwrap();

        let today = pinned_now().date_naive();
        let rows = f
            .store
            .metrics_between(Some(&f.product.id), today, today)
            .await
            .unwrap();
        assert_eq!(rows[0].restock_count, 3 * MAX_QUANTITY);
        assert_eq!(rows[0].sales_count, MAX_QUANTITY);
        assert_eq!(stock_of(&f).await, 2 * MAX_QUANTITY);
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_products() {
        let f = fixture(10, 5, 3).await;

        let err = f
            .ledger
            .apply("missing", 1, TransactionType::Restock, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));

        let mut retired = Product::new("Retired Washer", 10, 5, Utc::now());
        retired.active = false;
        f.store.insert_product(&retired).await.unwrap();

        let err = f
            .ledger
            .apply(&retired.id, 1, TransactionType::Restock, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_store_outage_is_storage_error() {
        let f = fixture(10, 5, 3).await;
        f.store.set_unavailable(true).await;

        let err = f
            .ledger
            .apply(&f.product.id, 1, TransactionType::Restock, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Storage(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_conflict_is_retried() {
        let f = fixture(10, 5, 4).await;
        f.store.simulate_conflicts(3).await;

        let tx = f
            .ledger
            .apply(&f.product.id, 5, TransactionType::Restock, None)
            .await
            .unwrap();
        assert_eq!(tx.resulting_stock, 15);
        assert_eq!(f.store.transaction_count().await, 1);
    }

    #[tokio::test]
    async fn test_conflict_retries_exhausted() {
        let f = fixture(10, 5, 3).await;
        f.store.simulate_conflicts(10).await;

        let err = f
            .ledger
            .apply(&f.product.id, 5, TransactionType::Restock, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict { attempts: 3, .. }));
        assert_eq!(stock_of(&f).await, 10);
        assert_eq!(f.store.transaction_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_restocks_all_land() {
        let f = fixture(0, 5, 3).await;

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let ledger = Arc::clone(&f.ledger);
            let id = f.product.id.clone();
            tasks.push(tokio::spawn(async move {
                ledger.apply(&id, 2, TransactionType::Restock, None).await
            }));
        }
        for t in tasks {
            t.await.unwrap().unwrap();
        }

        assert_eq!(stock_of(&f).await, 100);

        let history = f.store.transactions_for_product(&f.product.id).await.unwrap();
        assert_eq!(history.len(), 50);
        let mut expected = 0;
        let mut by_sequence = history.clone();
        by_sequence.sort_by_key(|t| t.sequence);
        for tx in &by_sequence {
            assert_eq!(tx.previous_stock(), expected);
            expected = tx.resulting_stock;
        }
        assert_eq!(history.iter().map(|t| t.delta).sum::<i64>(), 100);
        assert!(f.locks.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sales_never_oversell() {
        let f = fixture(30, 0, 3).await;

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let ledger = Arc::clone(&f.ledger);
            let id = f.product.id.clone();
            tasks.push(tokio::spawn(async move {
                ledger.apply(&id, 2, TransactionType::Sale, None).await
            }));
        }

        let mut ok = 0;
        let mut insufficient = 0;
        for t in tasks {
            match t.await.unwrap() {
                Ok(_) => ok += 1,
                Err(EngineError::InsufficientStock { .. }) => insufficient += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(ok, 15);
        assert_eq!(insufficient, 5);
        assert_eq!(stock_of(&f).await, 0);
    }

    #[tokio::test]
    async fn test_commit_reaches_analytics() {
        let f = fixture(50, 5, 3).await;

        f.ledger
            .apply(&f.product.id, 8, TransactionType::Sale, None)
            .await
            .unwrap();
        f.analytics.flush().await.unwrap();

        let today = pinned_now().date_naive();
        let rows = f
            .store
            .metrics_between(Some(&f.product.id), today, today)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sales_count, 8);
        assert_eq!(rows[0].opening_stock, 50);
    }

    #[tokio::test]
    async fn test_apply_commits_when_downstream_is_gone() {
        let f = fixture(20, 5, 3).await;
        f.analytics.shutdown().await.unwrap();
        f.alerts.shutdown().await.unwrap();

        let tx = f
            .ledger
            .apply(&f.product.id, 18, TransactionType::Sale, Some("ORD-9"))
            .await
            .unwrap();
        assert_eq!(tx.resulting_stock, 2);
        assert_eq!(stock_of(&f).await, 2);
        assert_eq!(f.store.transaction_count().await, 1);
        assert!(f.sink.notices().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_apply_leaves_prior_state() {
        let f = fixture(10, 5, 1_000).await;
        f.store.simulate_conflicts(1_000).await;

        let outcome = tokio::time::timeout(
            Duration::from_millis(20),
            f.ledger.apply(&f.product.id, 5, TransactionType::Restock, None),
        )
        .await;
        assert!(outcome.is_err());

        assert_eq!(stock_of(&f).await, 10);
        assert_eq!(f.store.transaction_count().await, 0);
        assert!(f.locks.is_empty());

        f.store.simulate_conflicts(0).await;
        let tx = f
            .ledger
            .apply(&f.product.id, 5, TransactionType::Restock, None)
            .await
            .unwrap();
        assert_eq!(tx.resulting_stock, 15);
    }

    #[tokio::test]
    async fn test_lock_table_cleans_up() {
        let locks = ProductLocks::new();
        {
            let _a = locks.lock("a").await;
            let _b = locks.lock("b").await;
            assert_eq!(locks.len(), 2);
        }
        assert!(locks.is_empty());
    }
}
