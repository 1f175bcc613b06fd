//! # Ledger Repository
//!
//! The append-only inventory transaction log.
//!
//! ## Atomic Commit
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       commit(product, expected, new, tx)                │
//! │                                                                         │
//! │  BEGIN                                                                 │
//! │    UPDATE products SET stock_quantity = new                            │
//! │     WHERE id = product AND stock_quantity = expected AND active = 1    │
//! │       │                                                                 │
//! │       ├── 0 rows ──► ROLLBACK, StaleWrite (caller reloads and retries) │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │    INSERT INTO inventory_transactions ... → sequence = last rowid      │
//! │  COMMIT                                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Dropping the future before COMMIT rolls the whole unit back.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use stockwise_core::InventoryTransaction;

const TRANSACTION_COLUMNS: &str = r#"
    id,
    product_id,
    quantity,
    transaction_type,
    delta,
    reference,
    resulting_stock,
    sequence,
    created_at
"#;

/// Repository for inventory transactions.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Commits a stock change and its transaction record atomically.
    ///
    /// `tx.resulting_stock` is written as the product's new stock level,
    /// guarded by `expected_stock`. The returned transaction carries the
    /// store-assigned `sequence`.
    ///
    /// ## Errors
    /// - `StaleWrite` if the stock no longer equals `expected_stock` or the
    ///   product is missing or inactive
    /// - `UniqueViolation` if the transaction id was already committed
    pub async fn commit(
        &self,
        expected_stock: i64,
        tx: &InventoryTransaction,
    ) -> DbResult<InventoryTransaction> {
        debug!(
            product_id = %tx.product_id,
            transaction_id = %tx.id,
            expected_stock = expected_stock,
            resulting_stock = tx.resulting_stock,
            "Committing stock change"
        );

        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let updated = sqlx::query(
            r#"
            UPDATE products
            SET stock_quantity = ?1, updated_at = ?2
            WHERE id = ?3 AND stock_quantity = ?4 AND active = 1
            "#,
        )
        .bind(tx.resulting_stock)
        .bind(tx.created_at)
        .bind(&tx.product_id)
        .bind(expected_stock)
        .execute(&mut *db_tx)
        .await?;

        if updated.rows_affected() == 0 {
            db_tx
                .rollback()
                .await
                .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
            return Err(DbError::stale("Product", &tx.product_id));
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO inventory_transactions (
                id, product_id, quantity, transaction_type, delta,
                reference, resulting_stock, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&tx.id)
        .bind(&tx.product_id)
        .bind(tx.quantity)
        .bind(tx.transaction_type)
        .bind(tx.delta)
        .bind(&tx.reference)
        .bind(tx.resulting_stock)
        .bind(tx.created_at)
        .execute(&mut *db_tx)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, &tx.id),
            other => other,
        })?;

        db_tx
            .commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let mut committed = tx.clone();
        committed.sequence = inserted.last_insert_rowid();
        Ok(committed)
    }

    /// Gets a transaction by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<InventoryTransaction>> {
        let sql = format!(
            "SELECT {} FROM inventory_transactions WHERE id = ?1",
            TRANSACTION_COLUMNS
        );
        let tx = sqlx::query_as::<_, InventoryTransaction>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(tx)
    }

    /// Lists a product's transactions, oldest first, ties broken by sequence.
    pub async fn list_for_product(&self, product_id: &str) -> DbResult<Vec<InventoryTransaction>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM inventory_transactions
            WHERE product_id = ?1
            ORDER BY created_at ASC, sequence ASC
            "#,
            TRANSACTION_COLUMNS
        );
        let txs = sqlx::query_as::<_, InventoryTransaction>(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;

        debug!(product_id = %product_id, count = txs.len(), "Listed transactions");
        Ok(txs)
    }

    /// Lists all transactions with `from <= created_at < to`, in commit order.
    pub async fn list_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<InventoryTransaction>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM inventory_transactions
            WHERE created_at >= ?1 AND created_at < ?2
            ORDER BY sequence ASC
            "#,
            TRANSACTION_COLUMNS
        );
        let txs = sqlx::query_as::<_, InventoryTransaction>(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;

        Ok(txs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::db_with_product;
    use chrono::Duration;
    use stockwise_core::{StockMutator, TransactionType};

    fn sale(product_id: &str, quantity: i64, current: i64, at: DateTime<Utc>) -> InventoryTransaction {
        let change = StockMutator::apply(TransactionType::Sale, quantity, current).unwrap();
        InventoryTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            product_id: product_id.to_string(),
            quantity,
            transaction_type: TransactionType::Sale,
            delta: change.delta,
            reference: Some("ORD-1".to_string()),
            resulting_stock: change.resulting_stock,
            sequence: 0,
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_commit_updates_stock_and_assigns_sequence() {
        let (db, product) = db_with_product(100, 20).await;
        let ledger = db.ledger();

        let first = ledger
            .commit(100, &sale(&product.id, 90, 100, Utc::now()))
            .await
            .unwrap();
        let second = ledger
            .commit(10, &sale(&product.id, 5, 10, Utc::now()))
            .await
            .unwrap();

        assert!(first.sequence > 0);
        assert!(second.sequence > first.sequence);

        let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock_quantity, 5);

        let loaded = ledger.get_by_id(&first.id).await.unwrap().unwrap();
        assert_eq!(loaded, first);
    }

    #[tokio::test]
    async fn test_stale_commit_writes_nothing() {
        let (db, product) = db_with_product(100, 20).await;
        let ledger = db.ledger();

        let err = ledger
            .commit(99, &sale(&product.id, 10, 99, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::StaleWrite { .. }));

        let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock_quantity, 100);
        assert!(ledger.list_for_product(&product.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inactive_product_is_stale() {
        let (db, product) = db_with_product(100, 20).await;
        db.products().deactivate(&product.id, Utc::now()).await.unwrap();

        let err = db
            .ledger()
            .commit(100, &sale(&product.id, 1, 100, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::StaleWrite { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_transaction_id_rolls_back() {
        let (db, product) = db_with_product(100, 20).await;
        let ledger = db.ledger();

        let tx = sale(&product.id, 10, 100, Utc::now());
        ledger.commit(100, &tx).await.unwrap();

        let mut replay = tx.clone();
        replay.resulting_stock = 80;
        replay.delta = -10;
        let err = ledger.commit(90, &replay).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock_quantity, 90);
    }

    #[tokio::test]
    async fn test_history_order_and_range() {
        let (db, product) = db_with_product(100, 20).await;
        let ledger = db.ledger();
        let base = Utc::now();

        ledger
            .commit(100, &sale(&product.id, 1, 100, base + Duration::hours(2)))
            .await
            .unwrap();
        ledger
            .commit(99, &sale(&product.id, 1, 99, base))
            .await
            .unwrap();

        let history = ledger.list_for_product(&product.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].created_at < history[1].created_at);

        let window = ledger
            .list_between(base - Duration::minutes(1), base + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].resulting_stock, 98);
    }
}
