//! # Metric Repository
//!
//! Daily inventory metrics plus the `metric_applications` dedup table.
//!
//! ## Idempotent Record
//! ```text
//! record(metric, transaction_id)
//!   BEGIN
//!     INSERT OR IGNORE INTO metric_applications (transaction_id, ...)
//!       │
//!       ├── ignored (already applied) ──► ROLLBACK, return false
//!       ▼
//!     UPSERT daily_inventory_metrics (product_id, metric_date)
//!   COMMIT, return true
//! ```
//!
//! The mark and the row change in one transaction, so a crash can never
//! leave a transaction counted but unmarked (or the reverse).

use chrono::NaiveDate;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use stockwise_core::DailyInventoryMetric;

const METRIC_COLUMNS: &str = r#"
    product_id,
    metric_date AS date,
    sales_count,
    restock_count,
    days_out_of_stock,
    turnover_rate,
    opening_stock,
    first_sequence,
    updated_at
"#;

/// Repository for daily inventory metrics.
#[derive(Debug, Clone)]
pub struct MetricRepository {
    pool: SqlitePool,
}

impl MetricRepository {
    /// Creates a new MetricRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MetricRepository { pool }
    }

    /// Gets the metric row for a product and date.
    pub async fn get(
        &self,
        product_id: &str,
        date: NaiveDate,
    ) -> DbResult<Option<DailyInventoryMetric>> {
        let sql = format!(
            "SELECT {} FROM daily_inventory_metrics WHERE product_id = ?1 AND metric_date = ?2",
            METRIC_COLUMNS
        );
        let metric = sqlx::query_as::<_, DailyInventoryMetric>(&sql)
            .bind(product_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;

        Ok(metric)
    }

    /// Writes a folded metric row, once per contributing transaction.
    ///
    /// ## Returns
    /// * `Ok(true)` - Row written and the transaction marked as applied
    /// * `Ok(false)` - The transaction was already applied; nothing changed
    pub async fn record(&self, metric: &DailyInventoryMetric, transaction_id: &str) -> DbResult<bool> {
        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let marked = sqlx::query(
            r#"
            INSERT OR IGNORE INTO metric_applications (transaction_id, product_id, metric_date)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(transaction_id)
        .bind(&metric.product_id)
        .bind(metric.date)
        .execute(&mut *db_tx)
        .await?;

        if marked.rows_affected() == 0 {
            debug!(transaction_id = %transaction_id, "Transaction already applied to metrics");
            db_tx
                .rollback()
                .await
                .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO daily_inventory_metrics (
                product_id, metric_date, sales_count, restock_count,
                days_out_of_stock, turnover_rate, opening_stock,
                first_sequence, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT (product_id, metric_date) DO UPDATE SET
                sales_count       = excluded.sales_count,
                restock_count     = excluded.restock_count,
                days_out_of_stock = excluded.days_out_of_stock,
                turnover_rate     = excluded.turnover_rate,
                opening_stock     = excluded.opening_stock,
                first_sequence    = excluded.first_sequence,
                updated_at        = excluded.updated_at
            "#,
        )
        .bind(&metric.product_id)
        .bind(metric.date)
        .bind(metric.sales_count)
        .bind(metric.restock_count)
        .bind(metric.days_out_of_stock)
        .bind(metric.turnover_rate)
        .bind(metric.opening_stock)
        .bind(metric.first_sequence)
        .bind(metric.updated_at)
        .execute(&mut *db_tx)
        .await?;

        db_tx
            .commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(true)
    }

    /// Lists metric rows with `start <= date <= end`, optionally for one product.
    ///
    /// Ordered by product id, then date.
    pub async fn list_between(
        &self,
        product_id: Option<&str>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> DbResult<Vec<DailyInventoryMetric>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM daily_inventory_metrics
            WHERE metric_date >= ?1 AND metric_date <= ?2
              AND (?3 IS NULL OR product_id = ?3)
            ORDER BY product_id, metric_date
            "#,
            METRIC_COLUMNS
        );
        let metrics = sqlx::query_as::<_, DailyInventoryMetric>(&sql)
            .bind(start)
            .bind(end)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(metrics)
    }

    /// Deletes metric rows and dedup marks with `start <= date <= end`.
    ///
    /// Returns the number of metric rows deleted.
    pub async fn clear_between(&self, start: NaiveDate, end: NaiveDate) -> DbResult<u64> {
        debug!(%start, %end, "Clearing daily metrics");

        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let rows = sqlx::query(
            "DELETE FROM daily_inventory_metrics WHERE metric_date >= ?1 AND metric_date <= ?2",
        )
        .bind(start)
        .bind(end)
        .execute(&mut *db_tx)
        .await?;

        sqlx::query("DELETE FROM metric_applications WHERE metric_date >= ?1 AND metric_date <= ?2")
            .bind(start)
            .bind(end)
            .execute(&mut *db_tx)
            .await?;

        db_tx
            .commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(rows.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::db_with_product;
    use chrono::Utc;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn metric(product_id: &str, d: u32, sales: i64) -> DailyInventoryMetric {
        let mut m = DailyInventoryMetric::empty(product_id, day(d), 100, 1, Utc::now());
        m.sales_count = sales;
        m.turnover_rate = sales as f64 / 100.0;
        m
    }

    #[tokio::test]
    async fn test_record_is_idempotent_per_transaction() {
        let (db, product) = db_with_product(100, 20).await;
        let repo = db.metrics();

        assert!(repo.record(&metric(&product.id, 1, 10), "tx-1").await.unwrap());
        assert!(!repo.record(&metric(&product.id, 1, 99), "tx-1").await.unwrap());

        let stored = repo.get(&product.id, day(1)).await.unwrap().unwrap();
        assert_eq!(stored.sales_count, 10);

        assert!(repo.record(&metric(&product.id, 1, 25), "tx-2").await.unwrap());
        let stored = repo.get(&product.id, day(1)).await.unwrap().unwrap();
        assert_eq!(stored.sales_count, 25);
        assert!((stored.turnover_rate - 0.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_list_between_filters() {
        let (db, product) = db_with_product(100, 20).await;
        let repo = db.metrics();

        repo.record(&metric(&product.id, 1, 1), "a").await.unwrap();
        repo.record(&metric(&product.id, 3, 3), "b").await.unwrap();
        repo.record(&metric(&product.id, 9, 9), "c").await.unwrap();

        let rows = repo.list_between(Some(&product.id), day(1), day(3)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, day(1));
        assert_eq!(rows[1].date, day(3));

        let all = repo.list_between(None, day(1), day(31)).await.unwrap();
        assert_eq!(all.len(), 3);

        let none = repo.list_between(Some("other"), day(1), day(31)).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_clear_between_resets_dedup_marks() {
        let (db, product) = db_with_product(100, 20).await;
        let repo = db.metrics();

        repo.record(&metric(&product.id, 1, 5), "tx-1").await.unwrap();
        repo.record(&metric(&product.id, 5, 5), "tx-5").await.unwrap();

        assert_eq!(repo.clear_between(day(1), day(2)).await.unwrap(), 1);
        assert!(repo.get(&product.id, day(1)).await.unwrap().is_none());
        assert!(repo.get(&product.id, day(5)).await.unwrap().is_some());

        // The mark for tx-1 is gone, so it can be applied again
        assert!(repo.record(&metric(&product.id, 1, 5), "tx-1").await.unwrap());
        // tx-5 is outside the cleared range
        assert!(!repo.record(&metric(&product.id, 5, 5), "tx-5").await.unwrap());
    }
}
