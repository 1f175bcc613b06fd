//! # Alert Repository
//!
//! Low-stock alert storage. The partial unique index
//! `idx_stock_alerts_one_active` guarantees at most one active alert per
//! product even if two dispatchers race.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use stockwise_core::StockAlert;

const ALERT_COLUMNS: &str = r#"
    id,
    product_id,
    threshold_at_trigger,
    stock_at_trigger,
    active,
    created_at,
    resolved_at
"#;

/// Repository for stock alerts.
#[derive(Debug, Clone)]
pub struct AlertRepository {
    pool: SqlitePool,
}

impl AlertRepository {
    /// Creates a new AlertRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AlertRepository { pool }
    }

    /// Gets the product's active alert, if any.
    pub async fn active_for_product(&self, product_id: &str) -> DbResult<Option<StockAlert>> {
        let sql = format!(
            "SELECT {} FROM stock_alerts WHERE product_id = ?1 AND active = 1",
            ALERT_COLUMNS
        );
        let alert = sqlx::query_as::<_, StockAlert>(&sql)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(alert)
    }

    /// Inserts a new alert.
    ///
    /// ## Errors
    /// - `UniqueViolation` if the product already has an active alert
    pub async fn insert(&self, alert: &StockAlert) -> DbResult<()> {
        debug!(
            id = %alert.id,
            product_id = %alert.product_id,
            stock = alert.stock_at_trigger,
            threshold = alert.threshold_at_trigger,
            "Inserting stock alert"
        );

        sqlx::query(
            r#"
            INSERT INTO stock_alerts (
                id, product_id, threshold_at_trigger, stock_at_trigger,
                active, created_at, resolved_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&alert.id)
        .bind(&alert.product_id)
        .bind(alert.threshold_at_trigger)
        .bind(alert.stock_at_trigger)
        .bind(alert.active)
        .bind(alert.created_at)
        .bind(alert.resolved_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, &alert.product_id),
            other => other,
        })?;

        Ok(())
    }

    /// Resolves an active alert.
    ///
    /// ## Returns
    /// * `Ok(true)` - The alert was active and is now resolved
    /// * `Ok(false)` - No active alert with that id
    pub async fn resolve(&self, id: &str, now: DateTime<Utc>) -> DbResult<bool> {
        debug!(id = %id, "Resolving stock alert");

        let result = sqlx::query(
            r#"
            UPDATE stock_alerts
            SET active = 0, resolved_at = ?2
            WHERE id = ?1 AND active = 1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists a product's alerts, newest first.
    pub async fn list_for_product(&self, product_id: &str) -> DbResult<Vec<StockAlert>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM stock_alerts
            WHERE product_id = ?1
            ORDER BY created_at DESC, rowid DESC
            "#,
            ALERT_COLUMNS
        );
        let alerts = sqlx::query_as::<_, StockAlert>(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(alerts)
    }
}
