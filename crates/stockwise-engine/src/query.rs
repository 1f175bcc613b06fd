//! Read-side queries and threshold updates.

use std::sync::Arc;

use stockwise_core::validation::{validate_product_id, validate_threshold};
use stockwise_core::{InventoryTransaction, Product, StockAlert};
use tracing::info;

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};
use crate::ledger::ProductLocks;
use crate::store::InventoryStore;

/// Queries over products, the ledger and alerts.
pub struct QueryService {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
    locks: Arc<ProductLocks>,
}

impl QueryService {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        clock: Arc<dyn Clock>,
        locks: Arc<ProductLocks>,
    ) -> Self {
        QueryService {
            store,
            clock,
            locks,
        }
    }

    /// A product's transactions, oldest first. Equal timestamps keep commit
    /// order.
    pub async fn list_transactions(
        &self,
        product_id: &str,
    ) -> EngineResult<Vec<InventoryTransaction>> {
        self.require_product(product_id).await?;
        Ok(self.store.transactions_for_product(product_id).await?)
    }

    /// Active products at or below their threshold, ordered by id.
    pub async fn list_low_stock(&self) -> EngineResult<Vec<Product>> {
        Ok(self.store.low_stock_products().await?)
    }

    /// Updates a product's low-stock threshold.
    ///
    /// Existing alerts and metrics are left as they are; the new threshold
    /// applies from the next committed transaction.
    pub async fn set_threshold(&self, product_id: &str, threshold: i64) -> EngineResult<Product> {
        validate_product_id(product_id)?;
        validate_threshold(threshold)?;

        let _lock = self.locks.lock(product_id).await;
        let product = self
            .store
            .set_threshold(product_id, threshold, self.clock.now())
            .await?
            .ok_or_else(|| EngineError::not_found("Product", product_id))?;

        info!(product_id = %product_id, threshold = threshold, "Low-stock threshold updated");
        Ok(product)
    }

    /// A product's alert history, newest first.
    pub async fn list_alerts(&self, product_id: &str) -> EngineResult<Vec<StockAlert>> {
        self.require_product(product_id).await?;
        Ok(self.store.alerts_for_product(product_id).await?)
    }

    async fn require_product(&self, product_id: &str) -> EngineResult<Product> {
        validate_product_id(product_id)?;
        self.store
            .product(product_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Product", product_id))
    }
}
