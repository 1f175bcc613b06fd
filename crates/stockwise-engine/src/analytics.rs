//! # Analytics Aggregator
//!
//! Background task that folds committed transactions into daily metric
//! rows, plus the read side that answers analytics queries from them.
//!
//! ## Aggregation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Analytics Aggregator Flow                           │
//! │                                                                         │
//! │  StockLedger ──publish(tx)──► unbounded channel ──► run loop            │
//! │                                                       │                 │
//! │                              date = clock.date_of(tx.created_at)        │
//! │                              row  = store.daily_metric(product, date)   │
//! │                              row' = metrics::fold_transaction(row, tx)  │
//! │                              store.record_daily_metric(row', tx.id)     │
//! │                                   └─ skipped if tx.id already applied   │
//! │                                                                         │
//! │  rebuild(start, end):                                                   │
//! │    clear rows + marks in range ─► replay transactions in range          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Absorb and rebuild run on the same task, so a row is never folded by two
//! writers at once.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use stockwise_core::metrics::{self, AnalyticsSummary, ProductSalesSummary, RiskEntry};
use stockwise_core::validation::{validate_date_range, validate_limit, validate_product_id};
use stockwise_core::InventoryTransaction;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult, StoreResult};
use crate::store::InventoryStore;

/// Outcome of a metric rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    /// Transactions folded into metrics.
    pub transactions_replayed: usize,
    /// Distinct (product, date) rows written.
    pub metrics_written: usize,
    /// Rows deleted before replay.
    pub metrics_cleared: u64,
}

// =============================================================================
// Handle
// =============================================================================

/// Handle for publishing transactions and querying analytics.
#[derive(Clone)]
pub struct AnalyticsHandle {
    cmd_tx: mpsc::UnboundedSender<AnalyticsCommand>,
    store: Arc<dyn InventoryStore>,
}

#[derive(Debug)]
enum AnalyticsCommand {
    Absorb(InventoryTransaction),
    Flush(oneshot::Sender<()>),
    Rebuild {
        start: NaiveDate,
        end: NaiveDate,
        reply: oneshot::Sender<EngineResult<RebuildReport>>,
    },
    Shutdown(oneshot::Sender<()>),
}

impl AnalyticsHandle {
    /// Queues a committed transaction for aggregation. Never blocks.
    pub fn publish(&self, tx: InventoryTransaction) -> EngineResult<()> {
        self.send(AnalyticsCommand::Absorb(tx))
    }

    /// Waits until every previously published transaction is absorbed.
    pub async fn flush(&self) -> EngineResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(AnalyticsCommand::Flush(done_tx))?;
        done_rx
            .await
            .map_err(|_| EngineError::ChannelError("Analytics aggregator stopped".into()))
    }

    /// Clears and replays metrics for the local dates `start..=end`.
    pub async fn rebuild(&self, start: NaiveDate, end: NaiveDate) -> EngineResult<RebuildReport> {
        validate_date_range(start, end)?;

        let (reply, reply_rx) = oneshot::channel();
        self.send(AnalyticsCommand::Rebuild { start, end, reply })?;
        reply_rx
            .await
            .map_err(|_| EngineError::ChannelError("Analytics aggregator stopped".into()))?
    }

    /// Drains queued transactions and stops the aggregator.
    pub async fn shutdown(&self) -> EngineResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(AnalyticsCommand::Shutdown(done_tx))?;
        done_rx
            .await
            .map_err(|_| EngineError::ChannelError("Analytics aggregator stopped".into()))
    }

    fn send(&self, cmd: AnalyticsCommand) -> EngineResult<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| EngineError::ChannelError("Analytics channel closed".into()))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Sales analytics for one product over the inclusive date range.
    ///
    /// Reflects transactions absorbed so far; call [`flush`](Self::flush)
    /// first for read-your-writes.
    pub async fn product_analytics(
        &self,
        product_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<AnalyticsSummary> {
        validate_product_id(product_id)?;
        validate_date_range(start, end)?;

        if self.store.product(product_id).await?.is_none() {
            return Err(EngineError::not_found("Product", product_id));
        }

        let rows = self
            .store
            .metrics_between(Some(product_id), start, end)
            .await?;
        Ok(metrics::summarize(product_id, start, end, &rows))
    }

    /// Best sellers over the inclusive date range.
    pub async fn top_selling_products(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        limit: usize,
    ) -> EngineResult<Vec<ProductSalesSummary>> {
        validate_date_range(start, end)?;
        validate_limit(limit)?;

        let rows = self.store.metrics_between(None, start, end).await?;
        let products = self.store.products().await?;
        Ok(metrics::rank_top_sellers(&rows, &products, limit))
    }

    /// Stockout risk for every active product, most severe first.
    pub async fn stockout_risk(&self) -> EngineResult<Vec<RiskEntry>> {
        let products = self.store.products().await?;
        Ok(metrics::assess_stockout_risk(&products))
    }
}

// =============================================================================
// Aggregator
// =============================================================================

/// Folds transactions into [`DailyInventoryMetric`](stockwise_core::DailyInventoryMetric) rows.
pub struct AnalyticsAggregator {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
}

impl AnalyticsAggregator {
    pub fn new(store: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>) -> Self {
        AnalyticsAggregator { store, clock }
    }

    /// Starts the aggregator and returns a handle.
    pub fn start(self) -> AnalyticsHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let store = Arc::clone(&self.store);

        tokio::spawn(async move {
            self.run(cmd_rx).await;
        });

        AnalyticsHandle { cmd_tx, store }
    }

    async fn run(self, mut cmd_rx: mpsc::UnboundedReceiver<AnalyticsCommand>) {
        info!("Analytics aggregator started");

        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                AnalyticsCommand::Absorb(tx) => {
                    if let Err(e) = self.absorb(&tx).await {
                        error!(
                            transaction_id = %tx.id,
                            product_id = %tx.product_id,
                            error = %e,
                            "Failed to aggregate transaction; rebuild its date to recover"
                        );
                    }
                }
                AnalyticsCommand::Flush(done) => {
                    let _ = done.send(());
                }
                AnalyticsCommand::Rebuild { start, end, reply } => {
                    let _ = reply.send(self.rebuild(start, end).await);
                }
                AnalyticsCommand::Shutdown(done) => {
                    info!("Analytics aggregator shutting down");
                    let _ = done.send(());
                    break;
                }
            }
        }

        info!("Analytics aggregator stopped");
    }

    /// Folds one transaction. Returns false if it was already applied.
    async fn absorb(&self, tx: &InventoryTransaction) -> StoreResult<bool> {
        let date = self.clock.date_of(tx.created_at);
        let existing = self.store.daily_metric(&tx.product_id, date).await?;
        let metric = metrics::fold_transaction(existing, tx, date, self.clock.now());

        let written = self.store.record_daily_metric(&metric, &tx.id).await?;
        if written {
            debug!(
                transaction_id = %tx.id,
                product_id = %tx.product_id,
                %date,
                sales = metric.sales_count,
                restocks = metric.restock_count,
                "Aggregated transaction"
            );
        }
        Ok(written)
    }

    async fn rebuild(&self, start: NaiveDate, end: NaiveDate) -> EngineResult<RebuildReport> {
        info!(%start, %end, "Rebuilding daily metrics");

        let metrics_cleared = self.store.clear_metrics_between(start, end).await?;

        let (from, to) = self.clock.day_bounds(start, end);
        let txs = self.store.transactions_between(from, to).await?;

        let mut transactions_replayed = 0;
        let mut rows = HashSet::new();
        for tx in &txs {
            if self.absorb(tx).await? {
                transactions_replayed += 1;
                rows.insert((tx.product_id.as_str(), self.clock.date_of(tx.created_at)));
            }
        }

        let report = RebuildReport {
            transactions_replayed,
            metrics_written: rows.len(),
            metrics_cleared,
        };
        info!(
            replayed = report.transactions_replayed,
            written = report.metrics_written,
            cleared = report.metrics_cleared,
            "Daily metrics rebuilt"
        );
        Ok(report)
    }
}
