//! # Alert Dispatcher
//!
//! Background task that turns stock signals from the ledger into
//! [`StockAlert`] records and low-stock notifications.
//!
//! ## Signal Handling
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Alert Dispatcher Flow                             │
//! │                                                                         │
//! │  StockLedger ──signal()──► unbounded channel ──► run loop               │
//! │                                                     │                   │
//! │        ┌────────────────────────────────────────────┤                   │
//! │        ▼                                            ▼                   │
//! │  Low { stock <= threshold }                 Healthy { stock > thr }     │
//! │   ├─ no active alert ─► insert alert        └─ active alert?            │
//! │   │                     spawn notify             └─► resolve it         │
//! │   └─ active alert ───► EDGE:  nothing                                   │
//! │                        LEVEL: spawn notify                              │
//! │                                                                         │
//! │  Notifications run on a JoinSet; failures are logged, never retried.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Signals for one product arrive in commit order because the ledger sends
//! them while holding that product's lock.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use stockwise_core::StockAlert;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::AlertMode;
use crate::error::{EngineError, EngineResult, StoreError};
use crate::store::InventoryStore;

// =============================================================================
// Signals and Notices
// =============================================================================

/// Stock level report sent by the ledger after every commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockSignal {
    /// Stock is at or below the product's threshold.
    Low {
        product_id: String,
        product_name: String,
        stock: i64,
        threshold: i64,
    },

    /// Stock is above the product's threshold.
    Healthy { product_id: String, stock: i64 },
}

impl StockSignal {
    pub fn product_id(&self) -> &str {
        match self {
            StockSignal::Low { product_id, .. } | StockSignal::Healthy { product_id, .. } => {
                product_id
            }
        }
    }
}

/// A request to tell someone a product is running low.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowStockNotice {
    pub alert_id: String,
    pub product_id: String,
    pub product_name: String,
    pub stock: i64,
    pub threshold: i64,
    pub raised_at: DateTime<Utc>,
}

/// Notification delivery failure.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    #[error("Notification encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

// =============================================================================
// Notification Sinks
// =============================================================================

/// Destination for low-stock notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn notify_low_stock(&self, notice: &LowStockNotice) -> Result<(), NotificationError>;
}

/// Logs each notice as a JSON payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn notify_low_stock(&self, notice: &LowStockNotice) -> Result<(), NotificationError> {
        let payload = serde_json::to_string(notice)?;
        info!(
            product_id = %notice.product_id,
            stock = notice.stock,
            threshold = notice.threshold,
            %payload,
            "Low-stock notification requested"
        );
        Ok(())
    }
}

/// Drops every notice.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSink;

#[async_trait]
impl NotificationSink for NoOpSink {
    async fn notify_low_stock(&self, _notice: &LowStockNotice) -> Result<(), NotificationError> {
        Ok(())
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Handle for sending signals to the dispatcher.
#[derive(Clone)]
pub struct AlertHandle {
    cmd_tx: mpsc::UnboundedSender<AlertCommand>,
}

#[derive(Debug)]
enum AlertCommand {
    Signal(StockSignal),
    /// Replies once every earlier signal and its notification has finished.
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

impl AlertHandle {
    /// Queues a signal. Never blocks.
    pub fn signal(&self, signal: StockSignal) -> EngineResult<()> {
        self.cmd_tx
            .send(AlertCommand::Signal(signal))
            .map_err(|_| EngineError::ChannelError("Alert dispatcher channel closed".into()))
    }

    /// Waits until all previously queued signals are processed.
    pub async fn flush(&self) -> EngineResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.cmd_tx
            .send(AlertCommand::Flush(done_tx))
            .map_err(|_| EngineError::ChannelError("Alert dispatcher channel closed".into()))?;
        done_rx
            .await
            .map_err(|_| EngineError::ChannelError("Alert dispatcher stopped".into()))
    }

    /// Drains queued signals and stops the dispatcher.
    pub async fn shutdown(&self) -> EngineResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.cmd_tx
            .send(AlertCommand::Shutdown(done_tx))
            .map_err(|_| EngineError::ChannelError("Alert dispatcher channel closed".into()))?;
        done_rx
            .await
            .map_err(|_| EngineError::ChannelError("Alert dispatcher stopped".into()))
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Low-stock alert state machine.
pub struct AlertDispatcher {
    store: Arc<dyn InventoryStore>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    mode: AlertMode,
}

impl AlertDispatcher {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        mode: AlertMode,
    ) -> Self {
        AlertDispatcher {
            store,
            sink,
            clock,
            mode,
        }
    }

    /// Starts the dispatcher and returns a handle.
    pub fn start(self) -> AlertHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            self.run(cmd_rx).await;
        });

        AlertHandle { cmd_tx }
    }

    async fn run(self, mut cmd_rx: mpsc::UnboundedReceiver<AlertCommand>) {
        info!(mode = %self.mode, "Alert dispatcher started");

        let mut notifications = JoinSet::new();

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(AlertCommand::Signal(signal)) => {
                            self.handle_signal(signal, &mut notifications).await;
                        }
                        Some(AlertCommand::Flush(done)) => {
                            drain(&mut notifications).await;
                            let _ = done.send(());
                        }
                        Some(AlertCommand::Shutdown(done)) => {
                            info!("Alert dispatcher shutting down");
                            drain(&mut notifications).await;
                            let _ = done.send(());
                            break;
                        }
                        None => {
                            drain(&mut notifications).await;
                            break;
                        }
                    }
                }
                Some(joined) = notifications.join_next(), if !notifications.is_empty() => {
                    log_join(joined);
                }
            }
        }

        info!("Alert dispatcher stopped");
    }

    async fn handle_signal(&self, signal: StockSignal, notifications: &mut JoinSet<()>) {
        debug!(product_id = %signal.product_id(), ?signal, "Handling stock signal");

        let result = match signal {
            StockSignal::Low {
                product_id,
                product_name,
                stock,
                threshold,
            } => {
                self.handle_low(product_id, product_name, stock, threshold, notifications)
                    .await
            }
            StockSignal::Healthy { product_id, stock } => {
                self.handle_healthy(&product_id, stock).await
            }
        };

        if let Err(e) = result {
            error!(error = %e, "Failed to process stock signal");
        }
    }

    async fn handle_low(
        &self,
        product_id: String,
        product_name: String,
        stock: i64,
        threshold: i64,
        notifications: &mut JoinSet<()>,
    ) -> Result<(), StoreError> {
        let alert_id = match self.store.active_alert(&product_id).await? {
            Some(active) => match self.mode {
                AlertMode::Edge => {
                    debug!(product_id = %product_id, alert_id = %active.id, "Alert already active");
                    return Ok(());
                }
                AlertMode::Level => active.id,
            },
            None => {
                let alert = StockAlert::new(&product_id, threshold, stock, self.clock.now());
                match self.store.insert_alert(&alert).await {
                    Ok(()) => {}
                    Err(StoreError::Duplicate { .. }) => {
                        debug!(product_id = %product_id, "Alert raised concurrently");
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                }
                info!(
                    product_id = %product_id,
                    alert_id = %alert.id,
                    stock = stock,
                    threshold = threshold,
                    "Low-stock alert raised"
                );
                alert.id
            }
        };

        let notice = LowStockNotice {
            alert_id,
            product_id,
            product_name,
            stock,
            threshold,
            raised_at: self.clock.now(),
        };
        let sink = Arc::clone(&self.sink);
        notifications.spawn(async move {
            if let Err(e) = sink.notify_low_stock(&notice).await {
                let err = EngineError::Dependency(e.to_string());
                warn!(product_id = %notice.product_id, error = %err, "Low-stock notification failed");
            }
        });

        Ok(())
    }

    async fn handle_healthy(&self, product_id: &str, stock: i64) -> Result<(), StoreError> {
        if let Some(active) = self.store.active_alert(product_id).await? {
            if self.store.resolve_alert(&active.id, self.clock.now()).await? {
                info!(
                    product_id = %product_id,
                    alert_id = %active.id,
                    stock = stock,
                    "Low-stock alert resolved"
                );
            }
        }
        Ok(())
    }
}

async fn drain(notifications: &mut JoinSet<()>) {
    while let Some(joined) = notifications.join_next().await {
        log_join(joined);
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Notification task panicked");
    }
}

// =============================================================================
// Test Sinks
// =============================================================================


#[cfg(test)]
mod tests {
    use super::test_sinks::{FailingSink, RecordingSink};
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::InMemoryStore;
    use stockwise_core::Product;

    struct Fixture {
        store: Arc<InMemoryStore>,
        sink: Arc<RecordingSink>,
        handle: AlertHandle,
        product: Product,
    }

    async fn fixture(mode: AlertMode) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let product = Product::new("Ball Valve", 30, 20, Utc::now());
        store.insert_product(&product).await.unwrap();

        let sink = Arc::new(RecordingSink::default());
        let handle = AlertDispatcher::new(
            store.clone(),
            sink.clone(),
            Arc::new(ManualClock::at(Utc::now())),
            mode,
        )
        .start();

        Fixture {
            store,
            sink,
            handle,
            product,
        }
    }

    fn low(product: &Product, stock: i64) -> StockSignal {
        StockSignal::Low {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            stock,
            threshold: product.low_stock_threshold,
        }
    }

    fn healthy(product: &Product, stock: i64) -> StockSignal {
        StockSignal::Healthy {
            product_id: product.id.clone(),
            stock,
        }
    }

    #[tokio::test]
    async fn test_edge_mode_alerts_once_per_crossing() {
        let f = fixture(AlertMode::Edge).await;

        f.handle.signal(low(&f.product, 20)).unwrap();
        f.handle.signal(low(&f.product, 15)).unwrap();
        f.handle.flush().await.unwrap();

        let alerts = f.store.alerts_for_product(&f.product.id).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].active);
        assert_eq!(alerts[0].stock_at_trigger, 20);
        assert_eq!(alerts[0].threshold_at_trigger, 20);
        assert_eq!(f.sink.notices().len(), 1);
    }

    #[tokio::test]
    async fn test_healthy_resolves_and_next_crossing_realerts() {
        let f = fixture(AlertMode::Edge).await;

        f.handle.signal(low(&f.product, 10)).unwrap();
        f.handle.signal(healthy(&f.product, 40)).unwrap();
        f.handle.flush().await.unwrap();

        assert!(f.store.active_alert(&f.product.id).await.unwrap().is_none());
        let history = f.store.alerts_for_product(&f.product.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].resolved_at.is_some());

        f.handle.signal(low(&f.product, 5)).unwrap();
        f.handle.flush().await.unwrap();

        let history = f.store.alerts_for_product(&f.product.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().filter(|a| a.active).count(), 1);
        assert_eq!(f.sink.notices().len(), 2);
    }

    #[tokio::test]
    async fn test_level_mode_renotifies_without_second_alert() {
        let f = fixture(AlertMode::Level).await;

        f.handle.signal(low(&f.product, 20)).unwrap();
        f.handle.signal(low(&f.product, 15)).unwrap();
        f.handle.signal(low(&f.product, 12)).unwrap();
        f.handle.flush().await.unwrap();

        let alerts = f.store.alerts_for_product(&f.product.id).await.unwrap();
        assert_eq!(alerts.len(), 1);

        let notices = f.sink.notices();
        assert_eq!(notices.len(), 3);
        assert!(notices.iter().all(|n| n.alert_id == alerts[0].id));
    }

    #[tokio::test]
    async fn test_healthy_without_alert_is_noop() {
        let f = fixture(AlertMode::Edge).await;

        f.handle.signal(healthy(&f.product, 50)).unwrap();
        f.handle.flush().await.unwrap();

        assert!(f
            .store
            .alerts_for_product(&f.product.id)
            .await
            .unwrap()
            .is_empty());
        assert!(f.sink.notices().is_empty());
    }

    #[tokio::test]
    async fn test_failing_sink_still_records_alert() {
        let store = Arc::new(InMemoryStore::new());
        let product = Product::new("Fuse", 3, 10, Utc::now());
        store.insert_product(&product).await.unwrap();

        let handle = AlertDispatcher::new(
            store.clone(),
            Arc::new(FailingSink),
            Arc::new(ManualClock::at(Utc::now())),
            AlertMode::Edge,
        )
        .start();

        handle.signal(low(&product, 3)).unwrap();
        handle.flush().await.unwrap();

        assert!(store.active_alert(&product.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_signal_after_shutdown_is_channel_error() {
        let f = fixture(AlertMode::Edge).await;
        f.handle.shutdown().await.unwrap();

        // The run loop has exited and dropped its receiver.
        tokio::task::yield_now().await;
        let err = f.handle.signal(low(&f.product, 1)).unwrap_err();
        assert!(matches!(err, EngineError::ChannelError(_)));
    }

    #[tokio::test]
    async fn test_tracing_sink_encodes_notice() {
        let notice = LowStockNotice {
            alert_id: "a1".into(),
            product_id: "p1".into(),
            product_name: "Fuse".into(),
            stock: 2,
            threshold: 10,
            raised_at: Utc::now(),
        };
        assert!(TracingSink.notify_low_stock(&notice).await.is_ok());
        assert!(NoOpSink.notify_low_stock(&notice).await.is_ok());
    }
}
