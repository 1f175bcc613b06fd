//! # stockwise-engine: Ledger, Alerting and Analytics Services
//!
//! This crate runs the inventory engine on top of `stockwise-core` (pure
//! rules) and `stockwise-db` (SQLite).
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          InventoryService                               │
//! │                                                                         │
//! │   record_transaction ──► StockLedger ───────────────┐                  │
//! │                            │  per-product lock      │ commit (CAS)     │
//! │                            │  CAS retry + backoff   ▼                  │
//! │                            │                 ┌───────────────────┐     │
//! │                            │                 │ dyn InventoryStore│     │
//! │                            │                 │  InMemory │ SQLite│     │
//! │                            │                 └───────────────────┘     │
//! │             publish(tx) ◄──┴──► signal(Low/Healthy)    ▲               │
//! │                 │                    │                 │               │
//! │                 ▼                    ▼                 │               │
//! │   ┌─────────────────────┐  ┌───────────────────┐       │               │
//! │   │ AnalyticsAggregator │  │  AlertDispatcher  │───────┤               │
//! │   │ daily metric fold   │  │  StockAlert rows  │       │               │
//! │   │ rebuild / queries   │  │  NotificationSink │       │               │
//! │   └─────────┬───────────┘  └───────────────────┘       │               │
//! │             └──────────────────────────────────────────┘               │
//! │                                                                         │
//! │   list_transactions / list_low_stock / set_threshold ──► QueryService  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`service`] - `InventoryService` façade and builder
//! - [`ledger`] - `StockLedger` and the per-product lock table
//! - [`alerts`] - `AlertDispatcher` task and notification sinks
//! - [`analytics`] - `AnalyticsAggregator` task and analytics queries
//! - [`query`] - Read-side queries and threshold updates
//! - [`store`] - `InventoryStore` port with in-memory and SQLite adapters
//! - [`clock`] - Time source and timezone for date bucketing
//! - [`config`] - TOML/env configuration
//! - [`error`] - Engine error types
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use stockwise_core::{Product, TransactionType};
//! use stockwise_engine::{InMemoryStore, InventoryService};
//!
//! # async fn demo() -> stockwise_engine::EngineResult<()> {
//! let service = InventoryService::builder()
//!     .store(Arc::new(InMemoryStore::new()))
//!     .build()?;
//!
//! let bolt = service
//!     .insert_product(Product::new("Hex Bolt", 100, 20, chrono::Utc::now()))
//!     .await?;
//! service
//!     .record_transaction(&bolt.id, 90, TransactionType::Sale, Some("ORD-1"))
//!     .await?;
//!
//! service.flush().await?;
//! assert_eq!(service.list_low_stock().await?.len(), 1);
//! service.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod analytics;
pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod query;
pub mod service;
pub mod store;

pub use alerts::{LowStockNotice, NoOpSink, NotificationError, NotificationSink, StockSignal, TracingSink};
pub use analytics::RebuildReport;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AlertMode, EngineConfig};
pub use error::{EngineError, EngineResult, StoreError, StoreResult};
pub use ledger::{ProductLocks, StockLedger};
pub use query::QueryService;
pub use service::{InventoryService, InventoryServiceBuilder};
pub use store::{InMemoryStore, InventoryStore, SqliteStore, StockCommit};
