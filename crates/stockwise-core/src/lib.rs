//! # stockwise-core: Pure Inventory Logic for Stockwise
//!
//! This crate is the **heart** of Stockwise. It contains the stock ledger
//! rules as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockwise Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 stockwise-engine (Services)                     │   │
//! │  │   StockLedger ──► AlertDispatcher ──► AnalyticsAggregator      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ stockwise-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  mutator  │  │  metrics  │  │ validation│  │   │
//! │  │   │  Product  │  │  deltas   │  │ daily fold│  │   rules   │  │   │
//! │  │   │ Txn/Alert │  │  limits   │  │ risk/rank │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 stockwise-db (Database Layer)                   │   │
//! │  │              SQLite queries, migrations, repositories           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, InventoryTransaction, StockAlert, ...)
//! - [`mutator`] - Signed stock delta per transaction type
//! - [`metrics`] - Daily metric folding, range summaries, stockout risk
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use stockwise_core::mutator::StockMutator;
//! use stockwise_core::TransactionType;
//!
//! // Selling 90 of 100 leaves 10 on hand
//! let change = StockMutator::apply(TransactionType::Sale, 90, 100).unwrap();
//! assert_eq!(change.delta, -90);
//! assert_eq!(change.resulting_stock, 10);
//!
//! // An adjustment sets an absolute level
//! let change = StockMutator::apply(TransactionType::Adjustment, 40, 10).unwrap();
//! assert_eq!(change.delta, 30);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod metrics;
pub mod mutator;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use metrics::RiskLevel;
pub use mutator::{StockChange, StockMutator};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of a transaction reference string.
///
/// References are free-form correlation ids (order numbers, PO numbers).
/// Anything longer is almost certainly a payload pasted in by mistake.
pub const MAX_REFERENCE_LEN: usize = 255;

/// Maximum length of a product name.
pub const MAX_PRODUCT_NAME_LEN: usize = 200;

/// Largest quantity a single transaction may carry.
pub const MAX_QUANTITY: i64 = i32::MAX as i64;
