//! # Domain Types
//!
//! Core domain types used throughout Stockwise.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────────┐   ┌─────────────────┐  │
//! │  │    Product      │   │ InventoryTransaction │   │   StockAlert    │  │
//! │  │  ─────────────  │   │  ──────────────────  │   │  ─────────────  │  │
//! │  │  id (UUID)      │◄──│  product_id (FK)     │   │  product_id(FK) │  │
//! │  │  name           │   │  transaction_type    │   │  threshold_at_  │  │
//! │  │  stock_quantity │   │  quantity / delta    │   │    trigger      │  │
//! │  │  low_stock_     │   │  resulting_stock     │   │  active         │  │
//! │  │    threshold    │   │  sequence            │   │  resolved_at    │  │
//! │  └─────────────────┘   └──────────────────────┘   └─────────────────┘  │
//! │                                                                         │
//! │  ┌──────────────────────┐   ┌─────────────────┐                        │
//! │  │ DailyInventoryMetric │   │ TransactionType │                        │
//! │  │  ──────────────────  │   │  ─────────────  │                        │
//! │  │  (product_id, date)  │   │  Purchase  (+)  │                        │
//! │  │  sales / restocks    │   │  Restock   (+)  │                        │
//! │  │  days_out_of_stock   │   │  Return    (+)  │                        │
//! │  │  turnover_rate       │   │  Sale      (-)  │                        │
//! │  │  opening_stock       │   │  Damaged   (-)  │                        │
//! │  └──────────────────────┘   │  Adjustment(=)  │                        │
//! │                             └─────────────────┘                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ownership
//! Products belong to the external catalog. The ledger only ever changes
//! `stock_quantity` (through a committed transaction) and
//! `low_stock_threshold` (through an explicit threshold update).
//! Transactions are append-only and never mutated after commit.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

// =============================================================================
// Product
// =============================================================================

/// A stocked product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Unique identifier (UUID v4 as a string).
    pub id: String,

    /// Display name.
    pub name: String,

    /// Units currently on hand. Never negative after a committed apply.
    pub stock_quantity: i64,

    /// At or below this level the product counts as low on stock.
    pub low_stock_threshold: i64,

    /// Inactive products reject new transactions.
    pub active: bool,

    /// When the product was created.
    pub created_at: DateTime<Utc>,

    /// When stock or threshold last changed.
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Creates a new active product with a fresh id.
    pub fn new(
        name: impl Into<String>,
        stock_quantity: i64,
        low_stock_threshold: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Product {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            stock_quantity,
            low_stock_threshold,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Checks if the product is at or below its low-stock threshold.
    #[inline]
    pub fn is_low_stock(&self) -> bool {
        self.stock_quantity <= self.low_stock_threshold
    }
}

// =============================================================================
// Transaction Type
// =============================================================================

/// The kind of stock movement a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Goods bought from a supplier.
    Purchase,
    /// Goods sold to a customer.
    Sale,
    /// Goods put back on the shelf (e.g., from a back room).
    Restock,
    /// Goods returned by a customer.
    Return,
    /// Goods written off.
    Damaged,
    /// Stock set to an absolute level after a count.
    Adjustment,
}

impl TransactionType {
    /// All transaction types, in declaration order.
    pub const ALL: [TransactionType; 6] = [
        TransactionType::Purchase,
        TransactionType::Sale,
        TransactionType::Restock,
        TransactionType::Return,
        TransactionType::Damaged,
        TransactionType::Adjustment,
    ];

    /// Lowercase name as stored in the database.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Sale => "sale",
            TransactionType::Restock => "restock",
            TransactionType::Return => "return",
            TransactionType::Damaged => "damaged",
            TransactionType::Adjustment => "adjustment",
        }
    }

    /// Whether this type counts towards daily restocks.
    #[inline]
    pub const fn is_restock(&self) -> bool {
        matches!(
            self,
            TransactionType::Purchase | TransactionType::Restock | TransactionType::Return
        )
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = ValidationError;

    /// Parses a transaction type, ignoring case and surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        TransactionType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "transaction_type".to_string(),
                reason: format!("malformed transaction type '{}'", s),
            })
    }
}

// =============================================================================
// Inventory Transaction
// =============================================================================

/// One committed stock movement.
///
/// For `Adjustment`, `quantity` is the absolute target level and `delta`
/// is the difference that was actually applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InventoryTransaction {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Product this movement applies to.
    pub product_id: String,

    /// Quantity as supplied by the caller.
    pub quantity: i64,

    /// Kind of movement.
    pub transaction_type: TransactionType,

    /// Signed change applied to stock.
    pub delta: i64,

    /// Free-form correlation string (order number, PO number, ...).
    pub reference: Option<String>,

    /// Stock level right after this transaction committed.
    pub resulting_stock: i64,

    /// Store-assigned commit position. Strictly increasing; 0 until committed.
    pub sequence: i64,

    /// When the transaction was applied.
    pub created_at: DateTime<Utc>,
}

impl InventoryTransaction {
    /// Stock level immediately before this transaction.
    #[inline]
    pub fn previous_stock(&self) -> i64 {
        self.resulting_stock - self.delta
    }
}

// =============================================================================
// Stock Alert
// =============================================================================

/// A low-stock alert.
///
/// At most one alert per product is active at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockAlert {
    pub id: String,
    pub product_id: String,
    /// Threshold in force when the alert fired.
    pub threshold_at_trigger: i64,
    /// Stock level that fired the alert.
    pub stock_at_trigger: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl StockAlert {
    /// Creates a new active alert.
    pub fn new(
        product_id: impl Into<String>,
        threshold_at_trigger: i64,
        stock_at_trigger: i64,
        now: DateTime<Utc>,
    ) -> Self {
        StockAlert {
            id: uuid::Uuid::new_v4().to_string(),
            product_id: product_id.into(),
            threshold_at_trigger,
            stock_at_trigger,
            active: true,
            created_at: now,
            resolved_at: None,
        }
    }
}

// =============================================================================
// Daily Inventory Metric
// =============================================================================

/// Per-product, per-day aggregate of committed transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DailyInventoryMetric {
    pub product_id: String,

    /// Local calendar date under the engine's configured offset.
    pub date: NaiveDate,

    /// Units sold.
    pub sales_count: i64,

    /// Units purchased, restocked or returned.
    pub restock_count: i64,

    /// 1 if any transaction that day left stock at zero, else 0.
    pub days_out_of_stock: i64,

    /// `sales_count / max(1, opening_stock)`.
    pub turnover_rate: f64,

    /// Stock right before the first transaction of the day.
    pub opening_stock: i64,

    /// Sequence of the first transaction of the day.
    pub first_sequence: i64,

    pub updated_at: DateTime<Utc>,
}

impl DailyInventoryMetric {
    /// Creates an empty metric row seeded from the day's first transaction.
    pub fn empty(
        product_id: impl Into<String>,
        date: NaiveDate,
        opening_stock: i64,
        first_sequence: i64,
        now: DateTime<Utc>,
    ) -> Self {
        DailyInventoryMetric {
            product_id: product_id.into(),
            date,
            sales_count: 0,
            restock_count: 0,
            days_out_of_stock: 0,
            turnover_rate: 0.0,
            opening_stock,
            first_sequence,
            updated_at: now,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
