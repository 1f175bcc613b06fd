//! # Stock Mutator
//!
//! Computes the signed stock change for a transaction.
//!
//! ## Delta Rules
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  Type         Delta                   Quantity rule       │
//! │  ──────────   ─────────────────────   ─────────────────   │
//! │  Purchase     +quantity               > 0                 │
//! │  Restock      +quantity               > 0                 │
//! │  Return       +quantity               > 0                 │
//! │  Sale         -quantity               > 0                 │
//! │  Damaged      -quantity               > 0                 │
//! │  Adjustment   quantity - current      >= 0 (target level) │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! The mutator never reads or writes anything. Persisting the change is the
//! ledger's job.

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::TransactionType;
use crate::validation::{validate_quantity, ValidationResult};

/// The outcome of applying a transaction to a stock level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockChange {
    /// Signed change to apply.
    pub delta: i64,
    /// Stock level after the change. Never negative.
    pub resulting_stock: i64,
}

/// Pure stock arithmetic.
pub struct StockMutator;

impl StockMutator {
    /// Returns the signed delta for a transaction against `current_stock`.
    ///
    /// Only validates the quantity; the resulting level is not checked.
    pub fn delta(
        transaction_type: TransactionType,
        quantity: i64,
        current_stock: i64,
    ) -> ValidationResult<i64> {
        validate_quantity(transaction_type, quantity)?;

        let delta = match transaction_type {
            TransactionType::Purchase | TransactionType::Restock | TransactionType::Return => {
                Some(quantity)
            }
            TransactionType::Sale | TransactionType::Damaged => quantity.checked_neg(),
            TransactionType::Adjustment => quantity.checked_sub(current_stock),
        };

        delta.ok_or_else(|| ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 0,
            max: i64::MAX,
        })
    }

    /// Applies a transaction to `current_stock`.
    ///
    /// ## Errors
    /// - `CoreError::Validation` for a bad quantity or arithmetic overflow
    /// - `CoreError::InsufficientStock` if stock would go negative
    ///
    /// ## Example
    /// ```rust
    /// use stockwise_core::{CoreError, StockMutator, TransactionType};
    ///
    /// let err = StockMutator::apply(TransactionType::Sale, 20, 10).unwrap_err();
    /// assert_eq!(err, CoreError::InsufficientStock { available: 10, requested: 20 });
    /// ```
    pub fn apply(
        transaction_type: TransactionType,
        quantity: i64,
        current_stock: i64,
    ) -> CoreResult<StockChange> {
        let delta = Self::delta(transaction_type, quantity, current_stock)?;

        let resulting_stock =
            current_stock
                .checked_add(delta)
                .ok_or_else(|| ValidationError::OutOfRange {
                    field: "quantity".to_string(),
                    min: 0,
                    max: i64::MAX - current_stock.max(0),
                })?;

        if resulting_stock < 0 {
            return Err(CoreError::InsufficientStock {
                available: current_stock,
                requested: quantity,
            });
        }

        Ok(StockChange {
            delta,
            resulting_stock,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
