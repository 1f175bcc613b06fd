//! # Validation Module
//!
//! Input validation for ledger operations and analytics queries.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Engine entry points (stockwise-engine)                       │
//! │  ├── THIS MODULE: quantities, references, thresholds, ranges           │
//! │  └── Rejected before any lock is taken or row is read                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: StockMutator                                                 │
//! │  └── Non-negative resulting stock                                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (stock_quantity >= 0)                                       │
//! │  ├── Partial UNIQUE index on active alerts                             │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockwise_core::validation::{validate_reference, validate_threshold};
//!
//! validate_reference(Some("PO-1042")).unwrap();
//! assert!(validate_threshold(-1).is_err());
//! ```

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::types::TransactionType;
use crate::{MAX_PRODUCT_NAME_LEN, MAX_QUANTITY, MAX_REFERENCE_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a product id supplied by a caller.
///
/// Ids are opaque; only emptiness is rejected here. Unknown ids surface
/// later as `NotFound`.
pub fn validate_product_id(product_id: &str) -> ValidationResult<()> {
    if product_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "product_id".to_string(),
        });
    }
    Ok(())
}

/// Validates a product name.
///
/// ## Rules
/// - Must not be empty
/// - At most 200 characters
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.chars().count() > MAX_PRODUCT_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_PRODUCT_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates an optional transaction reference.
///
/// ## Example
/// ```rust
/// use stockwise_core::validation::validate_reference;
///
/// assert!(validate_reference(None).is_ok());
/// assert!(validate_reference(Some(&"x".repeat(256))).is_err());
/// ```
pub fn validate_reference(reference: Option<&str>) -> ValidationResult<()> {
    match reference {
        Some(r) if r.chars().count() > MAX_REFERENCE_LEN => Err(ValidationError::TooLong {
            field: "reference".to_string(),
            max: MAX_REFERENCE_LEN,
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates the quantity of a transaction of the given type.
///
/// ## Rules
/// - Adjustment: `>= 0` (absolute target level, zero allowed)
/// - Everything else: `> 0`
/// - All types: `<= MAX_QUANTITY`
pub fn validate_quantity(transaction_type: TransactionType, quantity: i64) -> ValidationResult<()> {
    if quantity > MAX_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 0,
            max: MAX_QUANTITY,
        });
    }

    match transaction_type {
        TransactionType::Adjustment if quantity < 0 => Err(ValidationError::Negative {
            field: "quantity".to_string(),
        }),
        TransactionType::Adjustment => Ok(()),
        _ if quantity <= 0 => Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }),
        _ => Ok(()),
    }
}

/// Validates a low-stock threshold.
pub fn validate_threshold(threshold: i64) -> ValidationResult<()> {
    if threshold < 0 {
        return Err(ValidationError::Negative {
            field: "low_stock_threshold".to_string(),
        });
    }
    Ok(())
}

/// Validates a result limit for ranking queries.
pub fn validate_limit(limit: usize) -> ValidationResult<()> {
    if limit == 0 {
        return Err(ValidationError::MustBePositive {
            field: "limit".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Range Validators
// =============================================================================

/// Validates an inclusive date range.
pub fn validate_date_range(start: NaiveDate, end: NaiveDate) -> ValidationResult<()> {
    if start > end {
        return Err(ValidationError::InvertedRange {
            start: start.to_string(),
            end: end.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
