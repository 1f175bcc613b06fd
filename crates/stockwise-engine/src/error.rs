//! # Engine Error Types
//!
//! Error types for the persistence port and the engine services.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Engine Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Client         │  │   Concurrency   │  │     Infrastructure      │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  NotFound       │  │  Conflict       │  │  Storage                │ │
//! │  │  Validation     │  │                 │  │  Dependency             │ │
//! │  │  InsufficientSt.│  │                 │  │  Config                 │ │
//! │  └─────────────────┘  └─────────────────┘  │  ShuttingDown           │ │
//! │                                            │  ChannelError           │ │
//! │                                            └─────────────────────────┘ │
//! │                                                                         │
//! │  StoreError (port) ──► EngineError (services)                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use stockwise_core::{CoreError, ValidationError};
use stockwise_db::DbError;
use thiserror::Error;

// =============================================================================
// Store Error
// =============================================================================

/// Result type alias for persistence port operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by an [`InventoryStore`](crate::store::InventoryStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The product row changed (or was deactivated) since it was read.
    #[error("Concurrent modification of product {product_id}")]
    Conflict { product_id: String },

    /// A record with this id already exists.
    #[error("Duplicate {entity}: {id}")]
    Duplicate { entity: String, id: String },

    /// The backing store cannot be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store returned data it should never hold, or rejected a write.
    #[error("Store error: {0}")]
    Corrupt(String),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::StaleWrite { id, .. } => StoreError::Conflict { product_id: id },
            DbError::UniqueViolation { field, value } => StoreError::Duplicate {
                entity: field,
                id: value,
            },
            e if e.is_unavailable() => StoreError::Unavailable(e.to_string()),
            e => StoreError::Corrupt(e.to_string()),
        }
    }
}

// =============================================================================
// Engine Error
// =============================================================================

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the engine services.
#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Client Errors
    // =========================================================================
    /// Entity not found (or inactive, for products being transacted).
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Caller input failed validation. Nothing was touched.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The transaction would drive stock negative. Nothing was written.
    #[error("Insufficient stock: available {available}, requested {requested}")]
    InsufficientStock { available: i64, requested: i64 },

    // =========================================================================
    // Concurrency Errors
    // =========================================================================
    /// Compare-and-swap retries were exhausted.
    #[error("Conflict on product {product_id} after {attempts} attempts")]
    Conflict { product_id: String, attempts: u32 },

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    /// A downstream collaborator (alerting, analytics, notifications) failed.
    #[error("Dependency failed: {0}")]
    Dependency(String),

    /// The store failed; nothing was applied.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid or unreadable configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The service is shutting down.
    #[error("Inventory service is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl EngineError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Returns true if retrying the same call may succeed.
    ///
    /// ## Retryable Errors
    /// - Conflict (another writer won the race)
    /// - Storage (store temporarily unavailable)
    /// - ChannelError (background task restarting)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Conflict { .. } | EngineError::Storage(_) | EngineError::ChannelError(_)
        )
    }

    /// Returns true if the caller's request was at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EngineError::NotFound { .. }
                | EngineError::Validation(_)
                | EngineError::InsufficientStock { .. }
        )
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InsufficientStock {
                available,
                requested,
            } => EngineError::InsufficientStock {
                available,
                requested,
            },
            CoreError::Validation(v) => EngineError::Validation(v),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { product_id } => EngineError::Conflict {
                product_id,
                attempts: 1,
            },
            other => EngineError::Storage(other.to_string()),
        }
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        StoreError::from(err).into()
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}
