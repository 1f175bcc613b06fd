//! # Repository Module
//!
//! Database repository implementations for Stockwise.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Repositories                                    │
//! │                                                                         │
//! │  SqliteStore (stockwise-engine)                                        │
//! │       │                                                                 │
//! │       │  db.ledger().commit(...)                                        │
//! │       ▼                                                                 │
//! │  ProductRepository   get / list / low-stock / insert / set threshold   │
//! │  LedgerRepository    atomic CAS commit, history, replay range          │
//! │  AlertRepository     active alert, insert, resolve, history            │
//! │  MetricRepository    get, idempotent record, range, clear              │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod alert;
pub mod ledger;
pub mod metric;
pub mod product;
