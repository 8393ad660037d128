//! # Repository Module
//!
//! SQL for transfers, line items and the audit trail.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  TransferEngine                                                        │
//! │       │  pool.begin()                                                  │
//! │       ▼                                                                 │
//! │  transfer::claim_write_lock / fetch_* / insert_* / update_*           │
//! │  audit::append                                                         │
//! │       │  tx.commit()                                                   │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Database::transfers() / Database::audit()                            │
//! │       └── read committed state straight from the pool                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`transfer::TransferRepository`] - Transfer lookup, listing, counts
//! - [`audit::AuditRepository`] - Audit trail reads

pub mod audit;
pub mod transfer;
