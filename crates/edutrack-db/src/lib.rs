//! # edutrack-db: Persistence and Orchestration for EduTrack
//!
//! SQLite storage for transfers, line items and the audit trail, plus the
//! [`TransferEngine`] that runs every operation inside one transaction.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        EduTrack Data Flow                               │
//! │                                                                         │
//! │  Caller (API handler, CLI, seed)                                       │
//! │       │  engine.receive(id, request, &actor)                           │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     edutrack-db (THIS CRATE)                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │ TransferEngine│    │  Repositories │    │  Migrations  │  │   │
//! │  │   │  (engine.rs)  │───►│  transfer.rs  │    │  (embedded)  │  │   │
//! │  │   │               │    │  audit.rs     │    │ 001_transfers│  │   │
//! │  │   └───────┬───────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │           │ rules              │ SQL                           │   │
//! │  │           ▼                    ▼                               │   │
//! │  │     edutrack-core         Database (pool.rs)                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL, foreign keys, append-only triggers)                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - The transfer orchestrator
//! - [`pool`] - Connection pool creation and configuration
//! - [`config`] - Engine configuration (TOML + environment)
//! - [`migrations`] - Embedded database migrations
//! - [`repository`] - Transfer and audit SQL
//! - [`response`] - Success/error envelope for callers
//! - [`error`] - `DbError` and `EngineError`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use edutrack_db::{Database, DbConfig, TransferEngine};
//!
//! let db = Database::new(DbConfig::new("edutrack.db")).await?;
//! let engine = TransferEngine::new(db, Arc::new(catalog));
//!
//! let snapshot = engine.create(new_transfer, &actor).await?;
//! let trail = engine.list_audit_trail(&snapshot.transfer.id, None).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod response;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, EngineConfig};
pub use engine::TransferEngine;
pub use error::{DbError, DbResult, EngineError, EngineResult};
pub use pool::{Database, DbConfig};
pub use response::{ApiError, ErrorCode, OperationResponse};

// Repository re-exports for convenience
pub use repository::audit::AuditRepository;
pub use repository::transfer::TransferRepository;
