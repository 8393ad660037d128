//! # edutrack-core: Transfer Rules for EduTrack
//!
//! Pure business logic for tracking educational materials from suppliers and
//! national warehouses through councils to schools. Zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        EduTrack Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            Portal (UI, auth, reports: not in this repo)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ Actor + request                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               edutrack-db: TransferEngine                       │   │
//! │  │    transaction ► load ► authorize ► resolve ► reconcile ►      │   │
//! │  │    persist (version guard) ► audit ► commit                     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ edutrack-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   types  state_machine  reconciliation  authorization  audit   │   │
//! │  │   request  catalog  validation  error                          │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Transfers, line items, organizations, actors
//! - [`state_machine`] - The `(kind, status, event)` transition table
//! - [`reconciliation`] - Expected vs. received quantity scoring
//! - [`authorization`] - Role and scope capability table
//! - [`audit`] - Audit entry types and replay
//! - [`request`] - Operation inputs
//! - [`catalog`] - Item catalog boundary
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example
//!
//! ```rust
//! use edutrack_core::state_machine::{resolve, Resolution, TransferEvent};
//! use edutrack_core::{TransferKind, TransferStatus};
//!
//! let next = resolve(
//!     TransferKind::DirectShipment,
//!     TransferStatus::Draft,
//!     TransferEvent::Dispatch,
//! );
//! assert_eq!(next, Some(Resolution::Move(TransferStatus::Dispatched)));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod audit;
pub mod authorization;
pub mod catalog;
pub mod error;
pub mod reconciliation;
pub mod request;
pub mod state_machine;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use audit::{AuditEntry, AuditEventType, Evidence};
pub use catalog::{CatalogItem, ItemCatalog, StaticCatalog};
pub use error::{CoreError, CoreResult, ValidationError};
pub use reconciliation::OverDeliveryPolicy;
pub use request::*;
pub use state_machine::TransferEvent;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Largest quantity accepted on any line.
pub const MAX_QUANTITY: i64 = 1_000_000_000;

/// Maximum line items on one transfer.
pub const MAX_LINE_ITEMS: usize = 500;

/// Maximum length of any notes field, in characters.
pub const MAX_NOTES_LEN: usize = 2000;

/// Maximum length of a caller-supplied reference number.
pub const MAX_REFERENCE_LEN: usize = 50;

/// Audit entries per page when the caller doesn't say.
pub const DEFAULT_AUDIT_PAGE_SIZE: u32 = 50;
