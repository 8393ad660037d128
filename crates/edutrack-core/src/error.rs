//! # Error Types
//!
//! Domain-specific error types for edutrack-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  edutrack-core errors (this file)                                      │
//! │  ├── CoreError        - The engine's error taxonomy                    │
//! │  │   ├── Validation               malformed input                      │
//! │  │   ├── InvalidTransition        event not legal from status          │
//! │  │   ├── Authorization            role / scope denies the event        │
//! │  │   ├── NotFound                 transfer / item / line item missing  │
//! │  │   ├── DiscrepancyRequiresNotes mismatch without explanation         │
//! │  │   └── ConcurrencyConflict      version changed under the caller     │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  edutrack-db errors (separate crate)                                   │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── EngineError      - CoreError | DbError, with an ErrorCode         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (transfer id, status, line item)
//! 3. Errors are enum variants, never String
//! 4. The core never retries; every error goes back to the caller

use thiserror::Error;

use crate::state_machine::TransferEvent;
use crate::types::{Role, TransferKind, TransferStatus};

// =============================================================================
// Core Error
// =============================================================================

/// Errors produced by the transfer rules.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input failed validation (negative quantity, missing field, ...).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The event is not legal from the transfer's current status.
    ///
    /// ## When This Occurs
    /// - Cancelling a transfer that has already been dispatched
    /// - Receiving a DRAFT direct shipment (dispatch is required first)
    /// - Validating a CONFIRMED shipment
    #[error("Transfer {transfer_id} ({kind}) cannot {event} from status {status}")]
    InvalidTransition {
        transfer_id: String,
        kind: TransferKind,
        status: TransferStatus,
        event: TransferEvent,
    },

    /// The actor's role or organizational scope does not permit the event.
    #[error("User {actor_id} ({role}) may not {event} a {kind}: {reason}")]
    Authorization {
        actor_id: String,
        role: Role,
        event: TransferEvent,
        kind: TransferKind,
        reason: String,
    },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Reconciliation found a mismatch but no explanatory notes were supplied.
    ///
    /// ## User Workflow
    /// ```text
    /// Receive (expected 100, received 90, damaged 5)
    ///      │
    ///      ▼
    /// discrepancy = 5 → notes required
    ///      │
    ///      ▼
    /// DiscrepancyRequiresNotes { line_item_ids: [..] }
    ///      │
    ///      ▼
    /// UI highlights the lines and asks for an explanation
    /// ```
    #[error("Transfer {transfer_id} has discrepancies on {} line item(s); discrepancy notes are required", line_item_ids.len())]
    DiscrepancyRequiresNotes {
        transfer_id: String,
        line_item_ids: Vec<String>,
    },

    /// The transfer changed between the caller's read and this write.
    #[error("Transfer {transfer_id} was modified concurrently (expected version {expected_version}, found {actual_version}); reload and retry")]
    ConcurrencyConflict {
        transfer_id: String,
        expected_version: i64,
        actual_version: i64,
    },
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Checked before any state is read or written.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Quantity must not be negative.
    #[error("{field} must not be negative (line item {line_item_id})")]
    NegativeQuantity { field: String, line_item_id: String },

    /// Received + damaged exceeds the expected quantity.
    #[error("Line item {line_item_id}: received {received} + damaged {damaged} exceeds expected {expected}")]
    ExceedsExpected {
        line_item_id: String,
        expected: i64,
        received: i64,
        damaged: i64,
    },

    /// Invalid format (e.g., invalid UUID, invalid reference number).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// An organization reference does not match what the transfer kind requires.
    #[error("{field} must reference a {expected}, got {actual}")]
    WrongOrganization {
        field: String,
        expected: String,
        actual: String,
    },

    /// A line item result was submitted twice in one request.
    #[error("Line item {line_item_id} was submitted more than once")]
    DuplicateLineItem { line_item_id: String },

    /// A line item result references a line that is not on the transfer.
    #[error("Line item {line_item_id} does not belong to transfer {transfer_id}")]
    UnknownLineItem {
        line_item_id: String,
        transfer_id: String,
    },

    /// A line item of the transfer has no submitted result.
    #[error("No result submitted for line item {line_item_id}")]
    MissingLineItem { line_item_id: String },

    /// A caller-supplied reference number is already taken within the kind.
    #[error("Reference number {reference} is already used by another {kind}")]
    DuplicateReference {
        kind: TransferKind,
        reference: String,
    },

    /// Expected quantities may only be revised before dispatch.
    #[error("Expected quantities are fixed once transfer {transfer_id} has been dispatched")]
    ExpectedQuantityLocked { transfer_id: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message() {
        let err = CoreError::InvalidTransition {
            transfer_id: "t-1".to_string(),
            kind: TransferKind::DirectShipment,
            status: TransferStatus::Delivered,
            event: TransferEvent::Cancel,
        };
        assert_eq!(
            err.to_string(),
            "Transfer t-1 (DIRECT_SHIPMENT) cannot CANCEL from status DELIVERED"
        );
    }

    #[test]
    fn test_discrepancy_notes_message_counts_lines() {
        let err = CoreError::DiscrepancyRequiresNotes {
            transfer_id: "t-1".to_string(),
            line_item_ids: vec!["a".to_string(), "b".to_string()],
        };
        assert!(err.to_string().contains("2 line item(s)"));
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::ExceedsExpected {
            line_item_id: "li-1".to_string(),
            expected: 10,
            received: 9,
            damaged: 2,
        };
        assert_eq!(
            err.to_string(),
            "Line item li-1: received 9 + damaged 2 exceeds expected 10"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "origin".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
