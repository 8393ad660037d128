//! # Validation Module
//!
//! Input validation for transfer operations.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request shape (serde)                                        │
//! │  └── Types, enums, required fields                                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Lengths, formats, non-negative quantities                         │
//! │  └── Organization types matching the transfer kind                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Transfer rules (state machine, reconciliation, gate)         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 4: Database (SQLite)                                            │
//! │  ├── CHECK / UNIQUE constraints                                        │
//! │  └── Triggers (append-only audit, locked expected quantities)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use edutrack_core::validation::{validate_reference_number, validate_quantity};
//!
//! validate_reference_number("DN-2024-0042").unwrap();
//! validate_quantity("quantityExpected", 0, "li-1").unwrap();
//! assert!(validate_quantity("quantityExpected", -3, "li-1").is_err());
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::request::{
    DispatchDetails, LineItemResult, NewTransfer, ReceiveRequest, ValidateRequest,
    ValidationDecision,
};
use crate::types::{Actor, OrgRef, OrgType};
use crate::{MAX_LINE_ITEMS, MAX_NOTES_LEN, MAX_QUANTITY, MAX_REFERENCE_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a caller-supplied reference number.
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Letters, digits, hyphens, underscores and slashes only
///
/// ## Example
/// ```rust
/// use edutrack_core::validation::validate_reference_number;
///
/// assert!(validate_reference_number("DN/2024/117").is_ok());
/// assert!(validate_reference_number("").is_err());
/// assert!(validate_reference_number("has space").is_err());
/// ```
pub fn validate_reference_number(reference: &str) -> ValidationResult<()> {
    let reference = reference.trim();

    if reference.is_empty() {
        return Err(ValidationError::Required {
            field: "referenceNumber".to_string(),
        });
    }

    if reference.len() > MAX_REFERENCE_LEN {
        return Err(ValidationError::TooLong {
            field: "referenceNumber".to_string(),
            max: MAX_REFERENCE_LEN,
        });
    }

    if !reference
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '/')
    {
        return Err(ValidationError::InvalidFormat {
            field: "referenceNumber".to_string(),
            reason: "must contain only letters, numbers, hyphens, underscores, and slashes"
                .to_string(),
        });
    }

    Ok(())
}

/// Validates free-text notes.
pub fn validate_notes(field: &str, notes: Option<&str>) -> ValidationResult<()> {
    match notes {
        Some(notes) if notes.chars().count() > MAX_NOTES_LEN => Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NOTES_LEN,
        }),
        _ => Ok(()),
    }
}

/// Validates a required identifier (non-blank).
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a UUID string format.
///
/// ## Example
/// ```rust
/// use edutrack_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates that a quantity is within `0..=MAX_QUANTITY`. Zero is allowed.
pub fn validate_quantity(field: &str, qty: i64, line_item_id: &str) -> ValidationResult<()> {
    if qty < 0 {
        return Err(ValidationError::NegativeQuantity {
            field: field.to_string(),
            line_item_id: line_item_id.to_string(),
        });
    }
    if qty > MAX_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_QUANTITY,
        });
    }
    Ok(())
}

/// Validates the number of lines on a transfer.
pub fn validate_line_count(count: usize) -> ValidationResult<()> {
    if count == 0 {
        return Err(ValidationError::Required {
            field: "lineItems".to_string(),
        });
    }
    if count > MAX_LINE_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "lineItems".to_string(),
            min: 1,
            max: MAX_LINE_ITEMS as i64,
        });
    }
    Ok(())
}

// =============================================================================
// Organization Validators
// =============================================================================

/// Validates that an organization reference has the type a kind requires.
pub fn validate_org(field: &str, org: &OrgRef, expected: OrgType) -> ValidationResult<()> {
    if org.org_type != expected {
        return Err(ValidationError::WrongOrganization {
            field: field.to_string(),
            expected: expected.to_string(),
            actual: org.org_type.to_string(),
        });
    }
    validate_id(field, &org.id)
}

/// Validates the calling identity.
pub fn validate_actor(actor: &Actor) -> ValidationResult<()> {
    validate_id("actor.userId", &actor.user_id)
}

// =============================================================================
// Request Validators
// =============================================================================

/// Validates a `create` request.
pub fn validate_new_transfer(request: &NewTransfer) -> ValidationResult<()> {
    validate_org("origin", &request.origin, request.kind.origin_type())?;
    validate_org(
        "destination",
        &request.destination,
        request.kind.destination_type(),
    )?;
    if request.origin == request.destination {
        return Err(ValidationError::InvalidFormat {
            field: "destination".to_string(),
            reason: "must differ from origin".to_string(),
        });
    }

    if let Some(reference) = &request.reference_number {
        validate_reference_number(reference)?;
    }
    validate_notes("notes", request.notes.as_deref())?;
    validate_line_count(request.line_items.len())?;

    for (index, line) in request.line_items.iter().enumerate() {
        let label = format!("lineItems[{}]", index);
        validate_id(&format!("{}.itemId", label), &line.item_id)?;
        validate_quantity("quantityExpected", line.quantity_expected, &label)?;
    }

    Ok(())
}

/// Validates a `dispatch` request.
pub fn validate_dispatch(details: &DispatchDetails) -> ValidationResult<()> {
    validate_notes("notes", details.notes.as_deref())?;

    let mut seen = HashSet::new();
    for revision in &details.revised_quantities {
        validate_quantity(
            "quantityExpected",
            revision.quantity_expected,
            &revision.line_item_id,
        )?;
        if !seen.insert(revision.line_item_id.as_str()) {
            return Err(ValidationError::DuplicateLineItem {
                line_item_id: revision.line_item_id.clone(),
            });
        }
    }
    Ok(())
}

fn validate_results(results: &[LineItemResult]) -> ValidationResult<()> {
    for result in results {
        validate_id("lineItemId", &result.line_item_id)?;
        validate_quantity(
            "quantityReceived",
            result.quantity_received,
            &result.line_item_id,
        )?;
        validate_quantity(
            "quantityDamaged",
            result.quantity_damaged,
            &result.line_item_id,
        )?;
    }
    Ok(())
}

/// Validates a `receive` request.
pub fn validate_receive(request: &ReceiveRequest) -> ValidationResult<()> {
    validate_notes("notes", request.notes.as_deref())?;
    validate_notes("discrepancyNotes", request.discrepancy_notes.as_deref())?;
    if request.line_item_results.is_empty() {
        return Err(ValidationError::Required {
            field: "lineItemResults".to_string(),
        });
    }
    validate_results(&request.line_item_results)
}

/// Validates a `validate` request.
pub fn validate_validation(request: &ValidateRequest) -> ValidationResult<()> {
    validate_notes("notes", request.notes.as_deref())?;
    validate_notes("discrepancyNotes", request.discrepancy_notes.as_deref())?;
    validate_results(&request.corrections)?;

    if request.decision == ValidationDecision::Reject
        && request
            .discrepancy_notes
            .as_deref()
            .map(|n| n.trim().is_empty())
            .unwrap_or(true)
    {
        return Err(ValidationError::Required {
            field: "discrepancyNotes".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
