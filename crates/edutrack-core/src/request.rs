//! # Operation Requests
//!
//! Input shapes for the orchestrator's operations. Pure data: validated by
//! [`crate::validation`], consumed by `edutrack-db`'s `TransferEngine`.
//!
//! Every mutating request can pin `expected_version`, the transfer version
//! the caller last read. A pinned version that no longer matches fails the
//! call with `ConcurrencyConflict` instead of overwriting someone else's
//! change.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::audit::Evidence;
use crate::types::{ItemCondition, OrgRef, TransferKind, TransferStatus};

// =============================================================================
// Create / Dispatch
// =============================================================================

/// A line to ship, before it exists on a transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NewLineItem {
    /// Reference into the external item catalog.
    pub item_id: String,
    pub quantity_expected: i64,
    #[serde(default)]
    pub batch_number: Option<String>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
}

impl NewLineItem {
    pub fn new(item_id: impl Into<String>, quantity_expected: i64) -> Self {
        NewLineItem {
            item_id: item_id.into(),
            quantity_expected,
            batch_number: None,
            expiry_date: None,
        }
    }
}

/// Input to `create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NewTransfer {
    pub kind: TransferKind,
    pub origin: OrgRef,
    pub destination: OrgRef,
    pub line_items: Vec<NewLineItem>,
    /// Caller-supplied reference (e.g. a supplier delivery note); generated
    /// when absent.
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub expected_arrival_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Revision of one line's expected quantity, allowed only before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ExpectedQuantity {
    pub line_item_id: String,
    pub quantity_expected: i64,
}

/// Input to `dispatch`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DispatchDetails {
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub expected_arrival_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Last chance to correct expected quantities.
    #[serde(default)]
    pub revised_quantities: Vec<ExpectedQuantity>,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Input to the steps that carry nothing but an optional note
/// (`mark_in_transit`, `deliver`, `cancel`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StepRequest {
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

impl StepRequest {
    pub fn with_notes(notes: impl Into<String>) -> Self {
        StepRequest {
            notes: Some(notes.into()),
            expected_version: None,
        }
    }

    pub fn pinned(version: i64) -> Self {
        StepRequest {
            notes: None,
            expected_version: Some(version),
        }
    }
}

// =============================================================================
// Receive / Validate
// =============================================================================

/// Actual quantities submitted for one line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LineItemResult {
    pub line_item_id: String,
    pub quantity_received: i64,
    #[serde(default)]
    pub quantity_damaged: i64,
    #[serde(default)]
    pub condition_on_receipt: Option<ItemCondition>,
    #[serde(default)]
    pub batch_number: Option<String>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
}

impl LineItemResult {
    pub fn new(line_item_id: impl Into<String>, received: i64, damaged: i64) -> Self {
        LineItemResult {
            line_item_id: line_item_id.into(),
            quantity_received: received,
            quantity_damaged: damaged,
            condition_on_receipt: None,
            batch_number: None,
            expiry_date: None,
        }
    }

    pub fn with_condition(mut self, condition: ItemCondition) -> Self {
        self.condition_on_receipt = Some(condition);
        self
    }
}

/// Input to `receive`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReceiveRequest {
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub actual_arrival_date: Option<NaiveDate>,
    /// One result per line item on the transfer.
    pub line_item_results: Vec<LineItemResult>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub discrepancy_notes: Option<String>,
    #[serde(default)]
    pub evidence: Evidence,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// A validator's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ValidationDecision {
    /// Accept the (possibly corrected) quantities; reconciliation decides.
    Approve,
    /// Dispute the receipt regardless of quantities.
    Reject,
}

/// Input to `validate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ValidateRequest {
    pub decision: ValidationDecision,
    #[serde(default)]
    pub discrepancy_notes: Option<String>,
    /// Corrected quantities; lines not listed keep their recorded values.
    #[serde(default)]
    pub corrections: Vec<LineItemResult>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub evidence: Evidence,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

impl ValidateRequest {
    pub fn approve() -> Self {
        ValidateRequest {
            decision: ValidationDecision::Approve,
            discrepancy_notes: None,
            corrections: Vec::new(),
            notes: None,
            evidence: Evidence::default(),
            expected_version: None,
        }
    }

    pub fn reject(discrepancy_notes: impl Into<String>) -> Self {
        ValidateRequest {
            decision: ValidationDecision::Reject,
            discrepancy_notes: Some(discrepancy_notes.into()),
            ..ValidateRequest::approve()
        }
    }
}

// =============================================================================
// Queries
// =============================================================================

/// Filter for listing transfers (search and export screens).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TransferFilter {
    #[serde(default)]
    pub kind: Option<TransferKind>,
    #[serde(default)]
    pub statuses: Vec<TransferStatus>,
    #[serde(default)]
    pub origin: Option<OrgRef>,
    #[serde(default)]
    pub destination: Option<OrgRef>,
    /// Matches transfers where the organization is on either side.
    #[serde(default)]
    pub organization: Option<OrgRef>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub created_from: Option<NaiveDate>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub created_to: Option<NaiveDate>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub expected_arrival_from: Option<NaiveDate>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub expected_arrival_to: Option<NaiveDate>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

/// A page of an ordered listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Page {
    pub offset: u32,
    pub limit: u32,
}

impl Page {
    pub fn first(limit: u32) -> Self {
        Page { offset: 0, limit }
    }
}
