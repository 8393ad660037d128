//! # Audit Trail Types
//!
//! Entries of the append-only log that records every mutation of a transfer.
//! Persistence lives in `edutrack-db`; this module holds the record shape,
//! the event-type mapping and [`replay`], which rebuilds a transfer's status
//! from its entries.
//!
//! ## Ordering
//! ```text
//! seq 1  CREATED            ∅          → DRAFT
//! seq 2  DISPATCHED         DRAFT      → DISPATCHED
//! seq 3  RECEIVED           DISPATCHED → CONFIRMED
//!
//! from(n + 1) == to(n)   for every n
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::state_machine::TransferEvent;
use crate::types::{Role, TransferStatus};

/// What an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum AuditEventType {
    Created,
    Dispatched,
    InTransit,
    Delivered,
    Received,
    Validated,
    DiscrepancyRaised,
    Cancelled,
}

impl AuditEventType {
    pub const fn as_str(self) -> &'static str {
        match self {
            AuditEventType::Created => "CREATED",
            AuditEventType::Dispatched => "DISPATCHED",
            AuditEventType::InTransit => "IN_TRANSIT",
            AuditEventType::Delivered => "DELIVERED",
            AuditEventType::Received => "RECEIVED",
            AuditEventType::Validated => "VALIDATED",
            AuditEventType::DiscrepancyRaised => "DISCREPANCY_RAISED",
            AuditEventType::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit event type for an event that moved a transfer to `to`.
///
/// Landing in DISCREPANCY is always recorded as `DISCREPANCY_RAISED`,
/// whichever event caused it.
pub const fn event_type_for(event: TransferEvent, to: TransferStatus) -> AuditEventType {
    if matches!(to, TransferStatus::Discrepancy) {
        return AuditEventType::DiscrepancyRaised;
    }
    match event {
        TransferEvent::Create => AuditEventType::Created,
        TransferEvent::Dispatch => AuditEventType::Dispatched,
        TransferEvent::MarkInTransit => AuditEventType::InTransit,
        TransferEvent::Deliver => AuditEventType::Delivered,
        TransferEvent::Receive => AuditEventType::Received,
        TransferEvent::Validate => AuditEventType::Validated,
        TransferEvent::Cancel => AuditEventType::Cancelled,
    }
}

/// References to supporting material stored elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Evidence {
    #[serde(default)]
    pub attachment_ids: Vec<String>,
    #[serde(default)]
    pub quality_check_ids: Vec<String>,
}

impl Evidence {
    pub fn is_empty(&self) -> bool {
        self.attachment_ids.is_empty() && self.quality_check_ids.is_empty()
    }
}

/// One immutable record in a transfer's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AuditEntry {
    pub id: String,
    pub transfer_id: String,
    /// 1, 2, 3… per transfer.
    pub sequence_number: i64,
    pub event_type: AuditEventType,
    pub actor_id: String,
    pub actor_role: Role,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
    /// Absent for `CREATED`.
    pub from_status: Option<TransferStatus>,
    pub to_status: TransferStatus,
    pub notes: Option<String>,
    pub evidence: Evidence,
}

/// A break in an audit trail found by [`replay`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditGap {
    #[error("Expected sequence number {expected}, found {found}")]
    Sequence { expected: i64, found: i64 },

    #[error("Entry {sequence_number} starts from {found:?} but the previous entry ended in {expected:?}")]
    Status {
        sequence_number: i64,
        expected: Option<TransferStatus>,
        found: Option<TransferStatus>,
    },
}

/// Rebuilds the current status from entries ordered by sequence number.
///
/// Returns `Ok(None)` for an empty trail.
pub fn replay(entries: &[AuditEntry]) -> Result<Option<TransferStatus>, AuditGap> {
    let mut current: Option<TransferStatus> = None;

    for (index, entry) in entries.iter().enumerate() {
        let expected = index as i64 + 1;
        if entry.sequence_number != expected {
            return Err(AuditGap::Sequence {
                expected,
                found: entry.sequence_number,
            });
        }
        if entry.from_status != current {
            return Err(AuditGap::Status {
                sequence_number: entry.sequence_number,
                expected: current,
                found: entry.from_status,
            });
        }
        current = Some(entry.to_status);
    }

    Ok(current)
}
