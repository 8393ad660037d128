//! # Transfer State Machine
//!
//! The single source of truth for which status transitions are legal.
//!
//! ## Generic Graph
//! ```text
//! DRAFT ──dispatch──► DISPATCHED ──in transit──► IN_TRANSIT ──deliver──► DELIVERED
//!   │                      │                                                │
//!   └──cancel──► CANCELLED └────────────── receive ─────────────────────────┤
//!                                                                           ▼
//!                                                      ┌──────── reconcile ────────┐
//!                                                      ▼                           ▼
//!                                               CONFIRMED/VALIDATED           DISCREPANCY
//!                                                      ▲                           │
//!                                                      └──── resolve (re-submit) ──┘
//! ```
//!
//! Every kind is a set of rows in one table keyed by `(kind, status, event)`.
//! A row's target is a fixed status, a pair routed by reconciliation, or an
//! explicit no-op for steps a kind collapses (council shipments have no
//! separate in-transit or delivery step).
//!
//! ## Idempotency
//! Re-sending an event whose fixed target is already the current status
//! (dispatch on DISPATCHED, cancel on CANCELLED) resolves to
//! [`Resolution::Unchanged`]. Re-sending a reconciling event to a transfer
//! already sitting in that event's clean target resolves to
//! [`Resolution::Replay`]; the orchestrator treats it as a no-op only when the
//! submitted quantities match what is stored.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::types::{Actor, Transfer, TransferKind, TransferStatus};

// =============================================================================
// Events
// =============================================================================

/// Something a caller asks to happen to a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum TransferEvent {
    Create,
    Dispatch,
    MarkInTransit,
    Deliver,
    Receive,
    Validate,
    Cancel,
}

impl TransferEvent {
    pub const ALL: [TransferEvent; 7] = [
        TransferEvent::Create,
        TransferEvent::Dispatch,
        TransferEvent::MarkInTransit,
        TransferEvent::Deliver,
        TransferEvent::Receive,
        TransferEvent::Validate,
        TransferEvent::Cancel,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            TransferEvent::Create => "CREATE",
            TransferEvent::Dispatch => "DISPATCH",
            TransferEvent::MarkInTransit => "MARK_IN_TRANSIT",
            TransferEvent::Deliver => "DELIVER",
            TransferEvent::Receive => "RECEIVE",
            TransferEvent::Validate => "VALIDATE",
            TransferEvent::Cancel => "CANCEL",
        }
    }

    /// Events that submit quantities and run reconciliation.
    pub const fn reconciles(self) -> bool {
        matches!(self, TransferEvent::Receive | TransferEvent::Validate)
    }
}

impl fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Transition Table
// =============================================================================

/// Where an event leads from a given status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Always this status.
    To(TransferStatus),
    /// Chosen by reconciliation.
    Reconciled {
        clean: TransferStatus,
        discrepancy: TransferStatus,
    },
    /// Accepted but changes nothing.
    NoOp,
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub kind: TransferKind,
    pub from: TransferStatus,
    pub event: TransferEvent,
    pub target: Target,
}

const fn to(kind: TransferKind, from: TransferStatus, event: TransferEvent, target: TransferStatus) -> Rule {
    Rule {
        kind,
        from,
        event,
        target: Target::To(target),
    }
}

const fn reconciled(
    kind: TransferKind,
    from: TransferStatus,
    event: TransferEvent,
    clean: TransferStatus,
    discrepancy: TransferStatus,
) -> Rule {
    Rule {
        kind,
        from,
        event,
        target: Target::Reconciled { clean, discrepancy },
    }
}

const fn noop(kind: TransferKind, from: TransferStatus, event: TransferEvent) -> Rule {
    Rule {
        kind,
        from,
        event,
        target: Target::NoOp,
    }
}

use TransferEvent as E;
use TransferKind as K;
use TransferStatus as S;

/// The transition table for every kind.
pub static TRANSITIONS: &[Rule] = &[
    // ── Supplier receipts: recorded by the warehouse, validated separately ──
    to(K::SupplierReceipt, S::Draft, E::Cancel, S::Cancelled),
    reconciled(K::SupplierReceipt, S::Draft, E::Receive, S::Received, S::Received),
    reconciled(K::SupplierReceipt, S::Received, E::Validate, S::Validated, S::Discrepancy),
    reconciled(K::SupplierReceipt, S::Discrepancy, E::Receive, S::Received, S::Received),
    reconciled(K::SupplierReceipt, S::Discrepancy, E::Validate, S::Validated, S::Discrepancy),
    // ── Direct shipments: warehouse → school ──
    to(K::DirectShipment, S::Draft, E::Dispatch, S::Dispatched),
    to(K::DirectShipment, S::Draft, E::Cancel, S::Cancelled),
    to(K::DirectShipment, S::Dispatched, E::MarkInTransit, S::InTransit),
    to(K::DirectShipment, S::Dispatched, E::Deliver, S::Delivered),
    to(K::DirectShipment, S::InTransit, E::Deliver, S::Delivered),
    reconciled(K::DirectShipment, S::Dispatched, E::Receive, S::Confirmed, S::Discrepancy),
    reconciled(K::DirectShipment, S::InTransit, E::Receive, S::Confirmed, S::Discrepancy),
    reconciled(K::DirectShipment, S::Delivered, E::Receive, S::Confirmed, S::Discrepancy),
    reconciled(K::DirectShipment, S::Discrepancy, E::Receive, S::Confirmed, S::Discrepancy),
    reconciled(K::DirectShipment, S::Discrepancy, E::Validate, S::Validated, S::Discrepancy),
    // ── Council shipments: warehouse → council, dispatch straight to confirmable ──
    to(K::CouncilShipment, S::Draft, E::Dispatch, S::Dispatched),
    to(K::CouncilShipment, S::Draft, E::Cancel, S::Cancelled),
    noop(K::CouncilShipment, S::Dispatched, E::MarkInTransit),
    noop(K::CouncilShipment, S::Dispatched, E::Deliver),
    reconciled(K::CouncilShipment, S::Dispatched, E::Receive, S::Confirmed, S::Discrepancy),
    reconciled(K::CouncilShipment, S::Discrepancy, E::Receive, S::Confirmed, S::Discrepancy),
    reconciled(K::CouncilShipment, S::Discrepancy, E::Validate, S::Validated, S::Discrepancy),
    // ── Distributions: council → school ──
    to(K::Distribution, S::Draft, E::Dispatch, S::Dispatched),
    to(K::Distribution, S::Draft, E::Cancel, S::Cancelled),
    to(K::Distribution, S::Dispatched, E::MarkInTransit, S::InTransit),
    to(K::Distribution, S::Dispatched, E::Deliver, S::Delivered),
    to(K::Distribution, S::InTransit, E::Deliver, S::Delivered),
    reconciled(K::Distribution, S::Dispatched, E::Receive, S::Confirmed, S::Discrepancy),
    reconciled(K::Distribution, S::InTransit, E::Receive, S::Confirmed, S::Discrepancy),
    reconciled(K::Distribution, S::Delivered, E::Receive, S::Confirmed, S::Discrepancy),
    reconciled(K::Distribution, S::Discrepancy, E::Receive, S::Confirmed, S::Discrepancy),
    reconciled(K::Distribution, S::Discrepancy, E::Validate, S::Validated, S::Discrepancy),
];

/// Status every transfer of a kind starts in.
pub const fn initial_status(_kind: TransferKind) -> TransferStatus {
    TransferStatus::Draft
}

/// Looks up the table row for `(kind, status, event)`.
pub fn lookup(kind: TransferKind, status: TransferStatus, event: TransferEvent) -> Option<&'static Rule> {
    TRANSITIONS
        .iter()
        .find(|rule| rule.kind == kind && rule.from == status && rule.event == event)
}

/// Events accepted from a status, in table order.
pub fn legal_events(kind: TransferKind, status: TransferStatus) -> Vec<TransferEvent> {
    let mut events = Vec::new();
    for rule in TRANSITIONS.iter().filter(|r| r.kind == kind && r.from == status) {
        if !events.contains(&rule.event) {
            events.push(rule.event);
        }
    }
    events
}

/// Every status a transfer of this kind can be in.
pub fn states(kind: TransferKind) -> Vec<TransferStatus> {
    let mut states = vec![initial_status(kind)];
    let mut push = |status: TransferStatus| {
        if !states.contains(&status) {
            states.push(status);
        }
    };
    for rule in TRANSITIONS.iter().filter(|r| r.kind == kind) {
        push(rule.from);
        match rule.target {
            Target::To(status) => push(status),
            Target::Reconciled { clean, discrepancy } => {
                push(clean);
                push(discrepancy);
            }
            Target::NoOp => {}
        }
    }
    states
}

/// Whether `status` belongs to the kind's state set.
pub fn is_state_of(kind: TransferKind, status: TransferStatus) -> bool {
    states(kind).contains(&status)
}

// =============================================================================
// Resolution
// =============================================================================

/// What the orchestrator should do for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Move to this status.
    Move(TransferStatus),
    /// Run reconciliation and move to one of these.
    Reconcile {
        clean: TransferStatus,
        discrepancy: TransferStatus,
    },
    /// Nothing to do; return the transfer as it is.
    Unchanged,
    /// Reconciling event re-sent after it already succeeded.
    Replay,
}

/// Resolves an event against the table, including idempotent re-sends.
pub fn resolve(kind: TransferKind, status: TransferStatus, event: TransferEvent) -> Option<Resolution> {
    if let Some(rule) = lookup(kind, status, event) {
        return Some(match rule.target {
            Target::To(target) if target == status => Resolution::Unchanged,
            Target::To(target) => Resolution::Move(target),
            Target::Reconciled { clean, discrepancy } => Resolution::Reconcile { clean, discrepancy },
            Target::NoOp => Resolution::Unchanged,
        });
    }

    let mut same_event = TRANSITIONS.iter().filter(|r| r.kind == kind && r.event == event);
    same_event.find_map(|rule| match rule.target {
        Target::To(target) if target == status => Some(Resolution::Unchanged),
        Target::Reconciled { clean, .. } if clean == status && clean != rule.from => {
            Some(Resolution::Replay)
        }
        _ => None,
    })
}

/// Resolves an event for a concrete transfer.
///
/// ## Errors
/// `InvalidTransition` when neither a table row nor an idempotent re-send
/// matches.
pub fn check_transition(transfer: &Transfer, event: TransferEvent) -> CoreResult<Resolution> {
    resolve(transfer.kind, transfer.status, event).ok_or_else(|| CoreError::InvalidTransition {
        transfer_id: transfer.id.clone(),
        kind: transfer.kind,
        status: transfer.status,
        event,
    })
}

/// Applies a resolved move, stamping who did it and when.
///
/// Returns the updated transfer; the caller persists it. `version` is bumped
/// so the persisted row no longer matches stale readers.
pub fn apply_transition(
    transfer: &Transfer,
    event: TransferEvent,
    to: TransferStatus,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Transfer {
    debug_assert!(
        is_state_of(transfer.kind, to),
        "{} is not a {} status",
        to,
        transfer.kind
    );

    let mut next = transfer.clone();
    next.status = to;
    next.updated_at = now;
    next.version = transfer.version + 1;

    match event {
        TransferEvent::Dispatch => {
            next.dispatched_by = Some(actor.user_id.clone());
            next.dispatched_at = Some(now);
        }
        TransferEvent::Receive => {
            next.received_by = Some(actor.user_id.clone());
            next.received_at = Some(now);
        }
        TransferEvent::Validate => {
            next.validated_by = Some(actor.user_id.clone());
            next.validated_at = Some(now);
        }
        TransferEvent::Create
        | TransferEvent::MarkInTransit
        | TransferEvent::Deliver
        | TransferEvent::Cancel => {}
    }

    next
}

// =============================================================================
// Unit Tests
// =============================================================================
