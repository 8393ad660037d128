//! # Transfer Engine
//!
//! Runs every operation on a transfer as one all-or-nothing transaction.
//!
//! ## Operation Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate input                                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  read version ─► BEGIN ─► claim write lock ─► load transfer             │
//! │       │  (NotFound; version moved since the read → ConcurrencyConflict) │
//! │       ▼                                                                 │
//! │  authorize (capability table) ─► resolve (transition table)            │
//! │       │                                                                 │
//! │       ├── Unchanged / matching replay ──► return as-is, no audit       │
//! │       ▼                                                                 │
//! │  expected_version check ─► reconcile (receive / validate)              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  write lines ─► guarded UPDATE ─► append audit entry ─► COMMIT         │
//! │                                                                         │
//! │  Any error before COMMIT drops the transaction: nothing is written.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! let engine = TransferEngine::new(db, Arc::new(catalog));
//! let draft = engine.create(new_transfer, &actor).await?;
//! let shipped = engine.dispatch(&draft.transfer.id, DispatchDetails::default(), &actor).await?;
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use edutrack_core::audit::event_type_for;
use edutrack_core::authorization::authorize;
use edutrack_core::reconciliation::{collect_quantities, reconcile, route, Coverage, ReconcilePolicy};
use edutrack_core::state_machine::{apply_transition, check_transition, initial_status, Resolution};
use edutrack_core::validation;
use edutrack_core::{
    Actor, AuditEntry, CoreError, DispatchDetails, Evidence, ItemCatalog, LineItemResult,
    NewTransfer, OverDeliveryPolicy, Page, ReceiveRequest, StepRequest, Transfer, TransferEvent,
    TransferFilter, TransferLineItem, TransferSnapshot, TransferStatus, ValidateRequest,
    ValidationDecision, ValidationError, DEFAULT_AUDIT_PAGE_SIZE,
};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::pool::Database;
use crate::repository::audit::{self, NewAuditEntry};
use crate::repository::transfer;

type Tx = Transaction<'static, Sqlite>;

/// Orchestrates transfers: state machine, reconciliation, authorization and
/// audit, persisted together.
#[derive(Clone)]
pub struct TransferEngine {
    db: Database,
    catalog: Arc<dyn ItemCatalog>,
    over_delivery: OverDeliveryPolicy,
    audit_page_size: u32,
}

impl TransferEngine {
    pub fn new(db: Database, catalog: Arc<dyn ItemCatalog>) -> Self {
        TransferEngine {
            db,
            catalog,
            over_delivery: OverDeliveryPolicy::default(),
            audit_page_size: DEFAULT_AUDIT_PAGE_SIZE,
        }
    }

    /// Builds an engine with the reconciliation and audit settings of `config`.
    pub fn from_config(db: Database, catalog: Arc<dyn ItemCatalog>, config: &EngineConfig) -> Self {
        TransferEngine::new(db, catalog)
            .with_over_delivery(config.reconciliation.over_delivery)
            .with_audit_page_size(config.audit.page_size)
    }

    pub fn with_over_delivery(mut self, policy: OverDeliveryPolicy) -> Self {
        self.over_delivery = policy;
        self
    }

    pub fn with_audit_page_size(mut self, page_size: u32) -> Self {
        self.audit_page_size = page_size.max(1);
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Creates a transfer in its initial status.
    ///
    /// Catalog items are resolved once and their code, name and unit frozen
    /// onto the line items. A reference number is generated unless one is
    /// supplied.
    pub async fn create(&self, request: NewTransfer, actor: &Actor) -> EngineResult<TransferSnapshot> {
        self.create_inner(request, actor)
            .await
            .inspect_err(|err| log_rejection(TransferEvent::Create, None, actor, err))
    }

    async fn create_inner(&self, request: NewTransfer, actor: &Actor) -> EngineResult<TransferSnapshot> {
        validation::validate_actor(actor)?;
        validation::validate_new_transfer(&request)?;

        let now = Utc::now();
        let mut draft = Transfer {
            id: Uuid::new_v4().to_string(),
            kind: request.kind,
            status: initial_status(request.kind),
            origin: request.origin,
            destination: request.destination,
            reference_number: String::new(),
            expected_arrival_date: request.expected_arrival_date,
            actual_arrival_date: None,
            created_by: actor.user_id.clone(),
            dispatched_by: None,
            received_by: None,
            validated_by: None,
            dispatched_at: None,
            received_at: None,
            validated_at: None,
            notes: request.notes,
            discrepancy_notes: None,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        authorize(actor, draft.kind, TransferEvent::Create, &draft)?;

        let line_items = request
            .line_items
            .iter()
            .map(|line| {
                let item = self
                    .catalog
                    .lookup(&line.item_id)
                    .ok_or_else(|| CoreError::not_found("Item", &line.item_id))?;
                Ok(TransferLineItem {
                    id: Uuid::new_v4().to_string(),
                    transfer_id: draft.id.clone(),
                    item_id: item.id,
                    item_code: item.code,
                    item_name: item.name,
                    unit_of_measure: item.unit_of_measure,
                    quantity_expected: line.quantity_expected,
                    quantity_received: None,
                    quantity_damaged: None,
                    condition_on_receipt: None,
                    batch_number: line.batch_number.clone(),
                    expiry_date: line.expiry_date,
                    created_at: now,
                    updated_at: now,
                })
            })
            .collect::<Result<Vec<_>, CoreError>>()?;

        let mut tx = self.db.pool().begin().await?;
        transfer::claim_write_lock(&mut *tx, &draft.id).await?;

        draft.reference_number = match request.reference_number {
            Some(reference) => {
                let reference = reference.trim().to_string();
                if transfer::reference_exists(&mut *tx, draft.kind, &reference).await? {
                    return Err(ValidationError::DuplicateReference {
                        kind: draft.kind,
                        reference,
                    }
                    .into());
                }
                reference
            }
            None => transfer::next_reference_number(&mut *tx, draft.kind, now.date_naive()).await?,
        };

        transfer::insert_transfer(&mut *tx, &draft).await?;
        for line in &line_items {
            transfer::insert_line_item(&mut *tx, line).await?;
        }

        let notes = draft.notes.clone();
        self.commit(
            tx,
            &draft,
            TransferEvent::Create,
            None,
            actor,
            notes.as_deref(),
            &Evidence::default(),
        )
        .await
    }

    /// Sends a draft on its way. Expected quantities may be revised here and
    /// nowhere later.
    pub async fn dispatch(
        &self,
        transfer_id: &str,
        details: DispatchDetails,
        actor: &Actor,
    ) -> EngineResult<TransferSnapshot> {
        self.dispatch_inner(transfer_id, details, actor)
            .await
            .inspect_err(|err| log_rejection(TransferEvent::Dispatch, Some(transfer_id), actor, err))
    }

    async fn dispatch_inner(
        &self,
        transfer_id: &str,
        details: DispatchDetails,
        actor: &Actor,
    ) -> EngineResult<TransferSnapshot> {
        validation::validate_actor(actor)?;
        validation::validate_dispatch(&details)?;

        let (mut tx, current) = self.load(transfer_id, details.expected_version).await?;
        authorize(actor, current.kind, TransferEvent::Dispatch, &current)?;

        let to = match check_transition(&current, TransferEvent::Dispatch)? {
            Resolution::Move(to) => to,
            Resolution::Unchanged if details.revised_quantities.is_empty() => {
                return self.unchanged(tx, &current).await;
            }
            Resolution::Unchanged => {
                return Err(ValidationError::ExpectedQuantityLocked {
                    transfer_id: current.id.clone(),
                }
                .into());
            }
            Resolution::Reconcile { .. } | Resolution::Replay => {
                return Err(invalid_transition(&current, TransferEvent::Dispatch));
            }
        };
        ensure_version(&current, details.expected_version)?;

        let now = Utc::now();
        if !details.revised_quantities.is_empty() {
            let lines = transfer::fetch_line_items(&mut *tx, &current.id).await?;
            for revision in &details.revised_quantities {
                if !lines.iter().any(|line| line.id == revision.line_item_id) {
                    return Err(ValidationError::UnknownLineItem {
                        line_item_id: revision.line_item_id.clone(),
                        transfer_id: current.id.clone(),
                    }
                    .into());
                }
                // Must land while the row is still DRAFT; the schema locks it after.
                transfer::update_expected_quantity(
                    &mut *tx,
                    &revision.line_item_id,
                    revision.quantity_expected,
                    now,
                )
                .await?;
            }
        }

        let mut next = apply_transition(&current, TransferEvent::Dispatch, to, actor, now);
        if details.expected_arrival_date.is_some() {
            next.expected_arrival_date = details.expected_arrival_date;
        }

        write_guarded(&mut *tx, &current, &next).await?;
        self.commit(
            tx,
            &next,
            TransferEvent::Dispatch,
            Some(current.status),
            actor,
            details.notes.as_deref(),
            &Evidence::default(),
        )
        .await
    }

    /// Marks goods as on the road. A no-op for kinds without that step.
    pub async fn mark_in_transit(
        &self,
        transfer_id: &str,
        request: StepRequest,
        actor: &Actor,
    ) -> EngineResult<TransferSnapshot> {
        self.step(transfer_id, TransferEvent::MarkInTransit, request, actor)
            .await
            .inspect_err(|err| {
                log_rejection(TransferEvent::MarkInTransit, Some(transfer_id), actor, err)
            })
    }

    /// Marks goods as handed over at the destination, before counting.
    pub async fn deliver(
        &self,
        transfer_id: &str,
        request: StepRequest,
        actor: &Actor,
    ) -> EngineResult<TransferSnapshot> {
        self.step(transfer_id, TransferEvent::Deliver, request, actor)
            .await
            .inspect_err(|err| log_rejection(TransferEvent::Deliver, Some(transfer_id), actor, err))
    }

    /// Cancels a transfer that has not been dispatched. `notes` carries the reason.
    pub async fn cancel(
        &self,
        transfer_id: &str,
        request: StepRequest,
        actor: &Actor,
    ) -> EngineResult<TransferSnapshot> {
        self.step(transfer_id, TransferEvent::Cancel, request, actor)
            .await
            .inspect_err(|err| log_rejection(TransferEvent::Cancel, Some(transfer_id), actor, err))
    }

    async fn step(
        &self,
        transfer_id: &str,
        event: TransferEvent,
        request: StepRequest,
        actor: &Actor,
    ) -> EngineResult<TransferSnapshot> {
        validation::validate_actor(actor)?;
        validation::validate_notes("notes", request.notes.as_deref())?;

        let (mut tx, current) = self.load(transfer_id, request.expected_version).await?;
        authorize(actor, current.kind, event, &current)?;

        let to = match check_transition(&current, event)? {
            Resolution::Move(to) => to,
            Resolution::Unchanged => return self.unchanged(tx, &current).await,
            Resolution::Reconcile { .. } | Resolution::Replay => {
                return Err(invalid_transition(&current, event));
            }
        };
        ensure_version(&current, request.expected_version)?;

        let next = apply_transition(&current, event, to, actor, Utc::now());
        write_guarded(&mut *tx, &current, &next).await?;
        self.commit(
            tx,
            &next,
            event,
            Some(current.status),
            actor,
            request.notes.as_deref(),
            &Evidence::default(),
        )
        .await
    }

    /// Records what arrived and reconciles it against what was expected.
    ///
    /// Every line needs a result. A clean count closes the transfer (or, for
    /// supplier receipts, hands it to validation); a mismatch needs
    /// discrepancy notes and parks it in DISCREPANCY.
    pub async fn receive(
        &self,
        transfer_id: &str,
        request: ReceiveRequest,
        actor: &Actor,
    ) -> EngineResult<TransferSnapshot> {
        self.receive_inner(transfer_id, request, actor)
            .await
            .inspect_err(|err| log_rejection(TransferEvent::Receive, Some(transfer_id), actor, err))
    }

    async fn receive_inner(
        &self,
        transfer_id: &str,
        request: ReceiveRequest,
        actor: &Actor,
    ) -> EngineResult<TransferSnapshot> {
        validation::validate_actor(actor)?;
        validation::validate_receive(&request)?;

        let (mut tx, current) = self.load(transfer_id, request.expected_version).await?;
        authorize(actor, current.kind, TransferEvent::Receive, &current)?;

        let lines = transfer::fetch_line_items(&mut *tx, &current.id).await?;
        let (clean, discrepancy) = match check_transition(&current, TransferEvent::Receive)? {
            Resolution::Reconcile { clean, discrepancy } => (clean, discrepancy),
            Resolution::Replay => {
                if matches_recorded(&lines, &request.line_item_results, Coverage::All) {
                    return self.unchanged(tx, &current).await;
                }
                ensure_version(&current, request.expected_version)?;
                return Err(invalid_transition(&current, TransferEvent::Receive));
            }
            Resolution::Unchanged => return self.unchanged(tx, &current).await,
            Resolution::Move(_) => return Err(invalid_transition(&current, TransferEvent::Receive)),
        };
        ensure_version(&current, request.expected_version)?;

        let quantities = collect_quantities(
            &current.id,
            &lines,
            &request.line_item_results,
            Coverage::All,
        )?;
        let report = reconcile(&quantities, ReconcilePolicy::on_receipt(self.over_delivery))?;

        let submitted_notes = non_blank(request.discrepancy_notes.as_deref());
        let to = route(
            &current.id,
            &report,
            submitted_notes.or(current.discrepancy_notes.as_deref()),
            clean,
            discrepancy,
        )?;

        let now = Utc::now();
        record_results(&mut *tx, &lines, &request.line_item_results, now).await?;

        let mut next = apply_transition(&current, TransferEvent::Receive, to, actor, now);
        next.actual_arrival_date = Some(request.actual_arrival_date.unwrap_or_else(|| now.date_naive()));
        if let Some(notes) = submitted_notes {
            next.discrepancy_notes = Some(notes.to_string());
        }

        debug!(
            transfer_id = %current.id,
            shortage = report.total_shortage(),
            damaged = report.total_damaged(),
            excess = report.total_excess(),
            "Receipt reconciled"
        );

        write_guarded(&mut *tx, &current, &next).await?;
        self.commit(
            tx,
            &next,
            TransferEvent::Receive,
            Some(current.status),
            actor,
            request.notes.as_deref(),
            &request.evidence,
        )
        .await
    }

    /// A validator's decision on a received transfer.
    ///
    /// Approve re-runs reconciliation over the recorded quantities plus any
    /// corrections, with reviewed damage no longer counting as a mismatch.
    /// Reject always lands in DISCREPANCY.
    pub async fn validate(
        &self,
        transfer_id: &str,
        request: ValidateRequest,
        actor: &Actor,
    ) -> EngineResult<TransferSnapshot> {
        self.validate_inner(transfer_id, request, actor)
            .await
            .inspect_err(|err| log_rejection(TransferEvent::Validate, Some(transfer_id), actor, err))
    }

    async fn validate_inner(
        &self,
        transfer_id: &str,
        request: ValidateRequest,
        actor: &Actor,
    ) -> EngineResult<TransferSnapshot> {
        validation::validate_actor(actor)?;
        validation::validate_validation(&request)?;

        let (mut tx, current) = self.load(transfer_id, request.expected_version).await?;
        authorize(actor, current.kind, TransferEvent::Validate, &current)?;

        let lines = transfer::fetch_line_items(&mut *tx, &current.id).await?;
        let (clean, discrepancy) = match check_transition(&current, TransferEvent::Validate)? {
            Resolution::Reconcile { clean, discrepancy } => (clean, discrepancy),
            Resolution::Replay => {
                if request.decision == ValidationDecision::Approve
                    && matches_recorded(&lines, &request.corrections, Coverage::Corrections)
                {
                    return self.unchanged(tx, &current).await;
                }
                ensure_version(&current, request.expected_version)?;
                return Err(invalid_transition(&current, TransferEvent::Validate));
            }
            Resolution::Unchanged => return self.unchanged(tx, &current).await,
            Resolution::Move(_) => {
                return Err(invalid_transition(&current, TransferEvent::Validate));
            }
        };
        ensure_version(&current, request.expected_version)?;

        let quantities = collect_quantities(
            &current.id,
            &lines,
            &request.corrections,
            Coverage::Corrections,
        )?;
        let submitted_notes = non_blank(request.discrepancy_notes.as_deref());

        let to = match request.decision {
            ValidationDecision::Approve => {
                let report =
                    reconcile(&quantities, ReconcilePolicy::on_approval(self.over_delivery))?;
                route(
                    &current.id,
                    &report,
                    submitted_notes.or(current.discrepancy_notes.as_deref()),
                    clean,
                    discrepancy,
                )?
            }
            ValidationDecision::Reject => {
                // Corrections are still checked before they are stored.
                reconcile(&quantities, ReconcilePolicy::on_receipt(self.over_delivery))?;
                discrepancy
            }
        };

        let now = Utc::now();
        record_results(&mut *tx, &lines, &request.corrections, now).await?;

        let mut next = apply_transition(&current, TransferEvent::Validate, to, actor, now);
        if let Some(notes) = submitted_notes {
            next.discrepancy_notes = Some(notes.to_string());
        }

        write_guarded(&mut *tx, &current, &next).await?;
        self.commit(
            tx,
            &next,
            TransferEvent::Validate,
            Some(current.status),
            actor,
            request.notes.as_deref(),
            &request.evidence,
        )
        .await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// A transfer with its line items, as committed.
    pub async fn get(&self, transfer_id: &str) -> EngineResult<TransferSnapshot> {
        self.db
            .transfers()
            .get(transfer_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Transfer", transfer_id).into())
    }

    /// Audit entries in sequence order.
    ///
    /// `None` returns the whole trail; a page with `limit` 0 uses the
    /// configured page size.
    pub async fn list_audit_trail(
        &self,
        transfer_id: &str,
        page: Option<Page>,
    ) -> EngineResult<Vec<AuditEntry>> {
        if !self.db.transfers().exists(transfer_id).await? {
            return Err(CoreError::not_found("Transfer", transfer_id).into());
        }

        let page = page.map(|page| Page {
            offset: page.offset,
            limit: if page.limit == 0 {
                self.audit_page_size
            } else {
                page.limit
            },
        });

        Ok(self.db.audit().list(transfer_id, page).await?)
    }

    /// Transfers matching the filter, newest first.
    pub async fn list(&self, filter: &TransferFilter) -> EngineResult<Vec<Transfer>> {
        Ok(self.db.transfers().list(filter).await?)
    }

    // =========================================================================
    // Transaction Steps
    // =========================================================================

    /// Reads the transfer's version, then begins the transaction, takes the
    /// write lock and loads the transfer.
    ///
    /// A call without a pinned version is prepared against the version read
    /// here. If another writer commits before the lock is taken, the call
    /// fails with `ConcurrencyConflict`. Pinned calls are checked against
    /// their own `expected_version` by the operation.
    async fn load(&self, transfer_id: &str, pinned: Option<i64>) -> EngineResult<(Tx, Transfer)> {
        validation::validate_uuid(transfer_id)?;

        let observed = self
            .db
            .transfers()
            .version(transfer_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Transfer", transfer_id))?;

        let mut tx = self.db.pool().begin().await?;
        transfer::claim_write_lock(&mut *tx, transfer_id).await?;

        let current = transfer::fetch_transfer(&mut *tx, transfer_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Transfer", transfer_id))?;

        if pinned.is_none() && current.version != observed {
            return Err(CoreError::ConcurrencyConflict {
                transfer_id: current.id.clone(),
                expected_version: observed,
                actual_version: current.version,
            }
            .into());
        }

        Ok((tx, current))
    }

    /// Ends a transaction that changed nothing and returns the stored state.
    async fn unchanged(&self, mut tx: Tx, current: &Transfer) -> EngineResult<TransferSnapshot> {
        let snapshot = transfer::fetch_snapshot(&mut *tx, &current.id)
            .await?
            .ok_or_else(|| CoreError::not_found("Transfer", &current.id))?;
        tx.rollback().await?;

        debug!(
            transfer_id = %current.id,
            status = %current.status,
            "Event already applied, nothing to do"
        );
        Ok(snapshot)
    }

    /// Appends the audit entry for `next`, re-reads it and commits.
    #[allow(clippy::too_many_arguments)]
    async fn commit(
        &self,
        mut tx: Tx,
        next: &Transfer,
        event: TransferEvent,
        from: Option<TransferStatus>,
        actor: &Actor,
        notes: Option<&str>,
        evidence: &Evidence,
    ) -> EngineResult<TransferSnapshot> {
        let entry = audit::append(
            &mut *tx,
            NewAuditEntry {
                transfer_id: &next.id,
                event_type: event_type_for(event, next.status),
                actor_id: &actor.user_id,
                actor_role: actor.role,
                timestamp: next.updated_at,
                from_status: from,
                to_status: next.status,
                notes,
                evidence,
            },
        )
        .await?;

        let snapshot = transfer::fetch_snapshot(&mut *tx, &next.id)
            .await?
            .ok_or_else(|| CoreError::not_found("Transfer", &next.id))?;

        tx.commit().await?;

        info!(
            transfer_id = %next.id,
            reference_number = %next.reference_number,
            kind = %next.kind,
            event = %event,
            from = ?from,
            to = %next.status,
            version = next.version,
            sequence_number = entry.sequence_number,
            "Transfer updated"
        );

        Ok(snapshot)
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn invalid_transition(transfer: &Transfer, event: TransferEvent) -> EngineError {
    CoreError::InvalidTransition {
        transfer_id: transfer.id.clone(),
        kind: transfer.kind,
        status: transfer.status,
        event,
    }
    .into()
}

/// Fails when the caller pinned a version that is no longer current.
fn ensure_version(transfer: &Transfer, expected: Option<i64>) -> Result<(), CoreError> {
    match expected {
        Some(expected) if expected != transfer.version => Err(CoreError::ConcurrencyConflict {
            transfer_id: transfer.id.clone(),
            expected_version: expected,
            actual_version: transfer.version,
        }),
        _ => Ok(()),
    }
}

/// Guarded write of `next` over `current`.
async fn write_guarded(
    conn: &mut SqliteConnection,
    current: &Transfer,
    next: &Transfer,
) -> EngineResult<()> {
    if transfer::update_guarded(conn, next, current.version, current.status).await? {
        return Ok(());
    }

    let actual_version = transfer::fetch_version(conn, &current.id)
        .await?
        .unwrap_or(current.version);
    Err(CoreError::ConcurrencyConflict {
        transfer_id: current.id.clone(),
        expected_version: current.version,
        actual_version,
    }
    .into())
}

/// Stores submitted quantities on the lines they name.
async fn record_results(
    conn: &mut SqliteConnection,
    lines: &[TransferLineItem],
    results: &[LineItemResult],
    now: DateTime<Utc>,
) -> EngineResult<()> {
    for result in results {
        let Some(line) = lines.iter().find(|line| line.id == result.line_item_id) else {
            continue;
        };

        let mut updated = line.clone();
        updated.quantity_received = Some(result.quantity_received);
        updated.quantity_damaged = Some(result.quantity_damaged);
        updated.condition_on_receipt = result.condition_on_receipt.or(line.condition_on_receipt);
        if result.batch_number.is_some() {
            updated.batch_number = result.batch_number.clone();
        }
        if result.expiry_date.is_some() {
            updated.expiry_date = result.expiry_date;
        }
        updated.updated_at = now;

        transfer::update_receipt(conn, &updated).await?;
    }
    Ok(())
}

/// Whether a re-sent submission carries exactly what is already stored.
fn matches_recorded(lines: &[TransferLineItem], results: &[LineItemResult], coverage: Coverage) -> bool {
    let ids: HashSet<&str> = results.iter().map(|r| r.line_item_id.as_str()).collect();
    if ids.len() != results.len() {
        return false;
    }
    if coverage == Coverage::All && ids.len() != lines.len() {
        return false;
    }

    results.iter().all(|result| {
        lines.iter().any(|line| {
            line.id == result.line_item_id
                && line.quantity_received == Some(result.quantity_received)
                && line.quantity_damaged.unwrap_or(0) == result.quantity_damaged
        })
    })
}

fn non_blank(notes: Option<&str>) -> Option<&str> {
    notes.filter(|n| !n.trim().is_empty())
}

fn log_rejection(event: TransferEvent, transfer_id: Option<&str>, actor: &Actor, err: &EngineError) {
    warn!(
        event = %event,
        transfer_id = transfer_id.unwrap_or("-"),
        actor_id = %actor.user_id,
        role = %actor.role,
        code = ?err.code(),
        error = %err,
        "Transfer operation rejected"
    );
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::DbConfig;
    use crate::response::{ErrorCode, OperationResponse};
    use chrono::Duration;
    use edutrack_core::audit::replay;
    use edutrack_core::{
        AuditEventType, CatalogItem, ExpectedQuantity, NewLineItem, OrgRef, Role, StaticCatalog,
        TransferKind,
    };

    const MATH: &str = "item-math-g4";
    const READER: &str = "item-reader-g2";

    fn catalog() -> StaticCatalog {
        StaticCatalog::new()
            .with_item(CatalogItem::new(MATH, "MATH-G4", "Mathematics Grade 4", "book"))
            .with_item(CatalogItem::new(READER, "READ-G2", "Reader Grade 2", "book"))
    }

    async fn engine() -> TransferEngine {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        TransferEngine::new(db, Arc::new(catalog()))
    }

    fn warehouse_manager() -> Actor {
        Actor::new("u-wh", Role::WarehouseManager).with_warehouse("wh-1")
    }

    fn national_manager() -> Actor {
        Actor::new("u-nat", Role::NationalManager)
    }

    fn council_officer() -> Actor {
        Actor::new("u-council", Role::CouncilOfficer).with_council("council-1")
    }

    fn school_rep(school: &str) -> Actor {
        Actor::new(format!("u-{}", school), Role::SchoolRepresentative).with_school(school)
    }

    fn new_transfer(kind: TransferKind, origin: OrgRef, destination: OrgRef, lines: Vec<NewLineItem>) -> NewTransfer {
        NewTransfer {
            kind,
            origin,
            destination,
            line_items: lines,
            reference_number: None,
            expected_arrival_date: None,
            notes: None,
        }
    }

    fn direct_shipment(quantity: i64) -> NewTransfer {
        new_transfer(
            TransferKind::DirectShipment,
            OrgRef::warehouse("wh-1"),
            OrgRef::school("school-a"),
            vec![NewLineItem::new(MATH, quantity)],
        )
    }

    fn receipt(line_item_id: &str, received: i64, damaged: i64) -> ReceiveRequest {
        ReceiveRequest {
            line_item_results: vec![LineItemResult::new(line_item_id, received, damaged)],
            ..ReceiveRequest::default()
        }
    }

    /// Creates and dispatches a direct shipment of `quantity` maths books.
    async fn dispatched_shipment(engine: &TransferEngine, quantity: i64) -> TransferSnapshot {
        let created = engine
            .create(direct_shipment(quantity), &warehouse_manager())
            .await
            .unwrap();
        engine
            .dispatch(&created.transfer.id, DispatchDetails::default(), &warehouse_manager())
            .await
            .unwrap()
    }

    async fn audit_count(engine: &TransferEngine, transfer_id: &str) -> usize {
        engine.list_audit_trail(transfer_id, None).await.unwrap().len()
    }

    #[tokio::test]
    async fn test_clean_receipt_confirms() {
        let engine = engine().await;

        let created = engine
            .create(direct_shipment(100), &warehouse_manager())
            .await
            .unwrap();
        assert_eq!(created.transfer.status, TransferStatus::Draft);
        assert_eq!(created.transfer.version, 1);
        assert!(created.transfer.reference_number.starts_with("DS-"));
        assert_eq!(created.line_items[0].item_name, "Mathematics Grade 4");
        assert_eq!(created.line_items[0].unit_of_measure, "book");

        let id = created.transfer.id.clone();
        let dispatched = engine
            .dispatch(&id, DispatchDetails::default(), &warehouse_manager())
            .await
            .unwrap();
        assert_eq!(dispatched.transfer.status, TransferStatus::Dispatched);
        assert_eq!(dispatched.transfer.dispatched_by.as_deref(), Some("u-wh"));

        let line_id = dispatched.line_items[0].id.clone();
        let received = engine
            .receive(&id, receipt(&line_id, 100, 0), &school_rep("school-a"))
            .await
            .unwrap();
        assert_eq!(received.transfer.status, TransferStatus::Confirmed);
        assert_eq!(received.transfer.discrepancy_notes, None);
        assert_eq!(received.transfer.actual_arrival_date, Some(Utc::now().date_naive()));
        assert_eq!(received.line_items[0].quantity_received, Some(100));
        assert!(!received.has_discrepancy());

        let trail = engine.list_audit_trail(&id, None).await.unwrap();
        let events: Vec<AuditEventType> = trail.iter().map(|e| e.event_type).collect();
        assert_eq!(
            events,
            vec![AuditEventType::Created, AuditEventType::Dispatched, AuditEventType::Received]
        );
        assert_eq!(trail[0].from_status, None);
        assert_eq!(trail[2].actor_role, Role::SchoolRepresentative);
    }

    #[tokio::test]
    async fn test_discrepancy_needs_notes_then_validates_after_correction() {
        let engine = engine().await;
        let shipment = dispatched_shipment(&engine, 100).await;
        let id = shipment.transfer.id.clone();
        let line_id = shipment.line_items[0].id.clone();
        let school = school_rep("school-a");

        let err = engine
            .receive(&id, receipt(&line_id, 90, 5), &school)
            .await
            .unwrap_err();
        match err {
            EngineError::Core(CoreError::DiscrepancyRequiresNotes { line_item_ids, .. }) => {
                assert_eq!(line_item_ids, vec![line_id.clone()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(engine.get(&id).await.unwrap().transfer.status, TransferStatus::Dispatched);
        assert_eq!(audit_count(&engine, &id).await, 2);

        let mut with_notes = receipt(&line_id, 90, 5);
        with_notes.discrepancy_notes = Some("One carton short, one carton water damaged".to_string());
        let disputed = engine.receive(&id, with_notes, &school).await.unwrap();
        assert_eq!(disputed.transfer.status, TransferStatus::Discrepancy);
        assert_eq!(disputed.line_items[0].discrepancy_quantity(), Some(5));

        let trail = engine.list_audit_trail(&id, None).await.unwrap();
        assert_eq!(trail.last().unwrap().event_type, AuditEventType::DiscrepancyRaised);

        // The missing carton turned up; the damage was reviewed and accepted.
        let correction = ValidateRequest {
            corrections: vec![LineItemResult::new(&line_id, 95, 5)],
            ..ValidateRequest::approve()
        };
        let validated = engine.validate(&id, correction, &national_manager()).await.unwrap();
        assert_eq!(validated.transfer.status, TransferStatus::Validated);
        assert_eq!(validated.transfer.validated_by.as_deref(), Some("u-nat"));
        assert_eq!(validated.line_items[0].discrepancy_quantity(), Some(0));

        let trail = engine.list_audit_trail(&id, None).await.unwrap();
        assert_eq!(replay(&trail).unwrap(), Some(TransferStatus::Validated));
    }

    #[tokio::test]
    async fn test_school_rep_cannot_receive_another_schools_distribution() {
        let engine = engine().await;
        let council = council_officer();

        let created = engine
            .create(
                new_transfer(
                    TransferKind::Distribution,
                    OrgRef::council("council-1"),
                    OrgRef::school("school-b"),
                    vec![NewLineItem::new(READER, 40)],
                ),
                &council,
            )
            .await
            .unwrap();
        let id = created.transfer.id.clone();
        let line_id = created.line_items[0].id.clone();
        engine
            .dispatch(&id, DispatchDetails::default(), &council)
            .await
            .unwrap();

        let err = engine
            .receive(&id, receipt(&line_id, 40, 0), &school_rep("school-a"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AuthorizationError);
        assert!(err.to_string().contains("SCHOOL:school-b"));
        assert_eq!(audit_count(&engine, &id).await, 2);

        let received = engine
            .receive(&id, receipt(&line_id, 40, 0), &school_rep("school-b"))
            .await
            .unwrap();
        assert_eq!(received.transfer.status, TransferStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_view_only_and_wrong_warehouse_are_refused() {
        let engine = engine().await;

        let viewer = Actor::new("u-view", Role::ViewOnly);
        let err = engine.create(direct_shipment(10), &viewer).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AuthorizationError);

        let other_warehouse = Actor::new("u-wh2", Role::WarehouseManager).with_warehouse("wh-2");
        let err = engine
            .create(direct_shipment(10), &other_warehouse)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AuthorizationError);

        let admin = Actor::new("u-admin", Role::SuperAdmin);
        assert!(engine.create(direct_shipment(10), &admin).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_receives_pinned_to_same_version() {
        let engine = engine().await;
        let shipment = dispatched_shipment(&engine, 100).await;
        let id = shipment.transfer.id.clone();
        let line_id = shipment.line_items[0].id.clone();
        let version = shipment.transfer.version;
        let school = school_rep("school-a");

        let mut clean = receipt(&line_id, 100, 0);
        clean.expected_version = Some(version);
        let mut short = receipt(&line_id, 80, 0);
        short.expected_version = Some(version);
        short.discrepancy_notes = Some("Twenty books missing".to_string());

        let (a, b) = tokio::join!(
            engine.receive(&id, clean, &school),
            engine.receive(&id, short, &school)
        );

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        let loser = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(loser.code(), ErrorCode::ConcurrencyConflict);

        let stored = engine.get(&id).await.unwrap();
        assert_eq!(stored.transfer.version, version + 1);
        assert_eq!(audit_count(&engine, &id).await, 3);
    }

    #[tokio::test]
    async fn test_concurrent_writers_on_pooled_file_database() {
        let path = std::env::temp_dir().join(format!("edutrack-test-{}.db", Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path).max_connections(4)).await.unwrap();
        let engine = TransferEngine::new(db, Arc::new(catalog()));

        let shipment = dispatched_shipment(&engine, 50).await;
        let id = shipment.transfer.id.clone();
        let line_id = shipment.line_items[0].id.clone();
        let version = shipment.transfer.version;
        let school = school_rep("school-a");

        let mut first = receipt(&line_id, 50, 0);
        first.expected_version = Some(version);
        let mut second = receipt(&line_id, 45, 5);
        second.expected_version = Some(version);
        second.discrepancy_notes = Some("Five damaged".to_string());

        let (a, b) = tokio::join!(
            engine.receive(&id, first, &school),
            engine.receive(&id, second, &school)
        );
        let succeeded = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(succeeded, 1);

        let trail = engine.list_audit_trail(&id, None).await.unwrap();
        assert_eq!(trail.len(), 3);
        assert_eq!(
            replay(&trail).unwrap(),
            Some(engine.get(&id).await.unwrap().transfer.status)
        );

        engine.database().close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }

    #[tokio::test]
    async fn test_unpinned_concurrent_receives_one_wins() {
        let path = std::env::temp_dir().join(format!("edutrack-test-{}.db", Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path).max_connections(4)).await.unwrap();
        let engine = TransferEngine::new(db, Arc::new(catalog()));

        let shipment = dispatched_shipment(&engine, 100).await;
        let id = shipment.transfer.id.clone();
        let line_id = shipment.line_items[0].id.clone();
        let version = shipment.transfer.version;

        // Hold the write lock so both receives read the same version first.
        let mut blocker = engine.database().pool().begin().await.unwrap();
        transfer::claim_write_lock(&mut *blocker, &id).await.unwrap();

        let mut short = receipt(&line_id, 80, 0);
        short.discrepancy_notes = Some("Twenty books missing".to_string());
        let clean = receipt(&line_id, 100, 0);

        let spawn_receive = |request: ReceiveRequest| {
            let engine = engine.clone();
            let id = id.clone();
            tokio::spawn(async move { engine.receive(&id, request, &school_rep("school-a")).await })
        };
        let a = spawn_receive(short);
        let b = spawn_receive(clean);

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        blocker.rollback().await.unwrap();

        let outcomes = [a.await.unwrap(), b.await.unwrap()];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        let loser = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(matches!(
            loser,
            EngineError::Core(CoreError::ConcurrencyConflict { expected_version, actual_version, .. })
                if *expected_version == version && *actual_version == version + 1
        ));

        let stored = engine.get(&id).await.unwrap();
        assert_eq!(stored.transfer.version, version + 1);
        let trail = engine.list_audit_trail(&id, None).await.unwrap();
        assert_eq!(trail.len(), 3);
        assert_eq!(replay(&trail).unwrap(), Some(stored.transfer.status));

        engine.database().close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }

    #[tokio::test]
    async fn test_oversized_quantities_are_refused_without_trace() {
        let engine = engine().await;
        let shipment = dispatched_shipment(&engine, 100).await;
        let id = shipment.transfer.id.clone();
        let line_id = shipment.line_items[0].id.clone();

        let mut request = receipt(&line_id, i64::MAX, 1);
        request.discrepancy_notes = Some("count sheet garbled".to_string());
        let err = engine
            .receive(&id, request, &school_rep("school-a"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));

        let stored = engine.get(&id).await.unwrap();
        assert_eq!(stored.transfer.status, TransferStatus::Dispatched);
        assert_eq!(stored.line_items[0].quantity_received, None);
        assert_eq!(audit_count(&engine, &id).await, 2);
    }

    #[tokio::test]
    async fn test_stale_pinned_version_is_rejected() {
        let engine = engine().await;
        let created = engine
            .create(direct_shipment(10), &warehouse_manager())
            .await
            .unwrap();
        let id = created.transfer.id.clone();

        let details = DispatchDetails {
            expected_version: Some(created.transfer.version + 3),
            ..DispatchDetails::default()
        };
        let err = engine
            .dispatch(&id, details, &warehouse_manager())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::ConcurrencyConflict { actual_version: 1, .. })
        ));
        assert_eq!(audit_count(&engine, &id).await, 1);
    }

    #[tokio::test]
    async fn test_failed_operations_leave_no_trace() {
        let engine = engine().await;
        let shipment = dispatched_shipment(&engine, 10).await;
        let id = shipment.transfer.id.clone();

        let err = engine
            .cancel(&id, StepRequest::with_notes("changed our mind"), &warehouse_manager())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTransition);

        let err = engine
            .receive(&id, receipt("not-a-line", 10, 0), &school_rep("school-a"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let stored = engine.get(&id).await.unwrap();
        assert_eq!(stored.transfer.status, TransferStatus::Dispatched);
        assert_eq!(stored.transfer.version, shipment.transfer.version);
        assert_eq!(stored.line_items[0].quantity_received, None);
        assert_eq!(audit_count(&engine, &id).await, 2);
    }

    #[tokio::test]
    async fn test_audit_failure_rolls_back_transition() {
        let engine = engine().await;
        let created = engine
            .create(direct_shipment(10), &warehouse_manager())
            .await
            .unwrap();
        let id = created.transfer.id.clone();

        sqlx::query(
            "CREATE TRIGGER audit_unavailable BEFORE INSERT ON audit_entries \
             BEGIN SELECT RAISE(ABORT, 'audit store unavailable'); END",
        )
        .execute(engine.database().pool())
        .await
        .unwrap();

        let response = OperationResponse::from(
            engine
                .dispatch(&id, DispatchDetails::default(), &warehouse_manager())
                .await,
        );
        assert!(!response.is_success());
        assert_eq!(response.error.unwrap().code, ErrorCode::DatabaseError);

        let stored = engine.get(&id).await.unwrap();
        assert_eq!(stored.transfer.status, TransferStatus::Draft);
        assert_eq!(stored.transfer.version, 1);
        assert_eq!(stored.transfer.dispatched_at, None);
    }

    #[tokio::test]
    async fn test_cancel_before_dispatch_is_idempotent() {
        let engine = engine().await;
        let created = engine
            .create(direct_shipment(10), &warehouse_manager())
            .await
            .unwrap();
        let id = created.transfer.id.clone();

        let cancelled = engine
            .cancel(&id, StepRequest::with_notes("Duplicate order"), &warehouse_manager())
            .await
            .unwrap();
        assert_eq!(cancelled.transfer.status, TransferStatus::Cancelled);

        let again = engine
            .cancel(&id, StepRequest::default(), &warehouse_manager())
            .await
            .unwrap();
        assert_eq!(again.transfer.version, cancelled.transfer.version);

        let trail = engine.list_audit_trail(&id, None).await.unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[1].event_type, AuditEventType::Cancelled);
        assert_eq!(trail[1].notes.as_deref(), Some("Duplicate order"));
    }

    #[tokio::test]
    async fn test_direct_shipment_transit_and_delivery() {
        let engine = engine().await;
        let shipment = dispatched_shipment(&engine, 10).await;
        let id = shipment.transfer.id.clone();
        let wh = warehouse_manager();

        let moving = engine.mark_in_transit(&id, StepRequest::default(), &wh).await.unwrap();
        assert_eq!(moving.transfer.status, TransferStatus::InTransit);

        let delivered = engine
            .deliver(&id, StepRequest::pinned(moving.transfer.version), &wh)
            .await
            .unwrap();
        assert_eq!(delivered.transfer.status, TransferStatus::Delivered);

        let err = engine
            .mark_in_transit(&id, StepRequest::default(), &wh)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTransition);
    }

    #[tokio::test]
    async fn test_council_shipment_skips_transit_steps() {
        let engine = engine().await;
        let wh = warehouse_manager();

        let created = engine
            .create(
                new_transfer(
                    TransferKind::CouncilShipment,
                    OrgRef::warehouse("wh-1"),
                    OrgRef::council("council-1"),
                    vec![NewLineItem::new(MATH, 200), NewLineItem::new(READER, 120)],
                ),
                &wh,
            )
            .await
            .unwrap();
        let id = created.transfer.id.clone();
        let shipped = engine.dispatch(&id, DispatchDetails::default(), &wh).await.unwrap();

        let after_transit = engine.mark_in_transit(&id, StepRequest::default(), &wh).await.unwrap();
        let after_deliver = engine.deliver(&id, StepRequest::default(), &wh).await.unwrap();
        assert_eq!(after_transit.transfer.status, TransferStatus::Dispatched);
        assert_eq!(after_deliver.transfer.version, shipped.transfer.version);
        assert_eq!(audit_count(&engine, &id).await, 2);

        let results = shipped
            .line_items
            .iter()
            .map(|line| LineItemResult::new(&line.id, line.quantity_expected, 0))
            .collect();
        let request = ReceiveRequest {
            line_item_results: results,
            ..ReceiveRequest::default()
        };
        let confirmed = engine.receive(&id, request, &council_officer()).await.unwrap();
        assert_eq!(confirmed.transfer.status, TransferStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_supplier_receipt_is_recorded_then_validated() {
        let engine = engine().await;
        let wh = warehouse_manager();

        let created = engine
            .create(
                new_transfer(
                    TransferKind::SupplierReceipt,
                    OrgRef::supplier("sup-1"),
                    OrgRef::warehouse("wh-1"),
                    vec![NewLineItem::new(MATH, 50)],
                ),
                &wh,
            )
            .await
            .unwrap();
        let id = created.transfer.id.clone();
        let line_id = created.line_items[0].id.clone();
        assert!(created.transfer.reference_number.starts_with("SR-"));

        let err = engine.dispatch(&id, DispatchDetails::default(), &wh).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTransition);

        let mut request = receipt(&line_id, 48, 2);
        request.discrepancy_notes = Some("Two books with torn covers".to_string());
        let received = engine.receive(&id, request, &wh).await.unwrap();
        assert_eq!(received.transfer.status, TransferStatus::Received);

        let err = engine
            .validate(&id, ValidateRequest::approve(), &wh)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AuthorizationError);

        let validated = engine
            .validate(&id, ValidateRequest::approve(), &national_manager())
            .await
            .unwrap();
        assert_eq!(validated.transfer.status, TransferStatus::Validated);

        // Re-sent approval with nothing new.
        let again = engine
            .validate(&id, ValidateRequest::approve(), &national_manager())
            .await
            .unwrap();
        assert_eq!(again.transfer.version, validated.transfer.version);
        assert_eq!(audit_count(&engine, &id).await, 3);
    }

    #[tokio::test]
    async fn test_validator_rejection_requires_notes_and_disputes() {
        let engine = engine().await;
        let wh = warehouse_manager();
        let created = engine
            .create(
                new_transfer(
                    TransferKind::SupplierReceipt,
                    OrgRef::supplier("sup-1"),
                    OrgRef::warehouse("wh-1"),
                    vec![NewLineItem::new(READER, 30)],
                ),
                &wh,
            )
            .await
            .unwrap();
        let id = created.transfer.id.clone();
        let line_id = created.line_items[0].id.clone();
        engine.receive(&id, receipt(&line_id, 30, 0), &wh).await.unwrap();

        let mut blank = ValidateRequest::reject("  ");
        blank.notes = Some("looks wrong".to_string());
        let err = engine.validate(&id, blank, &national_manager()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let disputed = engine
            .validate(&id, ValidateRequest::reject("Wrong edition delivered"), &national_manager())
            .await
            .unwrap();
        assert_eq!(disputed.transfer.status, TransferStatus::Discrepancy);
        assert_eq!(
            disputed.transfer.discrepancy_notes.as_deref(),
            Some("Wrong edition delivered")
        );
    }

    #[tokio::test]
    async fn test_resent_receipt_is_a_noop_only_when_identical() {
        let engine = engine().await;
        let shipment = dispatched_shipment(&engine, 20).await;
        let id = shipment.transfer.id.clone();
        let line_id = shipment.line_items[0].id.clone();
        let school = school_rep("school-a");

        let confirmed = engine.receive(&id, receipt(&line_id, 20, 0), &school).await.unwrap();
        let again = engine.receive(&id, receipt(&line_id, 20, 0), &school).await.unwrap();
        assert_eq!(again, confirmed);

        let err = engine
            .receive(&id, receipt(&line_id, 19, 0), &school)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTransition);
        assert_eq!(audit_count(&engine, &id).await, 3);
    }

    #[tokio::test]
    async fn test_over_delivery_policy() {
        let rejecting = engine().await;
        let shipment = dispatched_shipment(&rejecting, 100).await;
        let line_id = shipment.line_items[0].id.clone();
        let err = rejecting
            .receive(&shipment.transfer.id, receipt(&line_id, 105, 0), &school_rep("school-a"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::Validation(ValidationError::ExceedsExpected { .. }))
        ));

        let accepting = engine().await.with_over_delivery(OverDeliveryPolicy::Accept);
        let shipment = dispatched_shipment(&accepting, 100).await;
        let line_id = shipment.line_items[0].id.clone();

        let err = accepting
            .receive(&shipment.transfer.id, receipt(&line_id, 105, 0), &school_rep("school-a"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DiscrepancyRequiresNotes);

        let mut request = receipt(&line_id, 105, 0);
        request.discrepancy_notes = Some("Five extra books in the last carton".to_string());
        let received = accepting
            .receive(&shipment.transfer.id, request, &school_rep("school-a"))
            .await
            .unwrap();
        assert_eq!(received.transfer.status, TransferStatus::Discrepancy);
        assert_eq!(received.line_items[0].discrepancy_quantity(), Some(-5));
    }

    #[tokio::test]
    async fn test_expected_quantity_fixed_after_dispatch() {
        let engine = engine().await;
        let wh = warehouse_manager();
        let created = engine.create(direct_shipment(100), &wh).await.unwrap();
        let id = created.transfer.id.clone();
        let line_id = created.line_items[0].id.clone();

        let details = DispatchDetails {
            revised_quantities: vec![ExpectedQuantity {
                line_item_id: line_id.clone(),
                quantity_expected: 80,
            }],
            expected_arrival_date: Some(Utc::now().date_naive() + Duration::days(3)),
            ..DispatchDetails::default()
        };
        let dispatched = engine.dispatch(&id, details.clone(), &wh).await.unwrap();
        assert_eq!(dispatched.line_items[0].quantity_expected, 80);
        assert!(dispatched.transfer.expected_arrival_date.is_some());

        let err = engine.dispatch(&id, details, &wh).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::Validation(ValidationError::ExpectedQuantityLocked { .. }))
        ));

        let err: DbError = sqlx::query("UPDATE transfer_line_items SET quantity_expected = 1 WHERE id = ?1")
            .bind(&line_id)
            .execute(engine.database().pool())
            .await
            .unwrap_err()
            .into();
        assert!(matches!(err, DbError::Rejected(_)));
        assert_eq!(engine.get(&id).await.unwrap().line_items[0].quantity_expected, 80);
    }

    #[tokio::test]
    async fn test_reference_numbers() {
        let engine = engine().await;
        let wh = warehouse_manager();

        let first = engine.create(direct_shipment(1), &wh).await.unwrap();
        let second = engine.create(direct_shipment(1), &wh).await.unwrap();
        let today = Utc::now().format("%Y%m%d").to_string();
        assert_eq!(first.transfer.reference_number, format!("DS-{}-0001", today));
        assert_eq!(second.transfer.reference_number, format!("DS-{}-0002", today));

        let mut supplied = direct_shipment(1);
        supplied.reference_number = Some("DN-2026/0042".to_string());
        engine.create(supplied.clone(), &wh).await.unwrap();
        let err = engine.create(supplied, &wh).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::Validation(ValidationError::DuplicateReference { .. }))
        ));
    }

    #[tokio::test]
    async fn test_unknown_item_and_transfer() {
        let engine = engine().await;

        let request = new_transfer(
            TransferKind::DirectShipment,
            OrgRef::warehouse("wh-1"),
            OrgRef::school("school-a"),
            vec![NewLineItem::new("item-missing", 5)],
        );
        let err = engine.create(request, &warehouse_manager()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert_eq!(engine.database().transfers().count().await.unwrap(), 0);

        let err = engine.get("no-such-transfer").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        let err = engine
            .deliver(&Uuid::new_v4().to_string(), StepRequest::default(), &warehouse_manager())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        let err = engine
            .deliver("no-such-transfer", StepRequest::default(), &warehouse_manager())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        let err = engine.list_audit_trail("no-such-transfer", None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_audit_trail_paging() {
        let engine = engine().await.with_audit_page_size(2);
        let shipment = dispatched_shipment(&engine, 10).await;
        let id = shipment.transfer.id.clone();
        engine
            .mark_in_transit(&id, StepRequest::default(), &warehouse_manager())
            .await
            .unwrap();

        let default_page = engine
            .list_audit_trail(&id, Some(Page::first(0)))
            .await
            .unwrap();
        assert_eq!(default_page.len(), 2);

        let rest = engine
            .list_audit_trail(&id, Some(Page { offset: 2, limit: 10 }))
            .await
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].sequence_number, 3);
        assert_eq!(rest[0].event_type, AuditEventType::InTransit);
    }

    #[tokio::test]
    async fn test_listing_filters() {
        let engine = engine().await;
        let wh = warehouse_manager();
        let council = council_officer();

        let direct = engine.create(direct_shipment(5), &wh).await.unwrap();
        engine
            .create(
                new_transfer(
                    TransferKind::CouncilShipment,
                    OrgRef::warehouse("wh-1"),
                    OrgRef::council("council-1"),
                    vec![NewLineItem::new(MATH, 5)],
                ),
                &wh,
            )
            .await
            .unwrap();
        engine
            .create(
                new_transfer(
                    TransferKind::Distribution,
                    OrgRef::council("council-1"),
                    OrgRef::school("school-b"),
                    vec![NewLineItem::new(READER, 5)],
                ),
                &council,
            )
            .await
            .unwrap();
        engine
            .dispatch(&direct.transfer.id, DispatchDetails::default(), &wh)
            .await
            .unwrap();

        let all = engine.list(&TransferFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);

        let by_kind = engine
            .list(&TransferFilter {
                kind: Some(TransferKind::Distribution),
                ..TransferFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_kind.len(), 1);
        assert_eq!(by_kind[0].destination, OrgRef::school("school-b"));

        let by_status = engine
            .list(&TransferFilter {
                statuses: vec![TransferStatus::Dispatched, TransferStatus::InTransit],
                ..TransferFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_status.len(), 1);
        assert_eq!(by_status[0].id, direct.transfer.id);

        let by_origin = engine
            .list(&TransferFilter {
                origin: Some(OrgRef::warehouse("wh-1")),
                ..TransferFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_origin.len(), 2);

        let council_side = engine
            .list(&TransferFilter {
                organization: Some(OrgRef::council("council-1")),
                ..TransferFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(council_side.len(), 2);

        let today = Utc::now().date_naive();
        let created_today = engine
            .list(&TransferFilter {
                created_from: Some(today),
                created_to: Some(today),
                ..TransferFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(created_today.len(), 3);

        let before_today = engine
            .list(&TransferFilter {
                created_to: Some(today - Duration::days(1)),
                ..TransferFilter::default()
            })
            .await
            .unwrap();
        assert!(before_today.is_empty());

        let first_page = engine
            .list(&TransferFilter {
                limit: Some(2),
                ..TransferFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(first_page.len(), 2);
    }

    #[tokio::test]
    async fn test_from_config() {
        let config = EngineConfig::from_toml_str(
            "[reconciliation]\nover_delivery = \"accept\"\n[audit]\npage_size = 7",
        )
        .unwrap();
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = TransferEngine::from_config(db, Arc::new(catalog()), &config);
        assert_eq!(engine.over_delivery, OverDeliveryPolicy::Accept);
        assert_eq!(engine.audit_page_size, 7);
    }
}
