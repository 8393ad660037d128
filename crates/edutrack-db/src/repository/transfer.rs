//! # Transfer Repository
//!
//! Rows for transfers and their line items.
//!
//! ## Two Access Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Writes (engine, inside one transaction)                               │
//! │    free functions taking &mut SqliteConnection                         │
//! │    claim_write_lock ► fetch ► insert / update_guarded ► …              │
//! │                                                                         │
//! │  Reads (committed state)                                               │
//! │    TransferRepository over the pool: get, list, count                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Optimistic Guard
//! `update_guarded` only matches the row the caller read:
//! `WHERE id = ? AND version = ? AND status = ?`. Zero affected rows means
//! someone else wrote first.

use chrono::{DateTime, NaiveDate, Utc};
use edutrack_core::{
    ItemCondition, OrgRef, OrgType, Transfer, TransferFilter, TransferKind, TransferLineItem,
    TransferSnapshot, TransferStatus,
};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

/// Rows returned by `list` when the filter sets no limit.
pub const DEFAULT_LIST_LIMIT: u32 = 100;

/// Hard cap on rows returned by `list`.
pub const MAX_LIST_LIMIT: u32 = 1000;

const TRANSFER_COLUMNS: &str = r#"
    id, kind, status,
    origin_type, origin_id, destination_type, destination_id,
    reference_number, expected_arrival_date, actual_arrival_date,
    created_by, dispatched_by, received_by, validated_by,
    dispatched_at, received_at, validated_at,
    notes, discrepancy_notes,
    created_at, updated_at, version
"#;

const LINE_ITEM_COLUMNS: &str = r#"
    id, transfer_id, item_id, item_code, item_name, unit_of_measure,
    quantity_expected, quantity_received, quantity_damaged, condition_on_receipt,
    batch_number, expiry_date, created_at, updated_at
"#;

// =============================================================================
// Record Types
// =============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
struct TransferRow {
    id: String,
    kind: TransferKind,
    status: TransferStatus,
    origin_type: OrgType,
    origin_id: String,
    destination_type: OrgType,
    destination_id: String,
    reference_number: String,
    expected_arrival_date: Option<NaiveDate>,
    actual_arrival_date: Option<NaiveDate>,
    created_by: String,
    dispatched_by: Option<String>,
    received_by: Option<String>,
    validated_by: Option<String>,
    dispatched_at: Option<DateTime<Utc>>,
    received_at: Option<DateTime<Utc>>,
    validated_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    discrepancy_notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl From<TransferRow> for Transfer {
    fn from(row: TransferRow) -> Self {
        Transfer {
            id: row.id,
            kind: row.kind,
            status: row.status,
            origin: OrgRef::new(row.origin_type, row.origin_id),
            destination: OrgRef::new(row.destination_type, row.destination_id),
            reference_number: row.reference_number,
            expected_arrival_date: row.expected_arrival_date,
            actual_arrival_date: row.actual_arrival_date,
            created_by: row.created_by,
            dispatched_by: row.dispatched_by,
            received_by: row.received_by,
            validated_by: row.validated_by,
            dispatched_at: row.dispatched_at,
            received_at: row.received_at,
            validated_at: row.validated_at,
            notes: row.notes,
            discrepancy_notes: row.discrepancy_notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct LineItemRow {
    id: String,
    transfer_id: String,
    item_id: String,
    item_code: String,
    item_name: String,
    unit_of_measure: String,
    quantity_expected: i64,
    quantity_received: Option<i64>,
    quantity_damaged: Option<i64>,
    condition_on_receipt: Option<ItemCondition>,
    batch_number: Option<String>,
    expiry_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<LineItemRow> for TransferLineItem {
    fn from(row: LineItemRow) -> Self {
        TransferLineItem {
            id: row.id,
            transfer_id: row.transfer_id,
            item_id: row.item_id,
            item_code: row.item_code,
            item_name: row.item_name,
            unit_of_measure: row.unit_of_measure,
            quantity_expected: row.quantity_expected,
            quantity_received: row.quantity_received,
            quantity_damaged: row.quantity_damaged,
            condition_on_receipt: row.condition_on_receipt,
            batch_number: row.batch_number,
            expiry_date: row.expiry_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// =============================================================================
// Transactional Access
// =============================================================================

/// Takes SQLite's write lock for the current transaction.
///
/// Must be the first statement of a mutating transaction: concurrent
/// writers then queue on the busy timeout instead of failing on a
/// read-to-write lock upgrade.
pub async fn claim_write_lock(conn: &mut SqliteConnection, transfer_id: &str) -> DbResult<()> {
    sqlx::query("UPDATE transfers SET version = version WHERE id = ?1")
        .bind(transfer_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn fetch_transfer(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Transfer>> {
    let sql = format!("SELECT {} FROM transfers WHERE id = ?1", TRANSFER_COLUMNS);
    let row = sqlx::query_as::<_, TransferRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(Transfer::from))
}

pub async fn fetch_version(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<i64>> {
    let version = sqlx::query_scalar::<_, i64>("SELECT version FROM transfers WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(version)
}

pub async fn fetch_line_items(
    conn: &mut SqliteConnection,
    transfer_id: &str,
) -> DbResult<Vec<TransferLineItem>> {
    let sql = format!(
        "SELECT {} FROM transfer_line_items WHERE transfer_id = ?1 ORDER BY created_at, id",
        LINE_ITEM_COLUMNS
    );
    let rows = sqlx::query_as::<_, LineItemRow>(&sql)
        .bind(transfer_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().map(TransferLineItem::from).collect())
}

pub async fn fetch_snapshot(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<TransferSnapshot>> {
    let Some(transfer) = fetch_transfer(conn, id).await? else {
        return Ok(None);
    };
    let line_items = fetch_line_items(conn, id).await?;
    Ok(Some(TransferSnapshot {
        transfer,
        line_items,
    }))
}

/// Whether a reference number is already taken within a kind.
pub async fn reference_exists(
    conn: &mut SqliteConnection,
    kind: TransferKind,
    reference: &str,
) -> DbResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM transfers WHERE kind = ?1 AND reference_number = ?2",
    )
    .bind(kind)
    .bind(reference)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count > 0)
}

/// Generates the next reference number: `<PREFIX>-<YYYYMMDD>-<NNNN>`.
///
/// ## Example
/// `DS-20260131-0001`, `DS-20260131-0002`, …, `DS-20260131-9999`,
/// `DS-20260131-10000`
///
/// The sequence restarts every day per kind. Called inside the creating
/// transaction; `UNIQUE(kind, reference_number)` backs it up.
pub async fn next_reference_number(
    conn: &mut SqliteConnection,
    kind: TransferKind,
    date: NaiveDate,
) -> DbResult<String> {
    let stem = format!("{}-{}-", kind.reference_prefix(), date.format("%Y%m%d"));
    let pattern = format!("{}[0-9][0-9][0-9][0-9]*", stem);
    let suffix_start = stem.len() as i64 + 1;

    // Only all-digit suffixes count; the sequence widens past 9999.
    let last: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT MAX(CAST(substr(reference_number, ?3) AS INTEGER))
        FROM transfers
        WHERE kind = ?1
          AND reference_number GLOB ?2
          AND substr(reference_number, ?3) NOT GLOB '*[^0-9]*'
        "#,
    )
    .bind(kind)
    .bind(&pattern)
    .bind(suffix_start)
    .fetch_one(&mut *conn)
    .await?;

    let seq = last.unwrap_or(0) + 1;
    Ok(format!("{}{:04}", stem, seq))
}

pub async fn insert_transfer(conn: &mut SqliteConnection, transfer: &Transfer) -> DbResult<()> {
    debug!(id = %transfer.id, reference_number = %transfer.reference_number, "Inserting transfer");

    sqlx::query(
        r#"
        INSERT INTO transfers (
            id, kind, status,
            origin_type, origin_id, destination_type, destination_id,
            reference_number, expected_arrival_date, actual_arrival_date,
            created_by, dispatched_by, received_by, validated_by,
            dispatched_at, received_at, validated_at,
            notes, discrepancy_notes,
            created_at, updated_at, version
        ) VALUES (
            ?1, ?2, ?3,
            ?4, ?5, ?6, ?7,
            ?8, ?9, ?10,
            ?11, ?12, ?13, ?14,
            ?15, ?16, ?17,
            ?18, ?19,
            ?20, ?21, ?22
        )
        "#,
    )
    .bind(&transfer.id)
    .bind(transfer.kind)
    .bind(transfer.status)
    .bind(transfer.origin.org_type)
    .bind(&transfer.origin.id)
    .bind(transfer.destination.org_type)
    .bind(&transfer.destination.id)
    .bind(&transfer.reference_number)
    .bind(transfer.expected_arrival_date)
    .bind(transfer.actual_arrival_date)
    .bind(&transfer.created_by)
    .bind(&transfer.dispatched_by)
    .bind(&transfer.received_by)
    .bind(&transfer.validated_by)
    .bind(transfer.dispatched_at)
    .bind(transfer.received_at)
    .bind(transfer.validated_at)
    .bind(&transfer.notes)
    .bind(&transfer.discrepancy_notes)
    .bind(transfer.created_at)
    .bind(transfer.updated_at)
    .bind(transfer.version)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn insert_line_item(conn: &mut SqliteConnection, item: &TransferLineItem) -> DbResult<()> {
    debug!(transfer_id = %item.transfer_id, item_id = %item.item_id, "Inserting line item");

    sqlx::query(
        r#"
        INSERT INTO transfer_line_items (
            id, transfer_id, item_id, item_code, item_name, unit_of_measure,
            quantity_expected, quantity_received, quantity_damaged, condition_on_receipt,
            batch_number, expiry_date, created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6,
            ?7, ?8, ?9, ?10,
            ?11, ?12, ?13, ?14
        )
        "#,
    )
    .bind(&item.id)
    .bind(&item.transfer_id)
    .bind(&item.item_id)
    .bind(&item.item_code)
    .bind(&item.item_name)
    .bind(&item.unit_of_measure)
    .bind(item.quantity_expected)
    .bind(item.quantity_received)
    .bind(item.quantity_damaged)
    .bind(item.condition_on_receipt)
    .bind(&item.batch_number)
    .bind(item.expiry_date)
    .bind(item.created_at)
    .bind(item.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Writes `next` over the row the caller read.
///
/// Returns `false` when the row no longer has `expected_version` and
/// `expected_status`.
pub async fn update_guarded(
    conn: &mut SqliteConnection,
    next: &Transfer,
    expected_version: i64,
    expected_status: TransferStatus,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE transfers SET
            status = ?1,
            expected_arrival_date = ?2,
            actual_arrival_date = ?3,
            dispatched_by = ?4,
            received_by = ?5,
            validated_by = ?6,
            dispatched_at = ?7,
            received_at = ?8,
            validated_at = ?9,
            notes = ?10,
            discrepancy_notes = ?11,
            updated_at = ?12,
            version = ?13
        WHERE id = ?14 AND version = ?15 AND status = ?16
        "#,
    )
    .bind(next.status)
    .bind(next.expected_arrival_date)
    .bind(next.actual_arrival_date)
    .bind(&next.dispatched_by)
    .bind(&next.received_by)
    .bind(&next.validated_by)
    .bind(next.dispatched_at)
    .bind(next.received_at)
    .bind(next.validated_at)
    .bind(&next.notes)
    .bind(&next.discrepancy_notes)
    .bind(next.updated_at)
    .bind(next.version)
    .bind(&next.id)
    .bind(expected_version)
    .bind(expected_status)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Revises a line's expected quantity. The schema refuses once dispatched.
pub async fn update_expected_quantity(
    conn: &mut SqliteConnection,
    line_item_id: &str,
    quantity_expected: i64,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        "UPDATE transfer_line_items SET quantity_expected = ?1, updated_at = ?2 WHERE id = ?3",
    )
    .bind(quantity_expected)
    .bind(now)
    .bind(line_item_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Records what was counted for a line.
pub async fn update_receipt(conn: &mut SqliteConnection, item: &TransferLineItem) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE transfer_line_items SET
            quantity_received = ?1,
            quantity_damaged = ?2,
            condition_on_receipt = ?3,
            batch_number = ?4,
            expiry_date = ?5,
            updated_at = ?6
        WHERE id = ?7
        "#,
    )
    .bind(item.quantity_received)
    .bind(item.quantity_damaged)
    .bind(item.condition_on_receipt)
    .bind(&item.batch_number)
    .bind(item.expiry_date)
    .bind(item.updated_at)
    .bind(&item.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// =============================================================================
// Committed-State Reads
// =============================================================================

/// Repository for transfer reads.
#[derive(Debug, Clone)]
pub struct TransferRepository {
    pool: SqlitePool,
}

impl TransferRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TransferRepository { pool }
    }

    /// Gets a transfer and its line items.
    pub async fn get(&self, id: &str) -> DbResult<Option<TransferSnapshot>> {
        let mut conn = self.pool.acquire().await?;
        fetch_snapshot(&mut conn, id).await
    }

    pub async fn exists(&self, id: &str) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transfers WHERE id = ?1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// The transfer's committed version, if it exists.
    pub async fn version(&self, id: &str) -> DbResult<Option<i64>> {
        let version = sqlx::query_scalar::<_, i64>("SELECT version FROM transfers WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(version)
    }

    /// Lists transfers matching the filter, newest first.
    pub async fn list(&self, filter: &TransferFilter) -> DbResult<Vec<Transfer>> {
        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM transfers WHERE 1 = 1", TRANSFER_COLUMNS));

        if let Some(kind) = filter.kind {
            qb.push(" AND kind = ").push_bind(kind);
        }

        if !filter.statuses.is_empty() {
            qb.push(" AND status IN (");
            let mut statuses = qb.separated(", ");
            for status in &filter.statuses {
                statuses.push_bind(*status);
            }
            statuses.push_unseparated(")");
        }

        if let Some(origin) = &filter.origin {
            qb.push(" AND origin_type = ")
                .push_bind(origin.org_type)
                .push(" AND origin_id = ")
                .push_bind(origin.id.clone());
        }

        if let Some(destination) = &filter.destination {
            qb.push(" AND destination_type = ")
                .push_bind(destination.org_type)
                .push(" AND destination_id = ")
                .push_bind(destination.id.clone());
        }

        if let Some(org) = &filter.organization {
            qb.push(" AND ((origin_type = ")
                .push_bind(org.org_type)
                .push(" AND origin_id = ")
                .push_bind(org.id.clone())
                .push(") OR (destination_type = ")
                .push_bind(org.org_type)
                .push(" AND destination_id = ")
                .push_bind(org.id.clone())
                .push("))");
        }

        // Timestamps are RFC 3339 text, so the first ten characters are the date.
        if let Some(from) = filter.created_from {
            qb.push(" AND substr(created_at, 1, 10) >= ").push_bind(from);
        }
        if let Some(to) = filter.created_to {
            qb.push(" AND substr(created_at, 1, 10) <= ").push_bind(to);
        }
        if let Some(from) = filter.expected_arrival_from {
            qb.push(" AND expected_arrival_date >= ").push_bind(from);
        }
        if let Some(to) = filter.expected_arrival_to {
            qb.push(" AND expected_arrival_date <= ").push_bind(to);
        }

        let limit = filter
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);
        let offset = filter.offset.unwrap_or(0);

        qb.push(" ORDER BY created_at DESC, id LIMIT ")
            .push_bind(i64::from(limit))
            .push(" OFFSET ")
            .push_bind(i64::from(offset));

        let rows = qb
            .build_query_as::<TransferRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Transfer::from).collect())
    }

    /// Counts all transfers.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transfers")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
