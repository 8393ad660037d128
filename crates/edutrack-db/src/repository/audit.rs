//! Audit trail persistence.
//!
//! Entries are only ever inserted; triggers in the schema refuse UPDATE and
//! DELETE. Sequence numbers are assigned inside the writing transaction,
//! which already holds the write lock, so they stay gap-free.

use chrono::{DateTime, Utc};
use edutrack_core::{
    AuditEntry, AuditEventType, Evidence, Page, Role, TransferStatus,
};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

const AUDIT_COLUMNS: &str = r#"
    id, transfer_id, sequence_number, event_type, actor_id, actor_role,
    timestamp, from_status, to_status, notes, evidence
"#;

#[derive(Debug, Clone, sqlx::FromRow)]
struct AuditRow {
    id: String,
    transfer_id: String,
    sequence_number: i64,
    event_type: AuditEventType,
    actor_id: String,
    actor_role: Role,
    timestamp: DateTime<Utc>,
    from_status: Option<TransferStatus>,
    to_status: TransferStatus,
    notes: Option<String>,
    evidence: String,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = DbError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        Ok(AuditEntry {
            evidence: serde_json::from_str(&row.evidence)?,
            id: row.id,
            transfer_id: row.transfer_id,
            sequence_number: row.sequence_number,
            event_type: row.event_type,
            actor_id: row.actor_id,
            actor_role: row.actor_role,
            timestamp: row.timestamp,
            from_status: row.from_status,
            to_status: row.to_status,
            notes: row.notes,
        })
    }
}

/// An entry about to be appended; id and sequence number are assigned on write.
#[derive(Debug, Clone)]
pub struct NewAuditEntry<'a> {
    pub transfer_id: &'a str,
    pub event_type: AuditEventType,
    pub actor_id: &'a str,
    pub actor_role: Role,
    pub timestamp: DateTime<Utc>,
    pub from_status: Option<TransferStatus>,
    pub to_status: TransferStatus,
    pub notes: Option<&'a str>,
    pub evidence: &'a Evidence,
}

/// Appends an entry inside the caller's transaction.
pub async fn append(conn: &mut SqliteConnection, entry: NewAuditEntry<'_>) -> DbResult<AuditEntry> {
    let sequence_number: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(sequence_number), 0) + 1 FROM audit_entries WHERE transfer_id = ?1",
    )
    .bind(entry.transfer_id)
    .fetch_one(&mut *conn)
    .await?;

    let id = Uuid::new_v4().to_string();
    let evidence_json = serde_json::to_string(entry.evidence)?;

    debug!(
        transfer_id = %entry.transfer_id,
        sequence_number,
        event_type = %entry.event_type,
        "Appending audit entry"
    );

    sqlx::query(
        r#"
        INSERT INTO audit_entries (
            id, transfer_id, sequence_number, event_type, actor_id, actor_role,
            timestamp, from_status, to_status, notes, evidence
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&id)
    .bind(entry.transfer_id)
    .bind(sequence_number)
    .bind(entry.event_type)
    .bind(entry.actor_id)
    .bind(entry.actor_role)
    .bind(entry.timestamp)
    .bind(entry.from_status)
    .bind(entry.to_status)
    .bind(entry.notes)
    .bind(&evidence_json)
    .execute(&mut *conn)
    .await?;

    Ok(AuditEntry {
        id,
        transfer_id: entry.transfer_id.to_string(),
        sequence_number,
        event_type: entry.event_type,
        actor_id: entry.actor_id.to_string(),
        actor_role: entry.actor_role,
        timestamp: entry.timestamp,
        from_status: entry.from_status,
        to_status: entry.to_status,
        notes: entry.notes.map(str::to_string),
        evidence: entry.evidence.clone(),
    })
}

/// Repository for reading audit trails.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AuditRepository { pool }
    }

    /// Entries for a transfer in sequence order; the whole trail when `page` is `None`.
    pub async fn list(&self, transfer_id: &str, page: Option<Page>) -> DbResult<Vec<AuditEntry>> {
        let rows = match page {
            Some(page) => {
                let sql = format!(
                    "SELECT {} FROM audit_entries WHERE transfer_id = ?1 \
                     ORDER BY sequence_number LIMIT ?2 OFFSET ?3",
                    AUDIT_COLUMNS
                );
                sqlx::query_as::<_, AuditRow>(&sql)
                    .bind(transfer_id)
                    .bind(i64::from(page.limit))
                    .bind(i64::from(page.offset))
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM audit_entries WHERE transfer_id = ?1 ORDER BY sequence_number",
                    AUDIT_COLUMNS
                );
                sqlx::query_as::<_, AuditRow>(&sql)
                    .bind(transfer_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(AuditEntry::try_from).collect()
    }

    pub async fn count(&self, transfer_id: &str) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM audit_entries WHERE transfer_id = ?1")
                .bind(transfer_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
