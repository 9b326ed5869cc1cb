//! Append-only change history.

use api_shared::{AuditAction, AuditLog};
use chrono::Utc;
use rusqlite::{params, Connection, Row};

use super::known_user;
use crate::db::{parse_column, Database};
use crate::RecordResult;

/// Appends one audit row. Called inside the writing transaction.
pub(crate) fn record(
    conn: &Connection,
    table_name: &str,
    record_id: i64,
    action: AuditAction,
    changed_by: Option<i64>,
    summary: Option<&str>,
) -> RecordResult<()> {
    conn.execute(
        "INSERT INTO audit_logs (table_name, record_id, action, changed_by, changed_at, summary)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            table_name,
            record_id,
            action.as_str(),
            known_user(conn, changed_by)?,
            Utc::now(),
            summary
        ],
    )?;
    Ok(())
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<AuditLog> {
    Ok(AuditLog {
        id: row.get("id")?,
        table_name: row.get("table_name")?,
        record_id: row.get("record_id")?,
        action: parse_column(row, "action")?,
        changed_by: row.get("changed_by")?,
        changed_at: row.get("changed_at")?,
        summary: row.get("summary")?,
    })
}

#[derive(Clone)]
pub struct AuditService {
    db: Database,
}

impl AuditService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// History of one record, oldest first.
    pub fn history(&self, table_name: &str, record_id: i64) -> RecordResult<Vec<AuditLog>> {
        self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM audit_logs WHERE table_name = ?1 AND record_id = ?2 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![table_name, record_id], map_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}
