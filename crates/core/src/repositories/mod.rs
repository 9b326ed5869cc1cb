//! Resource services over the SQLite store.
//!
//! Each service owns a [`Database`] handle and a [`ChangeBus`]. Writes run in one
//! transaction, append an audit row, and publish a [`ChangeEvent`] once committed.
//!
//! Services hold no caller identity rules; authorisation belongs to the API layer.

pub mod adl_files;
pub mod audit;
pub mod clinical_options;
pub mod patients;
pub mod prescriptions;
pub mod proformas;
pub mod users;

pub use adl_files::AdlFileService;
pub use audit::AuditService;
pub use clinical_options::ClinicalOptionService;
pub use patients::PatientService;
pub use prescriptions::PrescriptionService;
pub use proformas::ProformaService;
pub use users::UserService;

use api_shared::{AuditAction, Pagination};
use rusqlite::Connection;
use tracing::info;

use crate::db::Database;
use crate::events::{ChangeBus, ChangeEvent, ResourceKind};
use crate::RecordResult;

/// One page of a list query.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

/// Shared plumbing of every service.
#[derive(Clone)]
pub(crate) struct Store {
    pub(crate) db: Database,
    pub(crate) bus: ChangeBus,
}

impl Store {
    pub(crate) fn new(db: Database, bus: ChangeBus) -> Self {
        Self { db, bus }
    }

    /// Publishes a committed change and logs it.
    pub(crate) fn changed(&self, kind: ResourceKind, id: i64, action: AuditAction) {
        info!(?kind, id, %action, "record changed");
        self.bus.publish(ChangeEvent::new(kind, Some(id), action));
    }
}

pub(crate) fn count(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> RecordResult<u64> {
    let total: i64 = conn.query_row(sql, params, |row| row.get(0))?;
    Ok(u64::try_from(total).unwrap_or(0))
}

pub(crate) fn exists(conn: &Connection, table: &str, id: i64) -> RecordResult<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1)");
    Ok(conn.query_row(&sql, [id], |row| row.get(0))?)
}

/// Keeps an acting user id only if that user exists. Identity headers are not checked
/// against the users table, and a dangling id would violate the foreign key.
pub(crate) fn known_user(conn: &Connection, user_id: Option<i64>) -> RecordResult<Option<i64>> {
    match user_id {
        Some(id) if exists(conn, "users", id)? => Ok(Some(id)),
        _ => Ok(None),
    }
}
