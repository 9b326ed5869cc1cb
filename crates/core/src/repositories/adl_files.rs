//! ADL files: extended dossiers for complex cases, and their physical tracking.
//!
//! A file moves between the record room and clinics:
//!
//! ```text
//! created ─┐
//! stored  ─┼─ retrieve ─> retrieved ─ return ─> stored
//! active  ─┘
//! any non-archived ─ archive ─> archived (inactive)
//! ```
//!
//! Every move appends a [`FileMovement`].

use api_shared::{
    AdlFile, AdlMovementReq, AdlStatus, AuditAction, FileMovement, MovementType, UpdateAdlFileReq,
};
use chrono::{Datelike, Utc};
use rusqlite::{params, Connection, Row};

use super::{audit, count, known_user, Listing, Store};
use crate::constants::ADL_NUMBER_PREFIX;
use crate::db::{json_column, optional_row, parse_column, Database};
use crate::events::{ChangeBus, ResourceKind};
use crate::validation::{optional_text, PageRequest};
use crate::{RecordError, RecordResult};

const TABLE: &str = "adl_files";

fn map_row(row: &Row<'_>) -> rusqlite::Result<AdlFile> {
    Ok(AdlFile {
        id: row.get("id")?,
        patient_id: row.get("patient_id")?,
        adl_no: row.get("adl_no")?,
        clinical_proforma_id: row.get("clinical_proforma_id")?,
        created_by: row.get("created_by")?,
        file_status: parse_column(row, "file_status")?,
        physical_file_location: row.get("physical_file_location")?,
        file_created_date: row.get("file_created_date")?,
        last_accessed_date: row.get("last_accessed_date")?,
        last_accessed_by: row.get("last_accessed_by")?,
        total_visits: row.get("total_visits")?,
        is_active: row.get("is_active")?,
        notes: row.get("notes")?,
        details: json_column(row, "details")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn map_movement(row: &Row<'_>) -> rusqlite::Result<FileMovement> {
    Ok(FileMovement {
        id: row.get("id")?,
        adl_file_id: row.get("adl_file_id")?,
        patient_id: row.get("patient_id")?,
        moved_by: row.get("moved_by")?,
        movement_type: parse_column(row, "movement_type")?,
        from_location: row.get("from_location")?,
        to_location: row.get("to_location")?,
        movement_date: row.get("movement_date")?,
        notes: row.get("notes")?,
    })
}

pub(crate) fn find(conn: &Connection, id: i64) -> RecordResult<AdlFile> {
    optional_row(conn.query_row("SELECT * FROM adl_files WHERE id = ?1", [id], map_row))?
        .ok_or_else(|| RecordError::not_found("ADL file", id))
}

/// The patient's newest active file, if any.
pub(crate) fn active_for_patient(conn: &Connection, patient_id: i64) -> RecordResult<Option<AdlFile>> {
    optional_row(conn.query_row(
        "SELECT * FROM adl_files WHERE patient_id = ?1 AND is_active = 1 ORDER BY id DESC LIMIT 1",
        [patient_id],
        map_row,
    ))
}

/// Next `ADL-<year>-<sequence>` number; the sequence restarts every year.
fn next_adl_no(conn: &Connection, year: i32) -> RecordResult<String> {
    let prefix = format!("{ADL_NUMBER_PREFIX}-{year}-");
    let last: Option<String> = optional_row(conn.query_row(
        "SELECT adl_no FROM adl_files WHERE adl_no LIKE ?1 ORDER BY adl_no DESC LIMIT 1",
        [format!("{prefix}%")],
        |row| row.get(0),
    ))?;

    let sequence = last
        .as_deref()
        .and_then(|no| no.strip_prefix(&prefix))
        .and_then(|seq| seq.parse::<u32>().ok())
        .unwrap_or(0)
        + 1;
    Ok(format!("{prefix}{sequence:05}"))
}

/// Status reached by applying `movement` to a file in `current`.
///
/// # Errors
///
/// Returns `RecordError::InvalidTransition` if the move is not allowed from `current`.
pub fn next_status(current: AdlStatus, movement: MovementType) -> RecordResult<AdlStatus> {
    use AdlStatus::*;

    let next = match (movement, current) {
        (MovementType::Retrieved, Created | Stored | Active) => Retrieved,
        (MovementType::Returned, Retrieved) => Stored,
        (MovementType::Archived, status) if status != Archived => Archived,
        _ => {
            return Err(RecordError::InvalidTransition(format!(
                "cannot apply {movement} to a file that is {current}"
            )))
        }
    };
    Ok(next)
}

fn log_movement(
    conn: &Connection,
    file: &AdlFile,
    movement_type: MovementType,
    from_location: Option<&str>,
    to_location: Option<&str>,
    moved_by: Option<i64>,
    notes: Option<&str>,
) -> RecordResult<()> {
    conn.execute(
        "INSERT INTO file_movements (adl_file_id, patient_id, moved_by, movement_type,
             from_location, to_location, movement_date, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            file.id,
            file.patient_id,
            moved_by,
            movement_type.as_str(),
            from_location,
            to_location,
            Utc::now(),
            notes
        ],
    )?;
    Ok(())
}

/// Opens a new ADL file for a complex-case proforma and links both sides.
pub(crate) fn create_for_proforma(
    conn: &Connection,
    patient_id: i64,
    proforma_id: i64,
    actor: Option<i64>,
) -> RecordResult<AdlFile> {
    let actor = known_user(conn, actor)?;
    let now = Utc::now();
    let today = now.date_naive();
    let adl_no = next_adl_no(conn, today.year())?;

    conn.execute(
        "INSERT INTO adl_files (patient_id, adl_no, clinical_proforma_id, created_by, file_status,
             file_created_date, last_accessed_date, last_accessed_by, total_visits, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?4, 1, ?7, ?7)",
        params![
            patient_id,
            adl_no,
            proforma_id,
            actor,
            AdlStatus::Created.as_str(),
            today,
            now
        ],
    )?;
    let id = conn.last_insert_rowid();

    conn.execute(
        "UPDATE clinical_proforma SET adl_file_id = ?1 WHERE id = ?2",
        params![id, proforma_id],
    )?;
    conn.execute(
        "UPDATE patients SET has_adl_file = 1, updated_at = ?1 WHERE id = ?2",
        params![now, patient_id],
    )?;

    let file = find(conn, id)?;
    log_movement(conn, &file, MovementType::Created, None, None, actor, None)?;
    audit::record(conn, TABLE, id, AuditAction::Create, actor, Some(&adl_no))?;
    Ok(file)
}

/// Counts a new visit against an existing file.
pub(crate) fn record_visit(conn: &Connection, file_id: i64, actor: Option<i64>) -> RecordResult<()> {
    let now = Utc::now();
    conn.execute(
        "UPDATE adl_files SET total_visits = total_visits + 1, last_accessed_date = ?1,
             last_accessed_by = COALESCE(?2, last_accessed_by), updated_at = ?3
         WHERE id = ?4",
        params![now.date_naive(), known_user(conn, actor)?, now, file_id],
    )?;
    Ok(())
}

/// Points an existing file at the complex-case proforma that now uses it.
pub(crate) fn link_proforma(conn: &Connection, file_id: i64, proforma_id: i64) -> RecordResult<()> {
    conn.execute(
        "UPDATE adl_files SET clinical_proforma_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![proforma_id, Utc::now(), file_id],
    )?;
    Ok(())
}

#[derive(Clone)]
pub struct AdlFileService {
    store: Store,
}

impl AdlFileService {
    pub fn new(db: Database, bus: ChangeBus) -> Self {
        Self {
            store: Store::new(db, bus),
        }
    }

    pub fn list(&self, page: &PageRequest, status: Option<AdlStatus>) -> RecordResult<Listing<AdlFile>> {
        let status = status.map(|s| s.as_str());
        self.store.db.with_connection(|conn| {
            let total = count(
                conn,
                "SELECT COUNT(*) FROM adl_files WHERE ?1 IS NULL OR file_status = ?1",
                [status],
            )?;
            let mut stmt = conn.prepare(
                "SELECT * FROM adl_files WHERE ?1 IS NULL OR file_status = ?1
                 ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
            )?;
            let items = stmt
                .query_map(params![status, page.limit_i64(), page.offset()], map_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Listing {
                items,
                pagination: page.pagination(total),
            })
        })
    }

    pub fn get(&self, id: i64) -> RecordResult<AdlFile> {
        self.store.db.with_connection(|conn| find(conn, id))
    }

    pub fn for_patient(&self, patient_id: i64) -> RecordResult<Vec<AdlFile>> {
        self.store.db.with_connection(|conn| {
            super::patients::ensure_exists(conn, patient_id)?;
            let mut stmt =
                conn.prepare("SELECT * FROM adl_files WHERE patient_id = ?1 ORDER BY id DESC")?;
            let files = stmt
                .query_map([patient_id], map_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(files)
        })
    }

    /// Updates location, notes and, when given, replaces the dossier.
    pub fn update(&self, id: i64, req: &UpdateAdlFileReq, actor: Option<i64>) -> RecordResult<AdlFile> {
        let file = self.store.db.with_transaction(|tx| {
            let current = find(tx, id)?;
            let details = match &req.details {
                Some(details) => details.clone(),
                None => current.details,
            };
            tx.execute(
                "UPDATE adl_files SET physical_file_location = ?1, notes = ?2, details = ?3,
                     updated_at = ?4
                 WHERE id = ?5",
                params![
                    optional_text(req.physical_file_location.as_deref())
                        .or(current.physical_file_location),
                    optional_text(req.notes.as_deref()).or(current.notes),
                    serde_json::to_string(&details)?,
                    Utc::now(),
                    id
                ],
            )?;
            audit::record(tx, TABLE, id, AuditAction::Update, actor, None)?;
            find(tx, id)
        })?;

        self.store.changed(ResourceKind::AdlFile, id, AuditAction::Update);
        Ok(file)
    }

    pub fn retrieve(&self, id: i64, req: &AdlMovementReq, actor: Option<i64>) -> RecordResult<AdlFile> {
        self.move_file(id, MovementType::Retrieved, req, actor)
    }

    pub fn return_file(&self, id: i64, req: &AdlMovementReq, actor: Option<i64>) -> RecordResult<AdlFile> {
        self.move_file(id, MovementType::Returned, req, actor)
    }

    pub fn archive(&self, id: i64, req: &AdlMovementReq, actor: Option<i64>) -> RecordResult<AdlFile> {
        self.move_file(id, MovementType::Archived, req, actor)
    }

    fn move_file(
        &self,
        id: i64,
        movement: MovementType,
        req: &AdlMovementReq,
        actor: Option<i64>,
    ) -> RecordResult<AdlFile> {
        let file = self.store.db.with_transaction(|tx| {
            let current = find(tx, id)?;
            let status = next_status(current.file_status, movement)?;
            let actor = known_user(tx, actor)?;
            let to_location = optional_text(req.to_location.as_deref());
            let location = to_location.clone().or(current.physical_file_location.clone());
            let now = Utc::now();

            tx.execute(
                "UPDATE adl_files SET file_status = ?1, physical_file_location = ?2,
                     is_active = ?3, last_accessed_date = ?4,
                     last_accessed_by = COALESCE(?5, last_accessed_by), updated_at = ?6
                 WHERE id = ?7",
                params![
                    status.as_str(),
                    location,
                    status != AdlStatus::Archived,
                    now.date_naive(),
                    actor,
                    now,
                    id
                ],
            )?;
            log_movement(
                tx,
                &current,
                movement,
                current.physical_file_location.as_deref(),
                to_location.as_deref(),
                actor,
                optional_text(req.notes.as_deref()).as_deref(),
            )?;
            audit::record(tx, TABLE, id, AuditAction::Update, actor, Some(movement.as_str()))?;
            find(tx, id)
        })?;

        self.store.changed(ResourceKind::AdlFile, id, AuditAction::Update);
        Ok(file)
    }

    /// Movement history of a file, oldest first.
    pub fn movements(&self, id: i64) -> RecordResult<Vec<FileMovement>> {
        self.store.db.with_connection(|conn| {
            find(conn, id)?;
            let mut stmt =
                conn.prepare("SELECT * FROM file_movements WHERE adl_file_id = ?1 ORDER BY id")?;
            let movements = stmt
                .query_map([id], map_movement)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(movements)
        })
    }
}
