//! Medication rows attached to a clinical proforma.

use api_shared::{
    AuditAction, BulkPrescriptionReq, CreatePrescriptionReq, Prescription, PrescriptionInput,
};
use chrono::Utc;
use rusqlite::{params, Connection, Row};

use super::{audit, count, proformas, Listing, Store};
use crate::db::{optional_row, Database};
use crate::events::{ChangeBus, ResourceKind};
use crate::validation::{require_text, PageRequest};
use crate::{RecordError, RecordResult};

const TABLE: &str = "prescriptions";

fn map_row(row: &Row<'_>) -> rusqlite::Result<Prescription> {
    Ok(Prescription {
        id: row.get("id")?,
        clinical_proforma_id: row.get("clinical_proforma_id")?,
        item: PrescriptionInput {
            medicine: row.get("medicine")?,
            dosage: row.get("dosage")?,
            when_to_take: row.get("when_to_take")?,
            frequency: row.get("frequency")?,
            duration: row.get("duration")?,
            qty: row.get("qty")?,
            details: row.get("details")?,
            notes: row.get("notes")?,
        },
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn find(conn: &Connection, id: i64) -> RecordResult<Prescription> {
    optional_row(conn.query_row("SELECT * FROM prescriptions WHERE id = ?1", [id], map_row))?
        .ok_or_else(|| RecordError::not_found("prescription", id))
}

/// Trims every field; the medicine name is mandatory.
fn normalise(item: &PrescriptionInput) -> RecordResult<PrescriptionInput> {
    Ok(PrescriptionInput {
        medicine: require_text("medicine", &item.medicine)?,
        dosage: item.dosage.trim().to_string(),
        when_to_take: item.when_to_take.trim().to_string(),
        frequency: item.frequency.trim().to_string(),
        duration: item.duration.trim().to_string(),
        qty: item.qty.trim().to_string(),
        details: item.details.trim().to_string(),
        notes: item.notes.trim().to_string(),
    })
}

fn insert(conn: &Connection, clinical_proforma_id: i64, item: &PrescriptionInput) -> RecordResult<i64> {
    conn.execute(
        "INSERT INTO prescriptions (clinical_proforma_id, medicine, dosage, when_to_take, frequency,
             duration, qty, details, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            clinical_proforma_id,
            item.medicine,
            item.dosage,
            item.when_to_take,
            item.frequency,
            item.duration,
            item.qty,
            item.details,
            item.notes,
            Utc::now()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

#[derive(Clone)]
pub struct PrescriptionService {
    store: Store,
}

impl PrescriptionService {
    pub fn new(db: Database, bus: ChangeBus) -> Self {
        Self {
            store: Store::new(db, bus),
        }
    }

    pub fn list_for_proforma(
        &self,
        clinical_proforma_id: i64,
        page: &PageRequest,
    ) -> RecordResult<Listing<Prescription>> {
        self.store.db.with_connection(|conn| {
            proformas::ensure_exists(conn, clinical_proforma_id)?;
            let total = count(
                conn,
                "SELECT COUNT(*) FROM prescriptions WHERE clinical_proforma_id = ?1",
                [clinical_proforma_id],
            )?;
            let mut stmt = conn.prepare(
                "SELECT * FROM prescriptions WHERE clinical_proforma_id = ?1
                 ORDER BY id LIMIT ?2 OFFSET ?3",
            )?;
            let items = stmt
                .query_map(
                    params![clinical_proforma_id, page.limit_i64(), page.offset()],
                    map_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Listing {
                items,
                pagination: page.pagination(total),
            })
        })
    }

    pub fn get(&self, id: i64) -> RecordResult<Prescription> {
        self.store.db.with_connection(|conn| find(conn, id))
    }

    pub fn create(&self, req: &CreatePrescriptionReq, actor: Option<i64>) -> RecordResult<Prescription> {
        let item = normalise(&req.item)?;
        let prescription = self.store.db.with_transaction(|tx| {
            proformas::ensure_exists(tx, req.clinical_proforma_id)?;
            let id = insert(tx, req.clinical_proforma_id, &item)?;
            audit::record(tx, TABLE, id, AuditAction::Create, actor, Some(&item.medicine))?;
            find(tx, id)
        })?;

        self.store
            .changed(ResourceKind::Prescription, prescription.id, AuditAction::Create);
        Ok(prescription)
    }

    /// Inserts every row in one transaction; either all rows are stored or none.
    ///
    /// # Errors
    ///
    /// - `RecordError::InvalidInput` if the list is empty or any row lacks a medicine.
    /// - `RecordError::NotFound` if the proforma does not exist.
    pub fn create_bulk(&self, req: &BulkPrescriptionReq, actor: Option<i64>) -> RecordResult<Vec<Prescription>> {
        if req.prescriptions.is_empty() {
            return Err(RecordError::InvalidInput(
                "at least one prescription is required".into(),
            ));
        }
        let items = req
            .prescriptions
            .iter()
            .enumerate()
            .map(|(i, item)| {
                normalise(item).map_err(|_| {
                    RecordError::InvalidInput(format!("prescription {} has no medicine", i + 1))
                })
            })
            .collect::<RecordResult<Vec<_>>>()?;

        let created = self.store.db.with_transaction(|tx| {
            proformas::ensure_exists(tx, req.clinical_proforma_id)?;
            let mut created = Vec::with_capacity(items.len());
            for item in &items {
                let id = insert(tx, req.clinical_proforma_id, item)?;
                audit::record(tx, TABLE, id, AuditAction::Create, actor, Some(&item.medicine))?;
                created.push(find(tx, id)?);
            }
            Ok(created)
        })?;

        for prescription in &created {
            self.store
                .changed(ResourceKind::Prescription, prescription.id, AuditAction::Create);
        }
        Ok(created)
    }

    /// Overwrites a row. Prescriptions are not versioned.
    pub fn update(&self, id: i64, item: &PrescriptionInput, actor: Option<i64>) -> RecordResult<Prescription> {
        let item = normalise(item)?;
        let prescription = self.store.db.with_transaction(|tx| {
            let changed = tx.execute(
                "UPDATE prescriptions SET medicine = ?1, dosage = ?2, when_to_take = ?3,
                     frequency = ?4, duration = ?5, qty = ?6, details = ?7, notes = ?8,
                     updated_at = ?9
                 WHERE id = ?10",
                params![
                    item.medicine,
                    item.dosage,
                    item.when_to_take,
                    item.frequency,
                    item.duration,
                    item.qty,
                    item.details,
                    item.notes,
                    Utc::now(),
                    id
                ],
            )?;
            if changed == 0 {
                return Err(RecordError::not_found("prescription", id));
            }
            audit::record(tx, TABLE, id, AuditAction::Update, actor, None)?;
            find(tx, id)
        })?;

        self.store
            .changed(ResourceKind::Prescription, id, AuditAction::Update);
        Ok(prescription)
    }

    pub fn delete(&self, id: i64, actor: Option<i64>) -> RecordResult<()> {
        self.store.db.with_transaction(|tx| {
            let deleted = tx.execute("DELETE FROM prescriptions WHERE id = ?1", [id])?;
            if deleted == 0 {
                return Err(RecordError::not_found("prescription", id));
            }
            audit::record(tx, TABLE, id, AuditAction::Delete, actor, None)
        })?;

        self.store
            .changed(ResourceKind::Prescription, id, AuditAction::Delete);
        Ok(())
    }
}
