//! Patient registration and the outpatient (socio-demographic) record.
//!
//! Patients are never hard-deleted through this service: `delete` clears `is_active` and the
//! record stays readable by id. Lists show active patients only.

use api_shared::{AuditAction, OutpatientInput, OutpatientRecord, Patient, PatientInput};
use chrono::Utc;
use rusqlite::{params, Connection, Row};

use super::{audit, count, exists, known_user, Listing, Store};
use crate::db::{is_unique_violation, optional_row, parse_column, Database};
use crate::events::{ChangeBus, ResourceKind};
use crate::validation::{optional_text, require_text, validate_age, PageRequest};
use crate::{RecordError, RecordResult};

const TABLE: &str = "patients";

const SELECT_PATIENT: &str = "
    SELECT p.id AS id, p.name AS name, p.sex AS sex, p.age AS age,
           p.contact_number AS contact_number, p.cr_no AS cr_no, p.psy_no AS psy_no,
           p.assigned_room AS assigned_room, p.assigned_doctor_id AS assigned_doctor_id,
           u.name AS assigned_doctor_name, p.has_adl_file AS has_adl_file,
           p.is_active AS is_active, p.created_at AS created_at, p.updated_at AS updated_at
    FROM patients p
    LEFT JOIN users u ON u.id = p.assigned_doctor_id";

fn map_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: row.get("id")?,
        fields: PatientInput {
            name: row.get("name")?,
            sex: parse_column(row, "sex")?,
            age: row.get("age")?,
            contact_number: row.get("contact_number")?,
            cr_no: row.get("cr_no")?,
            psy_no: row.get("psy_no")?,
            assigned_room: row.get("assigned_room")?,
            assigned_doctor_id: row.get("assigned_doctor_id")?,
        },
        assigned_doctor_name: row.get("assigned_doctor_name")?,
        has_adl_file: row.get("has_adl_file")?,
        is_active: row.get("is_active")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub(crate) fn find(conn: &Connection, id: i64) -> RecordResult<Patient> {
    let sql = format!("{SELECT_PATIENT} WHERE p.id = ?1");
    optional_row(conn.query_row(&sql, [id], map_row))?
        .ok_or_else(|| RecordError::not_found("patient", id))
}

pub(crate) fn ensure_exists(conn: &Connection, id: i64) -> RecordResult<()> {
    if exists(conn, TABLE, id)? {
        Ok(())
    } else {
        Err(RecordError::not_found("patient", id))
    }
}

fn normalise(conn: &Connection, input: &PatientInput) -> RecordResult<PatientInput> {
    if let Some(doctor) = input.assigned_doctor_id {
        if !exists(conn, "users", doctor)? {
            return Err(RecordError::not_found("user", doctor));
        }
    }

    Ok(PatientInput {
        name: require_text("name", &input.name)?,
        sex: input.sex,
        age: validate_age(input.age)?,
        contact_number: optional_text(input.contact_number.as_deref()),
        cr_no: optional_text(input.cr_no.as_deref()),
        psy_no: optional_text(input.psy_no.as_deref()),
        assigned_room: optional_text(input.assigned_room.as_deref()),
        assigned_doctor_id: input.assigned_doctor_id,
    })
}

fn cr_no_taken(err: rusqlite::Error) -> RecordError {
    if is_unique_violation(&err) {
        RecordError::InvalidInput("a patient with this CR number already exists".into())
    } else {
        err.into()
    }
}

fn map_outpatient(row: &Row<'_>) -> rusqlite::Result<OutpatientRecord> {
    Ok(OutpatientRecord {
        patient_id: row.get("patient_id")?,
        fields: OutpatientInput {
            marital_status: row.get("marital_status")?,
            education: row.get("education")?,
            occupation: row.get("occupation")?,
            religion: row.get("religion")?,
            family_type: row.get("family_type")?,
            locality: row.get("locality")?,
            head_name: row.get("head_name")?,
            head_relationship: row.get("head_relationship")?,
            address: row.get("address")?,
            district: row.get("district")?,
            state: row.get("state")?,
            pin_code: row.get("pin_code")?,
            monthly_income: row.get("monthly_income")?,
            filled_by: row.get("filled_by")?,
        },
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

#[derive(Clone)]
pub struct PatientService {
    store: Store,
}

impl PatientService {
    pub fn new(db: Database, bus: ChangeBus) -> Self {
        Self {
            store: Store::new(db, bus),
        }
    }

    /// Lists active patients, newest first.
    ///
    /// `search` matches name, CR number or PSY number by substring.
    pub fn list(&self, page: &PageRequest, search: Option<&str>) -> RecordResult<Listing<Patient>> {
        let pattern = optional_text(search).map(|s| format!("%{s}%"));

        self.store.db.with_connection(|conn| {
            let filter = "p.is_active = 1
                AND (?1 IS NULL OR p.name LIKE ?1 OR p.cr_no LIKE ?1 OR p.psy_no LIKE ?1)";
            let total = count(
                conn,
                &format!("SELECT COUNT(*) FROM patients p WHERE {filter}"),
                params![pattern],
            )?;

            let sql = format!(
                "{SELECT_PATIENT} WHERE {filter} ORDER BY p.created_at DESC, p.id DESC LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(params![pattern, page.limit_i64(), page.offset()], map_row)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(Listing {
                items,
                pagination: page.pagination(total),
            })
        })
    }

    pub fn get(&self, id: i64) -> RecordResult<Patient> {
        self.store.db.with_connection(|conn| find(conn, id))
    }

    /// Registers a patient.
    ///
    /// # Errors
    ///
    /// - `RecordError::InvalidInput` for a blank name, an out-of-range age or a reused CR number.
    /// - `RecordError::NotFound` if the assigned doctor does not exist.
    pub fn create(&self, input: &PatientInput, actor: Option<i64>) -> RecordResult<Patient> {
        let patient = self.store.db.with_transaction(|tx| {
            let input = normalise(tx, input)?;
            let now = Utc::now();
            tx.execute(
                "INSERT INTO patients (name, sex, age, contact_number, cr_no, psy_no,
                     assigned_room, assigned_doctor_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    input.name,
                    input.sex.as_str(),
                    input.age,
                    input.contact_number,
                    input.cr_no,
                    input.psy_no,
                    input.assigned_room,
                    input.assigned_doctor_id,
                    now
                ],
            )
            .map_err(cr_no_taken)?;
            let id = tx.last_insert_rowid();
            audit::record(tx, TABLE, id, AuditAction::Create, actor, Some(&input.name))?;
            find(tx, id)
        })?;

        self.store.changed(ResourceKind::Patient, patient.id, AuditAction::Create);
        Ok(patient)
    }

    pub fn update(&self, id: i64, input: &PatientInput, actor: Option<i64>) -> RecordResult<Patient> {
        let patient = self.store.db.with_transaction(|tx| {
            let input = normalise(tx, input)?;
            let changed = tx
                .execute(
                    "UPDATE patients SET name = ?1, sex = ?2, age = ?3, contact_number = ?4,
                         cr_no = ?5, psy_no = ?6, assigned_room = ?7, assigned_doctor_id = ?8,
                         updated_at = ?9
                     WHERE id = ?10",
                    params![
                        input.name,
                        input.sex.as_str(),
                        input.age,
                        input.contact_number,
                        input.cr_no,
                        input.psy_no,
                        input.assigned_room,
                        input.assigned_doctor_id,
                        Utc::now(),
                        id
                    ],
                )
                .map_err(cr_no_taken)?;
            if changed == 0 {
                return Err(RecordError::not_found("patient", id));
            }
            audit::record(tx, TABLE, id, AuditAction::Update, actor, None)?;
            find(tx, id)
        })?;

        self.store.changed(ResourceKind::Patient, id, AuditAction::Update);
        Ok(patient)
    }

    /// Marks the patient inactive. The record and its clinical history are kept.
    pub fn deactivate(&self, id: i64, actor: Option<i64>) -> RecordResult<Patient> {
        let patient = self.store.db.with_transaction(|tx| {
            let changed = tx.execute(
                "UPDATE patients SET is_active = 0, updated_at = ?1 WHERE id = ?2",
                params![Utc::now(), id],
            )?;
            if changed == 0 {
                return Err(RecordError::not_found("patient", id));
            }
            audit::record(tx, TABLE, id, AuditAction::Delete, actor, Some("deactivated"))?;
            find(tx, id)
        })?;

        self.store.changed(ResourceKind::Patient, id, AuditAction::Delete);
        Ok(patient)
    }

    pub fn outpatient_record(&self, patient_id: i64) -> RecordResult<OutpatientRecord> {
        self.store.db.with_connection(|conn| {
            ensure_exists(conn, patient_id)?;
            optional_row(conn.query_row(
                "SELECT * FROM outpatient_record WHERE patient_id = ?1",
                [patient_id],
                map_outpatient,
            ))?
            .ok_or_else(|| RecordError::not_found("outpatient record for patient", patient_id))
        })
    }

    /// Creates or replaces the outpatient record of a patient.
    pub fn save_outpatient_record(
        &self,
        patient_id: i64,
        input: &OutpatientInput,
        actor: Option<i64>,
    ) -> RecordResult<OutpatientRecord> {
        let (record, action) = self.store.db.with_transaction(|tx| {
            ensure_exists(tx, patient_id)?;
            let existed: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM outpatient_record WHERE patient_id = ?1)",
                [patient_id],
                |row| row.get(0),
            )?;
            let filled_by = match input.filled_by {
                Some(user) if !exists(tx, "users", user)? => {
                    return Err(RecordError::not_found("user", user))
                }
                Some(user) => Some(user),
                None => known_user(tx, actor)?,
            };
            let text = |v: &Option<String>| optional_text(v.as_deref());
            let now = Utc::now();

            tx.execute(
                "INSERT INTO outpatient_record (patient_id, marital_status, education, occupation,
                     religion, family_type, locality, head_name, head_relationship, address,
                     district, state, pin_code, monthly_income, filled_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)
                 ON CONFLICT(patient_id) DO UPDATE SET
                     marital_status = excluded.marital_status,
                     education = excluded.education,
                     occupation = excluded.occupation,
                     religion = excluded.religion,
                     family_type = excluded.family_type,
                     locality = excluded.locality,
                     head_name = excluded.head_name,
                     head_relationship = excluded.head_relationship,
                     address = excluded.address,
                     district = excluded.district,
                     state = excluded.state,
                     pin_code = excluded.pin_code,
                     monthly_income = excluded.monthly_income,
                     filled_by = excluded.filled_by,
                     updated_at = excluded.updated_at",
                params![
                    patient_id,
                    text(&input.marital_status),
                    text(&input.education),
                    text(&input.occupation),
                    text(&input.religion),
                    text(&input.family_type),
                    text(&input.locality),
                    text(&input.head_name),
                    text(&input.head_relationship),
                    text(&input.address),
                    text(&input.district),
                    text(&input.state),
                    text(&input.pin_code),
                    text(&input.monthly_income),
                    filled_by,
                    now
                ],
            )?;

            let action = if existed {
                AuditAction::Update
            } else {
                AuditAction::Create
            };
            audit::record(tx, "outpatient_record", patient_id, action, actor, None)?;
            let record = tx.query_row(
                "SELECT * FROM outpatient_record WHERE patient_id = ?1",
                [patient_id],
                map_outpatient,
            )?;
            Ok((record, action))
        })?;

        self.store
            .changed(ResourceKind::OutpatientRecord, patient_id, action);
        Ok(record)
    }
}
