//! Clinical proformas: one psychiatric assessment per visit.
//!
//! Saving a proforma also drives the ADL workflow:
//! - a complex case always requires an ADL file, and one is opened and linked if the
//!   proforma has none;
//! - a new visit for a patient with an active file is counted on that file.

use api_shared::{
    AdlFile, AuditAction, ClinicalProforma, DoctorDecision, ProformaInput, ProformaSaved,
};
use chrono::Utc;
use opd_types::MultiSelect;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

use super::{adl_files, audit, count, exists, known_user, patients, Listing, Store};
use crate::db::{optional_row, parse_column, parse_optional_column, sql_value, Database};
use crate::events::{ChangeBus, ChangeEvent, ResourceKind};
use crate::forms::{checklist, ChecklistField};
use crate::validation::{optional_text, PageRequest};
use crate::{RecordError, RecordResult};

const TABLE: &str = "clinical_proforma";

const SELECT_PROFORMA: &str = "
    SELECT cp.*, pt.name AS patient_name, u.name AS doctor_name
    FROM clinical_proforma cp
    JOIN patients pt ON pt.id = cp.patient_id
    LEFT JOIN users u ON u.id = cp.filled_by";

fn multi(row: &Row<'_>, column: &str) -> rusqlite::Result<MultiSelect> {
    let raw: Option<String> = row.get(column)?;
    Ok(raw.map(|r| MultiSelect::from_stored(&r)).unwrap_or_default())
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<ClinicalProforma> {
    let fields = ProformaInput {
        patient_id: row.get("patient_id")?,
        filled_by: row.get("filled_by")?,
        visit_date: row.get("visit_date")?,
        visit_type: parse_column(row, "visit_type")?,
        room_no: row.get("room_no")?,
        informant_present: row.get("informant_present")?,
        nature_of_information: row.get("nature_of_information")?,
        onset_duration: row.get("onset_duration")?,
        course: row.get("course")?,
        precipitating_factor: row.get("precipitating_factor")?,
        illness_duration: row.get("illness_duration")?,
        current_episode_since: row.get("current_episode_since")?,
        mood: multi(row, "mood")?,
        behaviour: multi(row, "behaviour")?,
        speech: multi(row, "speech")?,
        thought: multi(row, "thought")?,
        perception: multi(row, "perception")?,
        somatic: multi(row, "somatic")?,
        bio_functions: multi(row, "bio_functions")?,
        adjustment: multi(row, "adjustment")?,
        cognitive_function: multi(row, "cognitive_function")?,
        fits: multi(row, "fits")?,
        sexual_problem: multi(row, "sexual_problem")?,
        substance_use: multi(row, "substance_use")?,
        associated_medical_surgical: multi(row, "associated_medical_surgical")?,
        mse_behaviour: multi(row, "mse_behaviour")?,
        mse_affect: multi(row, "mse_affect")?,
        mse_thought: multi(row, "mse_thought")?,
        mse_perception: multi(row, "mse_perception")?,
        mse_cognitive_function: multi(row, "mse_cognitive_function")?,
        history_narrative: row.get("history_narrative")?,
        past_history: row.get("past_history")?,
        family_history: row.get("family_history")?,
        gpe: row.get("gpe")?,
        mse_insight: row.get("mse_insight")?,
        mse_judgement: row.get("mse_judgement")?,
        diagnosis: row.get("diagnosis")?,
        icd_code: row.get("icd_code")?,
        case_severity: parse_optional_column(row, "case_severity")?,
        doctor_decision: parse_optional_column(row, "doctor_decision")?,
        requires_adl_file: row.get("requires_adl_file")?,
        adl_reasoning: row.get("adl_reasoning")?,
        treatment_prescribed: row.get("treatment_prescribed")?,
        disposal: row.get("disposal")?,
        referred_to: row.get("referred_to")?,
    };

    Ok(ClinicalProforma {
        id: row.get("id")?,
        fields,
        adl_file_id: row.get("adl_file_id")?,
        patient_name: row.get("patient_name")?,
        doctor_name: row.get("doctor_name")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub(crate) fn find(conn: &Connection, id: i64) -> RecordResult<ClinicalProforma> {
    let sql = format!("{SELECT_PROFORMA} WHERE cp.id = ?1");
    optional_row(conn.query_row(&sql, [id], map_row))?
        .ok_or_else(|| RecordError::not_found("clinical proforma", id))
}

pub(crate) fn ensure_exists(conn: &Connection, id: i64) -> RecordResult<()> {
    if exists(conn, TABLE, id)? {
        Ok(())
    } else {
        Err(RecordError::not_found("clinical proforma", id))
    }
}

/// Writable columns and their values, in a fixed order.
fn columns(input: &ProformaInput) -> Vec<(&'static str, Value)> {
    let text = |v: &Option<String>| sql_value(optional_text(v.as_deref()));

    let mut cols = vec![
        ("patient_id", sql_value(input.patient_id)),
        ("filled_by", sql_value(input.filled_by)),
        ("visit_date", sql_value(input.visit_date)),
        ("visit_type", sql_value(input.visit_type.as_str())),
        ("room_no", text(&input.room_no)),
        ("informant_present", sql_value(input.informant_present)),
        ("nature_of_information", text(&input.nature_of_information)),
        ("onset_duration", text(&input.onset_duration)),
        ("course", text(&input.course)),
        ("precipitating_factor", text(&input.precipitating_factor)),
        ("illness_duration", text(&input.illness_duration)),
        ("current_episode_since", text(&input.current_episode_since)),
    ];

    for field in ChecklistField::ALL {
        let selected = checklist(input, field);
        let stored = (!selected.is_empty()).then(|| selected.to_stored());
        cols.push((field.as_str(), sql_value(stored)));
    }

    cols.extend([
        ("history_narrative", text(&input.history_narrative)),
        ("past_history", text(&input.past_history)),
        ("family_history", text(&input.family_history)),
        ("gpe", text(&input.gpe)),
        ("mse_insight", text(&input.mse_insight)),
        ("mse_judgement", text(&input.mse_judgement)),
        ("diagnosis", text(&input.diagnosis)),
        ("icd_code", text(&input.icd_code)),
        ("case_severity", sql_value(input.case_severity.map(|s| s.as_str()))),
        ("doctor_decision", sql_value(input.doctor_decision.map(|d| d.as_str()))),
        ("requires_adl_file", sql_value(input.requires_adl_file)),
        ("adl_reasoning", text(&input.adl_reasoning)),
        ("treatment_prescribed", text(&input.treatment_prescribed)),
        ("disposal", text(&input.disposal)),
        ("referred_to", text(&input.referred_to)),
    ]);
    cols
}

fn is_complex(input: &ProformaInput) -> bool {
    input.doctor_decision == Some(DoctorDecision::ComplexCase)
}

/// Checks references and applies the complex-case rule.
fn prepare(conn: &Connection, input: &ProformaInput) -> RecordResult<ProformaInput> {
    patients::ensure_exists(conn, input.patient_id)?;
    if let Some(user) = input.filled_by {
        if !exists(conn, "users", user)? {
            return Err(RecordError::not_found("user", user));
        }
    }

    let mut input = input.clone();
    if is_complex(&input) {
        input.requires_adl_file = true;
    }
    Ok(input)
}

/// Gives a complex-case proforma without a file the patient's active file, or a new one.
///
/// Returns the proforma as stored afterwards and the file if one was opened.
fn ensure_adl_file(
    conn: &Connection,
    proforma: ClinicalProforma,
    actor: Option<i64>,
) -> RecordResult<(ClinicalProforma, Option<AdlFile>)> {
    if !is_complex(&proforma.fields) || proforma.adl_file_id.is_some() {
        return Ok((proforma, None));
    }

    let opened = match adl_files::active_for_patient(conn, proforma.fields.patient_id)? {
        Some(file) => {
            conn.execute(
                "UPDATE clinical_proforma SET adl_file_id = ?1 WHERE id = ?2",
                params![file.id, proforma.id],
            )?;
            adl_files::link_proforma(conn, file.id, proforma.id)?;
            None
        }
        None => Some(adl_files::create_for_proforma(
            conn,
            proforma.fields.patient_id,
            proforma.id,
            actor,
        )?),
    };
    Ok((find(conn, proforma.id)?, opened))
}

#[derive(Clone)]
pub struct ProformaService {
    store: Store,
}

impl ProformaService {
    pub fn new(db: Database, bus: ChangeBus) -> Self {
        Self {
            store: Store::new(db, bus),
        }
    }

    pub fn list(&self, page: &PageRequest) -> RecordResult<Listing<ClinicalProforma>> {
        self.store.db.with_connection(|conn| {
            let total = count(conn, "SELECT COUNT(*) FROM clinical_proforma", [])?;
            let sql = format!(
                "{SELECT_PROFORMA} ORDER BY cp.visit_date DESC, cp.id DESC LIMIT ?1 OFFSET ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(params![page.limit_i64(), page.offset()], map_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Listing {
                items,
                pagination: page.pagination(total),
            })
        })
    }

    /// Proformas of one patient, latest visit first.
    pub fn list_for_patient(
        &self,
        patient_id: i64,
        page: &PageRequest,
    ) -> RecordResult<Listing<ClinicalProforma>> {
        self.store.db.with_connection(|conn| {
            patients::ensure_exists(conn, patient_id)?;
            let total = count(
                conn,
                "SELECT COUNT(*) FROM clinical_proforma WHERE patient_id = ?1",
                [patient_id],
            )?;
            let sql = format!(
                "{SELECT_PROFORMA} WHERE cp.patient_id = ?1
                 ORDER BY cp.visit_date DESC, cp.id DESC LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(params![patient_id, page.limit_i64(), page.offset()], map_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Listing {
                items,
                pagination: page.pagination(total),
            })
        })
    }

    pub fn get(&self, id: i64) -> RecordResult<ClinicalProforma> {
        self.store.db.with_connection(|conn| find(conn, id))
    }

    /// Records a visit.
    ///
    /// # Errors
    ///
    /// `RecordError::NotFound` if the patient or the filling user does not exist.
    pub fn create(&self, input: &ProformaInput, actor: Option<i64>) -> RecordResult<ProformaSaved> {
        let saved = self.store.db.with_transaction(|tx| {
            let mut input = prepare(tx, input)?;
            if input.filled_by.is_none() {
                input.filled_by = known_user(tx, actor)?;
            }

            // Count the visit on a file the patient already has.
            if let Some(file) = adl_files::active_for_patient(tx, input.patient_id)? {
                adl_files::record_visit(tx, file.id, actor)?;
            }

            let mut cols = columns(&input);
            let now = Utc::now();
            cols.push(("created_at", sql_value(now)));
            cols.push(("updated_at", sql_value(now)));

            let names: Vec<&str> = cols.iter().map(|(name, _)| *name).collect();
            let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "INSERT INTO clinical_proforma ({}) VALUES ({})",
                names.join(", "),
                placeholders.join(", ")
            );
            tx.execute(&sql, params_from_iter(cols.into_iter().map(|(_, v)| v)))?;
            let id = tx.last_insert_rowid();
            audit::record(tx, TABLE, id, AuditAction::Create, actor, None)?;

            let (proforma, adl_file) = ensure_adl_file(tx, find(tx, id)?, actor)?;
            Ok(ProformaSaved { proforma, adl_file })
        })?;

        self.publish_saved(&saved, AuditAction::Create);
        Ok(saved)
    }

    /// Overwrites a proforma. Last write wins.
    pub fn update(
        &self,
        id: i64,
        input: &ProformaInput,
        actor: Option<i64>,
    ) -> RecordResult<ProformaSaved> {
        let saved = self.store.db.with_transaction(|tx| {
            let stored = find(tx, id)?;
            let mut input = prepare(tx, input)?;
            if input.filled_by.is_none() {
                input.filled_by = match stored.fields.filled_by {
                    Some(user) => Some(user),
                    None => known_user(tx, actor)?,
                };
            }

            let mut cols = columns(&input);
            cols.push(("updated_at", sql_value(Utc::now())));

            let assignments: Vec<String> = cols
                .iter()
                .enumerate()
                .map(|(i, (name, _))| format!("{name} = ?{}", i + 1))
                .collect();
            let sql = format!(
                "UPDATE clinical_proforma SET {} WHERE id = ?{}",
                assignments.join(", "),
                cols.len() + 1
            );
            let values = cols
                .into_iter()
                .map(|(_, v)| v)
                .chain(std::iter::once(Value::Integer(id)));
            tx.execute(&sql, params_from_iter(values))?;
            audit::record(tx, TABLE, id, AuditAction::Update, actor, None)?;

            let (proforma, adl_file) = ensure_adl_file(tx, find(tx, id)?, actor)?;
            Ok(ProformaSaved { proforma, adl_file })
        })?;

        self.publish_saved(&saved, AuditAction::Update);
        Ok(saved)
    }

    /// Deletes a proforma and its prescriptions. A linked ADL file is kept, unlinked.
    pub fn delete(&self, id: i64, actor: Option<i64>) -> RecordResult<()> {
        self.store.db.with_transaction(|tx| {
            let deleted = tx.execute("DELETE FROM clinical_proforma WHERE id = ?1", [id])?;
            if deleted == 0 {
                return Err(RecordError::not_found("clinical proforma", id));
            }
            audit::record(tx, TABLE, id, AuditAction::Delete, actor, None)
        })?;

        self.store
            .changed(ResourceKind::ClinicalProforma, id, AuditAction::Delete);
        // Its prescriptions went with it.
        self.store.bus.publish(ChangeEvent::new(
            ResourceKind::Prescription,
            None,
            AuditAction::Delete,
        ));
        Ok(())
    }

    fn publish_saved(&self, saved: &ProformaSaved, action: AuditAction) {
        self.store
            .changed(ResourceKind::ClinicalProforma, saved.proforma.id, action);
        if let Some(file) = &saved.adl_file {
            self.store
                .changed(ResourceKind::AdlFile, file.id, AuditAction::Create);
            self.store.changed(
                ResourceKind::Patient,
                saved.proforma.fields.patient_id,
                AuditAction::Update,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_shared::{AdlStatus, Patient, PatientInput, Role, Sex, UserInput, VisitType};
    use chrono::NaiveDate;
    use crate::repositories::{AdlFileService, PatientService, UserService};

    struct Fixture {
        db: Database,
        proformas: ProformaService,
        patients: PatientService,
        patient: Patient,
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let bus = ChangeBus::new();
        let patients = PatientService::new(db.clone(), bus.clone());
        let patient = patients
            .create(
                &PatientInput {
                    name: "Kiran Thakur".into(),
                    sex: Sex::Female,
                    age: Some(29),
                    contact_number: None,
                    cr_no: None,
                    psy_no: Some("PSY-77".into()),
                    assigned_room: None,
                    assigned_doctor_id: None,
                },
                None,
            )
            .unwrap();
        Fixture {
            proformas: ProformaService::new(db.clone(), bus),
            db,
            patients,
            patient,
        }
    }

    fn visit(patient_id: i64, day: u32) -> ProformaInput {
        ProformaInput {
            patient_id,
            visit_date: NaiveDate::from_ymd_opt(2024, 1, day),
            visit_type: VisitType::FollowUp,
            mood: MultiSelect::from_stored("Anxious, Sad"),
            diagnosis: Some(" Depressive episode ".into()),
            ..ProformaInput::default()
        }
    }

    fn prescription_count(db: &Database, proforma_id: i64) -> i64 {
        db.with_connection(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM prescriptions WHERE clinical_proforma_id = ?1",
                [proforma_id],
                |row| row.get(0),
            )?)
        })
        .unwrap()
    }

    #[test]
    fn test_create_round_trips_checklists() {
        let f = fixture();

        let saved = f.proformas.create(&visit(f.patient.id, 5), None).unwrap();

        let fetched = f.proformas.get(saved.proforma.id).unwrap();
        assert_eq!(fetched.fields.mood.to_stored(), "Anxious, Sad");
        assert!(fetched.fields.speech.is_empty());
        assert_eq!(fetched.fields.diagnosis.as_deref(), Some("Depressive episode"));
        assert_eq!(fetched.patient_name.as_deref(), Some("Kiran Thakur"));
        assert!(saved.adl_file.is_none());
    }

    #[test]
    fn test_unknown_patient_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.proformas.create(&visit(999, 5), None),
            Err(RecordError::NotFound(msg)) if msg == "patient 999"
        ));
    }

    #[test]
    fn test_complex_case_creates_and_links_one_adl_file() {
        let f = fixture();
        let mut input = visit(f.patient.id, 5);
        input.doctor_decision = Some(DoctorDecision::ComplexCase);
        input.adl_reasoning = Some("Treatment resistant".into());

        let saved = f.proformas.create(&input, None).unwrap();

        let file = saved.adl_file.expect("ADL file should be created");
        assert!(saved.proforma.fields.requires_adl_file);
        assert_eq!(saved.proforma.adl_file_id, Some(file.id));
        assert_eq!(file.clinical_proforma_id, Some(saved.proforma.id));
        assert_eq!(file.file_status, AdlStatus::Created);
        assert!(f.patients.get(f.patient.id).unwrap().has_adl_file);

        // Saving again must not open a second file.
        let again = f.proformas.update(saved.proforma.id, &input, None).unwrap();
        assert!(again.adl_file.is_none());
        let files = AdlFileService::new(f.db.clone(), ChangeBus::new())
            .for_patient(f.patient.id)
            .unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_second_complex_visit_reuses_active_file() {
        let f = fixture();
        let mut complex = visit(f.patient.id, 5);
        complex.doctor_decision = Some(DoctorDecision::ComplexCase);
        let first = f.proformas.create(&complex, None).unwrap();

        complex.visit_date = NaiveDate::from_ymd_opt(2024, 1, 10);
        let second = f.proformas.create(&complex, None).unwrap();

        assert!(second.adl_file.is_none());
        assert_eq!(second.proforma.adl_file_id, first.proforma.adl_file_id);
    }

    #[test]
    fn test_reused_file_points_back_at_latest_complex_visit() {
        let f = fixture();
        let mut complex = visit(f.patient.id, 5);
        complex.doctor_decision = Some(DoctorDecision::ComplexCase);
        let first = f.proformas.create(&complex, None).unwrap();
        let file_id = first.adl_file.unwrap().id;

        complex.visit_date = NaiveDate::from_ymd_opt(2024, 1, 10);
        let second = f.proformas.create(&complex, None).unwrap();

        let file = AdlFileService::new(f.db.clone(), ChangeBus::new())
            .get(file_id)
            .unwrap();
        assert_eq!(second.proforma.adl_file_id, Some(file_id));
        assert_eq!(file.clinical_proforma_id, Some(second.proforma.id));
    }

    #[test]
    fn test_update_without_filled_by_keeps_stored_author() {
        let f = fixture();
        let users = UserService::new(f.db.clone(), ChangeBus::new());
        let doctor = users
            .create(
                &UserInput {
                    name: "Dr Mehta".into(),
                    role: Role::Sr,
                    email: "mehta@opd.example".into(),
                    mobile: None,
                    is_active: true,
                },
                None,
            )
            .unwrap();
        let mut input = visit(f.patient.id, 5);
        input.filled_by = Some(doctor.id);
        let saved = f.proformas.create(&input, None).unwrap();

        let mut edit = saved.proforma.fields.clone();
        edit.filled_by = None;
        edit.diagnosis = Some("Recurrent depressive disorder".into());
        let updated = f.proformas.update(saved.proforma.id, &edit, None).unwrap();

        assert_eq!(updated.proforma.fields.filled_by, Some(doctor.id));
        assert_eq!(
            updated.proforma.fields.diagnosis.as_deref(),
            Some("Recurrent depressive disorder")
        );
    }

    #[test]
    fn test_update_to_complex_opens_file() {
        let f = fixture();
        let saved = f.proformas.create(&visit(f.patient.id, 5), None).unwrap();
        let mut input = saved.proforma.fields.clone();
        input.doctor_decision = Some(DoctorDecision::ComplexCase);

        let updated = f.proformas.update(saved.proforma.id, &input, None).unwrap();

        assert!(updated.adl_file.is_some());
        assert!(updated.proforma.fields.requires_adl_file);
    }

    #[test]
    fn test_follow_up_visit_counts_on_active_file() {
        let f = fixture();
        let mut complex = visit(f.patient.id, 5);
        complex.doctor_decision = Some(DoctorDecision::ComplexCase);
        let first = f.proformas.create(&complex, None).unwrap();
        let file_id = first.adl_file.unwrap().id;

        f.proformas.create(&visit(f.patient.id, 10), None).unwrap();

        let file = AdlFileService::new(f.db.clone(), ChangeBus::new())
            .get(file_id)
            .unwrap();
        assert_eq!(file.total_visits, 2);
        assert!(file.last_accessed_date.is_some());
    }

    #[test]
    fn test_delete_cascades_prescriptions_and_unlinks_file() {
        let f = fixture();
        let mut complex = visit(f.patient.id, 5);
        complex.doctor_decision = Some(DoctorDecision::ComplexCase);
        let saved = f.proformas.create(&complex, None).unwrap();
        let proforma_id = saved.proforma.id;
        f.db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO prescriptions (clinical_proforma_id, medicine, created_at, updated_at)
                 VALUES (?1, 'Olanzapine', ?2, ?2)",
                params![proforma_id, Utc::now()],
            )?;
            Ok(())
        })
        .unwrap();
        assert_eq!(prescription_count(&f.db, proforma_id), 1);

        f.proformas.delete(proforma_id, None).unwrap();

        assert_eq!(prescription_count(&f.db, proforma_id), 0);
        let file = AdlFileService::new(f.db.clone(), ChangeBus::new())
            .get(saved.adl_file.unwrap().id)
            .unwrap();
        assert_eq!(file.clinical_proforma_id, None);
        assert!(matches!(
            f.proformas.get(proforma_id),
            Err(RecordError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_for_patient_latest_first() {
        let f = fixture();
        f.proformas.create(&visit(f.patient.id, 5), None).unwrap();
        f.proformas.create(&visit(f.patient.id, 10), None).unwrap();

        let listing = f
            .proformas
            .list_for_patient(f.patient.id, &PageRequest::default())
            .unwrap();

        assert_eq!(listing.pagination.total, 2);
        assert_eq!(listing.items[0].fields.visit_date, NaiveDate::from_ymd_opt(2024, 1, 10));
    }
}
