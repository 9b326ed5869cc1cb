//! Patient record aggregation.
//!
//! The server exposes patients, proformas and prescriptions as separate resources. The
//! [`Aggregator`] joins them for one patient: it loads the patient and its proforma list,
//! then fetches the prescriptions of each proforma concurrently and flattens them into a
//! single list annotated with the originating visit.
//!
//! Only the first `cap` proformas (in list order) have their prescriptions fetched. The
//! remaining proformas stay in the view and are reported in
//! [`PatientRecordView::unqueried_proformas`].

use api_shared::{ClinicalProforma, Patient, Prescription, Role, VisitType};
use chrono::{DateTime, NaiveDate, Utc};
use futures_util::future::{join, join_all};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use tracing::{debug, warn};

use crate::access::{can_view, Section};
use crate::constants::{DEFAULT_PRESCRIPTION_CAP, UNKNOWN_DATE_KEY, VISIT_DATE_FORMAT};
use crate::error::{AggregateError, SourceResult};

/// Read side of the record store, as seen by the aggregator.
pub trait RecordSource: Sync {
    fn patient(&self, id: i64) -> impl Future<Output = SourceResult<Patient>> + Send;

    fn proforma(&self, id: i64) -> impl Future<Output = SourceResult<ClinicalProforma>> + Send;

    fn proformas_for_patient(
        &self,
        patient_id: i64,
    ) -> impl Future<Output = SourceResult<Vec<ClinicalProforma>>> + Send;

    fn prescriptions_for_proforma(
        &self,
        proforma_id: i64,
    ) -> impl Future<Output = SourceResult<Vec<Prescription>>> + Send;
}

/// What the caller knows about the patient to aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatientRef {
    Patient(i64),
    /// The patient is derived from this proforma.
    Proforma(i64),
}

/// A prescription together with the visit it was written at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitPrescription {
    pub prescription: Prescription,
    pub proforma_id: i64,
    pub visit_date: Option<NaiveDate>,
    pub visit_type: VisitType,
    pub recorded_at: Option<DateTime<Utc>>,
}

impl VisitPrescription {
    fn new(prescription: Prescription, proforma: &ClinicalProforma) -> Self {
        Self {
            prescription,
            proforma_id: proforma.id,
            visit_date: proforma.fields.visit_date,
            visit_type: proforma.fields.visit_type,
            recorded_at: Some(proforma.created_at),
        }
    }

    pub fn group_key(&self) -> String {
        visit_group_key(self.visit_date, self.recorded_at)
    }
}

/// Formats the history group key for a visit.
///
/// Uses the visit date, falling back to the creation time, then to [`UNKNOWN_DATE_KEY`].
pub fn visit_group_key(visit_date: Option<NaiveDate>, recorded_at: Option<DateTime<Utc>>) -> String {
    visit_date
        .or_else(|| recorded_at.map(|t| t.date_naive()))
        .map(|d| d.format(VISIT_DATE_FORMAT).to_string())
        .unwrap_or_else(|| UNKNOWN_DATE_KEY.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitGroup {
    pub key: String,
    pub entries: Vec<VisitPrescription>,
}

/// Prescriptions grouped by visit date, groups in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VisitHistory {
    groups: Vec<VisitGroup>,
}

impl VisitHistory {
    pub fn from_prescriptions(prescriptions: &[VisitPrescription]) -> Self {
        let mut groups: Vec<VisitGroup> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for entry in prescriptions {
            let key = entry.group_key();
            match index.get(&key) {
                Some(&i) => groups[i].entries.push(entry.clone()),
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push(VisitGroup {
                        key,
                        entries: vec![entry.clone()],
                    });
                }
            }
        }

        Self { groups }
    }

    pub fn groups(&self) -> &[VisitGroup] {
        &self.groups
    }

    pub fn get(&self, key: &str) -> Option<&VisitGroup> {
        self.groups.iter().find(|g| g.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Everything known about one patient, joined across resources.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientRecordView {
    pub patient: Patient,
    pub proformas: Vec<ClinicalProforma>,
    /// Sorted by visit date, newest first. Entries without a visit date come last.
    pub prescriptions: Vec<VisitPrescription>,
    pub history: VisitHistory,
    /// Proformas beyond the fan-out cap; their prescriptions were not fetched.
    pub unqueried_proformas: Vec<i64>,
    /// Proformas whose prescription query failed; shown as having none.
    pub failed_proformas: Vec<i64>,
}

impl PatientRecordView {
    /// Drops the sections `role` is not allowed to see.
    pub fn redacted_for(mut self, role: Role) -> Self {
        if !can_view(role, Section::ClinicalProforma) {
            self.proformas.clear();
            self.unqueried_proformas.clear();
            self.failed_proformas.clear();
        }
        if !can_view(role, Section::Prescription) {
            self.prescriptions.clear();
            self.history = VisitHistory::default();
        }
        self
    }
}

pub struct Aggregator<S> {
    source: S,
    cap: Option<usize>,
}

impl<S: RecordSource> Aggregator<S> {
    /// Creates an aggregator with the default fan-out cap.
    pub fn new(source: S) -> Self {
        Self {
            source,
            cap: Some(DEFAULT_PRESCRIPTION_CAP),
        }
    }

    /// Sets the number of proformas whose prescriptions are fetched. `None` fetches all.
    pub fn with_cap(mut self, cap: Option<usize>) -> Self {
        self.cap = cap;
        self
    }

    pub fn cap(&self) -> Option<usize> {
        self.cap
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Builds the record view for one patient.
    ///
    /// # Errors
    ///
    /// Returns `AggregateError` if the proforma used to identify the patient, the patient
    /// itself or the proforma list cannot be loaded. Failing prescription queries are not
    /// errors; they are listed in `failed_proformas`.
    pub async fn aggregate(&self, target: PatientRef) -> Result<PatientRecordView, AggregateError> {
        let patient_id = match target {
            PatientRef::Patient(id) => id,
            PatientRef::Proforma(id) => {
                self.source
                    .proforma(id)
                    .await
                    .map_err(|source| AggregateError::Proforma { id, source })?
                    .fields
                    .patient_id
            }
        };

        let (patient, proformas) = join(
            self.source.patient(patient_id),
            self.source.proformas_for_patient(patient_id),
        )
        .await;
        let patient = patient.map_err(|source| AggregateError::Patient {
            id: patient_id,
            source,
        })?;
        let proformas = proformas.map_err(|source| AggregateError::Proformas {
            patient_id,
            source,
        })?;

        let queried = self.cap.map_or(proformas.len(), |cap| cap.min(proformas.len()));
        let (to_query, beyond_cap) = proformas.split_at(queried);
        let unqueried_proformas: Vec<i64> = beyond_cap.iter().map(|p| p.id).collect();
        if !unqueried_proformas.is_empty() {
            debug!(
                patient_id,
                skipped = unqueried_proformas.len(),
                "proformas beyond prescription cap not queried"
            );
        }

        let results = join_all(
            to_query
                .iter()
                .map(|p| self.source.prescriptions_for_proforma(p.id)),
        )
        .await;

        let mut prescriptions = Vec::new();
        let mut failed_proformas = Vec::new();
        for (proforma, result) in to_query.iter().zip(results) {
            match result {
                Ok(items) => prescriptions.extend(
                    items
                        .into_iter()
                        .map(|rx| VisitPrescription::new(rx, proforma)),
                ),
                Err(e) => {
                    warn!(proforma_id = proforma.id, error = %e, "prescription query failed");
                    failed_proformas.push(proforma.id);
                }
            }
        }

        // Stable, so entries of one visit keep their server order.
        prescriptions.sort_by(|a, b| b.visit_date.cmp(&a.visit_date));
        let history = VisitHistory::from_prescriptions(&prescriptions);

        Ok(PatientRecordView {
            patient,
            proformas,
            prescriptions,
            history,
            unqueried_proformas,
            failed_proformas,
        })
    }
}
