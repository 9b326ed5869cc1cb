//! Bulk prescription entry.
//!
//! A clinician fills any number of medication rows; only well-formed rows are sent, in one
//! request, attached to a single clinical proforma. Unsent rows can be kept in a
//! [`KeyedStore`] per patient until the submission succeeds.

use api_shared::{BulkPrescriptionReq, BulkPrescriptionRes, ClinicalProforma, PrescriptionInput};
use chrono::NaiveDate;
use std::future::Future;
use tracing::{info, warn};

use crate::constants::PRESCRIPTION_DRAFT_KEY_PREFIX;
use crate::drafts::{DraftResult, KeyedStore};
use crate::error::{SourceResult, WorkflowError, WorkflowResult};

/// Write side for prescriptions, implemented by the HTTP client.
pub trait PrescriptionSink {
    fn create_bulk(
        &self,
        req: &BulkPrescriptionReq,
    ) -> impl Future<Output = SourceResult<BulkPrescriptionRes>> + Send;
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Keeps the rows worth sending.
///
/// A row with blank medicine, dosage, frequency and details is an untouched row and is
/// dropped. Of the rest, rows without a medicine name are dropped too.
pub fn filter_rows(rows: &[PrescriptionInput]) -> Vec<PrescriptionInput> {
    rows.iter()
        .filter(|r| {
            !(is_blank(&r.medicine)
                && is_blank(&r.dosage)
                && is_blank(&r.frequency)
                && is_blank(&r.details))
        })
        .filter(|r| !is_blank(&r.medicine))
        .cloned()
        .collect()
}

fn proforma_date(p: &ClinicalProforma) -> NaiveDate {
    p.fields
        .visit_date
        .unwrap_or_else(|| p.created_at.date_naive())
}

/// Picks the proforma new prescriptions attach to.
///
/// In order: the explicit id, a proforma dated `today` (visit date, else creation date),
/// then the most recent proforma (latest date, ties broken by the larger id).
pub fn resolve_target_proforma(
    explicit: Option<i64>,
    proformas: &[ClinicalProforma],
    today: NaiveDate,
) -> Option<i64> {
    if explicit.is_some() {
        return explicit;
    }

    if let Some(p) = proformas.iter().find(|p| proforma_date(p) == today) {
        return Some(p.id);
    }

    proformas
        .iter()
        .max_by_key(|p| (proforma_date(p), p.id))
        .map(|p| p.id)
}

/// Filters `rows` and sends them as one bulk request.
///
/// # Errors
///
/// - `WorkflowError::NoPrescriptions` if no row survives filtering.
/// - `WorkflowError::MissingPrerequisite` if there is no proforma to attach to.
/// - `WorkflowError::Source` if the request fails.
///
/// The first two are raised before any request is made.
pub async fn submit_bulk_prescriptions<S: PrescriptionSink>(
    sink: &S,
    clinical_proforma_id: Option<i64>,
    rows: &[PrescriptionInput],
) -> WorkflowResult<BulkPrescriptionRes> {
    let prescriptions = filter_rows(rows);
    if prescriptions.is_empty() {
        return Err(WorkflowError::NoPrescriptions);
    }

    let clinical_proforma_id = clinical_proforma_id.ok_or_else(|| {
        WorkflowError::MissingPrerequisite(
            "No clinical proforma found for this patient. Please create a clinical proforma first."
                .into(),
        )
    })?;

    let req = BulkPrescriptionReq {
        clinical_proforma_id,
        prescriptions,
    };
    let res = sink.create_bulk(&req).await?;

    info!(
        clinical_proforma_id,
        count = res.count,
        "prescriptions submitted"
    );
    Ok(res)
}

/// Per-patient prescription rows that have not been submitted yet.
pub struct PrescriptionDrafts<K> {
    store: K,
}

impl<K: KeyedStore> PrescriptionDrafts<K> {
    pub fn new(store: K) -> Self {
        Self { store }
    }

    pub fn key(patient_id: i64) -> String {
        format!("{PRESCRIPTION_DRAFT_KEY_PREFIX}{patient_id}")
    }

    /// Loads the saved rows. A draft that no longer decodes is discarded.
    pub fn load(&self, patient_id: i64) -> DraftResult<Vec<PrescriptionInput>> {
        let key = Self::key(patient_id);
        let Some(raw) = self.store.load(&key)? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str(&raw) {
            Ok(rows) => Ok(rows),
            Err(e) => {
                warn!(patient_id, error = %e, "discarding unreadable prescription draft");
                self.store.remove(&key)?;
                Ok(Vec::new())
            }
        }
    }

    pub fn save(&self, patient_id: i64, rows: &[PrescriptionInput]) -> DraftResult<()> {
        let raw = serde_json::to_string(rows)?;
        self.store.save(&Self::key(patient_id), &raw)
    }

    pub fn clear(&self, patient_id: i64) -> DraftResult<()> {
        self.store.remove(&Self::key(patient_id))
    }

    /// Saves `rows` as the patient's draft, submits them, and clears the draft on success.
    /// On failure the draft is left in place for a retry.
    pub async fn submit<S: PrescriptionSink>(
        &self,
        sink: &S,
        patient_id: i64,
        clinical_proforma_id: Option<i64>,
        rows: &[PrescriptionInput],
    ) -> WorkflowResult<BulkPrescriptionRes> {
        self.save(patient_id, rows)
            .map_err(|e| WorkflowError::Drafts(e.to_string()))?;

        let res = submit_bulk_prescriptions(sink, clinical_proforma_id, rows).await?;

        self.clear(patient_id)
            .map_err(|e| WorkflowError::Drafts(e.to_string()))?;
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drafts::MemoryStore;
    use crate::error::SourceError;
    use api_shared::{Prescription, ProformaInput};
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<BulkPrescriptionReq>>,
        fail: bool,
    }

    impl PrescriptionSink for RecordingSink {
        async fn create_bulk(&self, req: &BulkPrescriptionReq) -> SourceResult<BulkPrescriptionRes> {
            self.sent.lock().unwrap().push(req.clone());
            if self.fail {
                return Err(SourceError::Status {
                    status: 500,
                    message: "Failed to create prescriptions".into(),
                });
            }
            let prescriptions: Vec<Prescription> = req
                .prescriptions
                .iter()
                .enumerate()
                .map(|(i, item)| Prescription {
                    id: i as i64 + 1,
                    clinical_proforma_id: req.clinical_proforma_id,
                    item: item.clone(),
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                })
                .collect();
            Ok(BulkPrescriptionRes {
                count: prescriptions.len(),
                prescriptions,
            })
        }
    }

    fn row(medicine: &str, dosage: &str) -> PrescriptionInput {
        PrescriptionInput {
            medicine: medicine.into(),
            dosage: dosage.into(),
            ..PrescriptionInput::default()
        }
    }

    fn proforma(id: i64, visit_date: Option<NaiveDate>) -> ClinicalProforma {
        ClinicalProforma {
            id,
            fields: ProformaInput {
                patient_id: 1,
                visit_date,
                ..ProformaInput::default()
            },
            adl_file_id: None,
            patient_name: None,
            doctor_name: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
            updated_at: Utc::now(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_filter_keeps_only_rows_with_medicine() {
        let rows = [row("", "1-0-1"), row("Paracetamol", "")];
        let kept = filter_rows(&rows);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].medicine, "Paracetamol");
    }

    #[test]
    fn test_filter_drops_untouched_rows() {
        let rows = [
            PrescriptionInput::default(),
            PrescriptionInput {
                when_to_take: "Morning".into(),
                ..PrescriptionInput::default()
            },
        ];
        assert!(filter_rows(&rows).is_empty());
    }

    #[tokio::test]
    async fn test_all_empty_rows_never_reach_the_sink() {
        let sink = RecordingSink::default();

        let err = submit_bulk_prescriptions(&sink, Some(5), &[row("", ""), row(" ", "")])
            .await
            .unwrap_err();

        assert_eq!(err, WorkflowError::NoPrescriptions);
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_proforma_is_rejected_before_sending() {
        let sink = RecordingSink::default();

        let err = submit_bulk_prescriptions(&sink, None, &[row("Sertraline", "50mg")])
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::MissingPrerequisite(msg) if msg.contains("create a clinical proforma first")));
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_surviving_rows_sent_in_one_request() {
        let sink = RecordingSink::default();
        let rows = [row("", "1-0-1"), row("Paracetamol", ""), row("Sertraline", "50mg")];

        let res = submit_bulk_prescriptions(&sink, Some(5), &rows).await.unwrap();

        assert_eq!(res.count, 2);
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].clinical_proforma_id, 5);
        assert_eq!(sent[0].prescriptions[0].medicine, "Paracetamol");
    }

    #[test]
    fn test_explicit_proforma_wins() {
        let proformas = [proforma(1, Some(day(10)))];
        assert_eq!(resolve_target_proforma(Some(9), &proformas, day(10)), Some(9));
    }

    #[test]
    fn test_todays_proforma_beats_higher_id() {
        let proformas = [proforma(3, Some(day(10))), proforma(8, Some(day(2)))];
        assert_eq!(resolve_target_proforma(None, &proformas, day(10)), Some(3));
    }

    #[test]
    fn test_falls_back_to_most_recent_visit() {
        let proformas = [
            proforma(3, Some(day(5))),
            proforma(8, Some(day(2))),
            proforma(4, Some(day(5))),
        ];
        assert_eq!(resolve_target_proforma(None, &proformas, day(20)), Some(4));
    }

    #[test]
    fn test_undated_proforma_matches_today_by_creation_date() {
        let proformas = [proforma(2, Some(day(1))), proforma(7, None)];
        let created = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(resolve_target_proforma(None, &proformas, created), Some(7));
    }

    #[test]
    fn test_no_proformas_resolves_to_none() {
        assert_eq!(resolve_target_proforma(None, &[], day(1)), None);
    }

    #[tokio::test]
    async fn test_draft_cleared_after_success() {
        let drafts = PrescriptionDrafts::new(MemoryStore::new());
        let sink = RecordingSink::default();

        drafts
            .submit(&sink, 7, Some(5), &[row("Lithium", "300mg")])
            .await
            .unwrap();

        assert!(drafts.load(7).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_draft_kept_after_failure() {
        let drafts = PrescriptionDrafts::new(MemoryStore::new());
        let sink = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };

        let err = drafts
            .submit(&sink, 7, Some(5), &[row("Lithium", "300mg")])
            .await
            .unwrap_err();

        assert_eq!(err.user_message(), "Failed to create prescriptions");
        let kept = drafts.load(7).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].medicine, "Lithium");
    }

    #[test]
    fn test_unreadable_draft_is_discarded() {
        let store = MemoryStore::new();
        store.save(&PrescriptionDrafts::<MemoryStore>::key(3), "not json").unwrap();
        let drafts = PrescriptionDrafts::new(store);

        assert!(drafts.load(3).unwrap().is_empty());
    }
}
