//! A patient's visit history that stays current.
//!
//! [`LiveVisitHistory`] subscribes to patient, proforma and prescription changes on a client
//! bus and re-runs the aggregation whenever one arrives.

use opd_core::{
    AggregateError, Aggregator, ChangeBus, ChangeSubscription, PatientRecordView, PatientRef,
    RecordSource, ResourceKind,
};

/// Resource kinds whose changes can alter a patient's visit history.
pub const WATCHED_KINDS: &[ResourceKind] = &[
    ResourceKind::Patient,
    ResourceKind::ClinicalProforma,
    ResourceKind::Prescription,
];

pub struct LiveVisitHistory<S> {
    aggregator: Aggregator<S>,
    target: PatientRef,
    changes: ChangeSubscription,
    current: Option<PatientRecordView>,
}

impl<S: RecordSource> LiveVisitHistory<S> {
    /// Subscribes to `bus` immediately, so changes made before the first load are not missed.
    pub fn new(aggregator: Aggregator<S>, target: PatientRef, bus: &ChangeBus) -> Self {
        Self {
            aggregator,
            target,
            changes: bus.subscribe_to(WATCHED_KINDS),
            current: None,
        }
    }

    /// Latest successfully aggregated view.
    pub fn current(&self) -> Option<&PatientRecordView> {
        self.current.as_ref()
    }

    /// Re-aggregates now. On failure the previous view is kept.
    pub async fn refresh(&mut self) -> Result<&PatientRecordView, AggregateError> {
        let view = self.aggregator.aggregate(self.target).await?;
        Ok(self.current.insert(view))
    }

    /// Waits for the next relevant change, drains any that queued up behind it, then
    /// re-aggregates once.
    ///
    /// Returns `None` when the bus is gone.
    pub async fn next_update(&mut self) -> Option<Result<&PatientRecordView, AggregateError>> {
        let event = self.changes.recv().await?;
        let mut coalesced = 0usize;
        while self.changes.try_recv().is_some() {
            coalesced += 1;
        }
        tracing::debug!(kind = ?event.kind, coalesced, "visit history refresh");
        Some(self.refresh().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_shared::{
        AuditAction, ClinicalProforma, Patient, PatientInput, Prescription, PrescriptionInput,
        ProformaInput, Sex,
    };
    use chrono::{NaiveDate, TimeZone, Utc};
    use opd_core::{ChangeEvent, SourceError, SourceResult};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Ward {
        prescriptions: Mutex<Vec<Prescription>>,
    }

    fn patient() -> Patient {
        Patient {
            id: 1,
            fields: PatientInput {
                name: "Asha".into(),
                sex: Sex::Female,
                age: Some(30),
                contact_number: None,
                cr_no: None,
                psy_no: None,
                assigned_room: None,
                assigned_doctor_id: None,
            },
            assigned_doctor_name: None,
            has_adl_file: false,
            is_active: true,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
        }
    }

    fn proforma() -> ClinicalProforma {
        ClinicalProforma {
            id: 5,
            fields: ProformaInput {
                patient_id: 1,
                visit_date: NaiveDate::from_ymd_opt(2024, 1, 10),
                ..ProformaInput::default()
            },
            adl_file_id: None,
            patient_name: Some("Asha".into()),
            doctor_name: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap(),
        }
    }

    impl RecordSource for &Ward {
        async fn patient(&self, id: i64) -> SourceResult<Patient> {
            if id == 1 {
                Ok(patient())
            } else {
                Err(SourceError::NotFound(format!("patient {id}")))
            }
        }

        async fn proforma(&self, _id: i64) -> SourceResult<ClinicalProforma> {
            Ok(proforma())
        }

        async fn proformas_for_patient(&self, _patient_id: i64) -> SourceResult<Vec<ClinicalProforma>> {
            Ok(vec![proforma()])
        }

        async fn prescriptions_for_proforma(&self, _proforma_id: i64) -> SourceResult<Vec<Prescription>> {
            Ok(self.prescriptions.lock().unwrap().clone())
        }
    }

    fn prescription(id: i64, medicine: &str) -> Prescription {
        Prescription {
            id,
            clinical_proforma_id: 5,
            item: PrescriptionInput {
                medicine: medicine.into(),
                ..PrescriptionInput::default()
            },
            created_at: Utc.with_ymd_and_hms(2024, 1, 10, 9, 30, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 1, 10, 9, 30, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_reaggregates_on_prescription_change() {
        let ward = Ward::default();
        let bus = ChangeBus::new();
        let mut live = LiveVisitHistory::new(Aggregator::new(&ward), PatientRef::Patient(1), &bus);

        let view = live.refresh().await.unwrap();
        assert!(view.prescriptions.is_empty());

        ward.prescriptions
            .lock()
            .unwrap()
            .push(prescription(1, "Lithium"));
        bus.publish(ChangeEvent::new(ResourceKind::Prescription, Some(1), AuditAction::Create));
        bus.publish(ChangeEvent::new(ResourceKind::Prescription, Some(1), AuditAction::Update));

        let view = live.next_update().await.unwrap().unwrap();
        assert_eq!(view.prescriptions.len(), 1);
        assert_eq!(view.history.keys().collect::<Vec<_>>(), vec!["10 Jan 2024"]);
        assert_eq!(live.current().unwrap().prescriptions.len(), 1);
    }

    #[tokio::test]
    async fn test_ignores_unrelated_kinds_and_ends_with_bus() {
        let ward = Ward::default();
        let bus = ChangeBus::new();
        let mut live = LiveVisitHistory::new(Aggregator::new(&ward), PatientRef::Patient(1), &bus);

        bus.publish(ChangeEvent::new(ResourceKind::ClinicalOption, None, AuditAction::Create));
        drop(bus);

        assert!(live.next_update().await.is_none());
        assert!(live.current().is_none());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_view() {
        let ward = Ward::default();
        let bus = ChangeBus::new();
        let mut live = LiveVisitHistory::new(Aggregator::new(&ward), PatientRef::Patient(1), &bus);
        live.refresh().await.unwrap();

        live.target = PatientRef::Patient(2);
        assert!(live.refresh().await.is_err());
        assert_eq!(live.current().unwrap().patient.id, 1);
    }
}
