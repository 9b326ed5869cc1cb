//! In-process record access.
//!
//! Lets the aggregation and submission workflows run straight against the database, without
//! a server in between. Used by the command line tool and by tests that need real storage.

use api_shared::{
    BulkPrescriptionReq, BulkPrescriptionRes, ClinicalProforma, Patient, Prescription,
    ProformaInput, ProformaSaved,
};

use crate::aggregation::RecordSource;
use crate::constants::MAX_PAGE_LIMIT;
use crate::error::{RecordError, SourceError, SourceResult};
use crate::forms::ProformaSink;
use crate::prescribing::PrescriptionSink;
use crate::repositories::Listing;
use crate::validation::PageRequest;
use crate::Services;

impl From<RecordError> for SourceError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::NotFound(what) => SourceError::NotFound(what),
            other => SourceError::Transport(other.to_string()),
        }
    }
}

/// [`Services`] acting for one user.
#[derive(Clone)]
pub struct LocalSource {
    services: Services,
    actor: Option<i64>,
}

impl LocalSource {
    pub fn new(services: Services, actor: Option<i64>) -> Self {
        Self { services, actor }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Reads every page of a paged listing.
    fn all_pages<T>(
        mut fetch: impl FnMut(&PageRequest) -> Result<Listing<T>, RecordError>,
    ) -> SourceResult<Vec<T>> {
        let mut page = PageRequest {
            page: 1,
            limit: MAX_PAGE_LIMIT,
        };
        let mut items = Vec::new();
        loop {
            let listing = fetch(&page)?;
            let last = listing.items.is_empty() || page.page >= listing.pagination.pages;
            items.extend(listing.items);
            if last {
                return Ok(items);
            }
            page.page += 1;
        }
    }
}

impl RecordSource for LocalSource {
    async fn patient(&self, id: i64) -> SourceResult<Patient> {
        Ok(self.services.patients.get(id)?)
    }

    async fn proforma(&self, id: i64) -> SourceResult<ClinicalProforma> {
        Ok(self.services.proformas.get(id)?)
    }

    async fn proformas_for_patient(&self, patient_id: i64) -> SourceResult<Vec<ClinicalProforma>> {
        Self::all_pages(|page| self.services.proformas.list_for_patient(patient_id, page))
    }

    async fn prescriptions_for_proforma(&self, proforma_id: i64) -> SourceResult<Vec<Prescription>> {
        Self::all_pages(|page| {
            self.services
                .prescriptions
                .list_for_proforma(proforma_id, page)
        })
    }
}

impl PrescriptionSink for LocalSource {
    async fn create_bulk(&self, req: &BulkPrescriptionReq) -> SourceResult<BulkPrescriptionRes> {
        let prescriptions = self.services.prescriptions.create_bulk(req, self.actor)?;
        Ok(BulkPrescriptionRes {
            count: prescriptions.len(),
            prescriptions,
        })
    }
}

impl ProformaSink for LocalSource {
    async fn create_proforma(&self, input: &ProformaInput) -> SourceResult<ProformaSaved> {
        Ok(self.services.proformas.create(input, self.actor)?)
    }

    async fn update_proforma(&self, id: i64, input: &ProformaInput) -> SourceResult<ProformaSaved> {
        Ok(self.services.proformas.update(id, input, self.actor)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::{Aggregator, PatientRef};
    use crate::db::Database;
    use crate::events::ChangeBus;
    use crate::prescribing::submit_bulk_prescriptions;
    use api_shared::{PatientInput, PrescriptionInput, Sex, VisitType};
    use chrono::NaiveDate;

    fn source() -> LocalSource {
        let services = Services::new(Database::open_in_memory().unwrap(), ChangeBus::new());
        LocalSource::new(services, None)
    }

    fn patient_input(name: &str) -> PatientInput {
        PatientInput {
            name: name.into(),
            sex: Sex::Female,
            age: Some(34),
            contact_number: None,
            cr_no: None,
            psy_no: None,
            assigned_room: None,
            assigned_doctor_id: None,
        }
    }

    fn visit(patient_id: i64, date: &str) -> ProformaInput {
        ProformaInput {
            patient_id,
            visit_date: Some(date.parse::<NaiveDate>().unwrap()),
            visit_type: VisitType::FollowUp,
            ..ProformaInput::default()
        }
    }

    fn row(medicine: &str) -> PrescriptionInput {
        PrescriptionInput {
            medicine: medicine.into(),
            ..PrescriptionInput::default()
        }
    }

    #[tokio::test]
    async fn test_aggregates_against_real_storage() {
        let source = source();
        let patient = source
            .services()
            .patients
            .create(&patient_input("Meera"), None)
            .unwrap();
        let older = source
            .create_proforma(&visit(patient.id, "2024-01-05"))
            .await
            .unwrap();
        let newer = source
            .create_proforma(&visit(patient.id, "2024-01-10"))
            .await
            .unwrap();

        submit_bulk_prescriptions(&source, Some(older.proforma.id), &[row("Lithium")])
            .await
            .unwrap();
        submit_bulk_prescriptions(&source, Some(newer.proforma.id), &[row("Olanzapine")])
            .await
            .unwrap();

        let view = Aggregator::new(source)
            .aggregate(PatientRef::Patient(patient.id))
            .await
            .unwrap();

        let medicines: Vec<&str> = view
            .prescriptions
            .iter()
            .map(|p| p.prescription.item.medicine.as_str())
            .collect();
        assert_eq!(medicines, vec!["Olanzapine", "Lithium"]);
        assert_eq!(view.history.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_records_surface_as_not_found() {
        let source = source();
        assert!(matches!(
            source.patient(99).await,
            Err(SourceError::NotFound(_))
        ));
        assert!(matches!(
            source.prescriptions_for_proforma(99).await,
            Err(SourceError::NotFound(_))
        ));
    }
}
