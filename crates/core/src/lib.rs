//! # OPD Core
//!
//! Core business logic for the OPD clinical records system.
//!
//! This crate contains the data operations and the client-side workflows built on them:
//! - SQLite persistence and the resource services (`db`, `repositories`)
//! - Change notification between stores and views (`events`)
//! - Patient record aggregation across resources (`aggregation`)
//! - Clinical proforma form state and checklist vocabularies (`forms`)
//! - Bulk prescription entry with local drafts (`prescribing`, `drafts`)
//! - Role-based section visibility (`access`)
//! - In-process record access for the workflows (`local`)
//!
//! **No API concerns**: HTTP servers and clients belong in `api-rest` and `opd-client`.

pub mod access;
pub mod aggregation;
pub mod config;
pub mod constants;
pub mod db;
pub mod drafts;
pub mod error;
pub mod events;
pub mod forms;
pub mod local;
pub mod prescribing;
pub mod repositories;
pub mod validation;

pub use access::{can_view, require_role, require_view, Section};
pub use aggregation::{
    Aggregator, PatientRecordView, PatientRef, RecordSource, VisitGroup, VisitHistory,
    VisitPrescription,
};
pub use config::CoreConfig;
pub use db::Database;
pub use drafts::{DraftError, FileStore, KeyedStore, MemoryStore};
pub use error::{
    AggregateError, RecordError, RecordResult, SourceError, SourceResult, WorkflowError,
    WorkflowResult,
};
pub use events::{ChangeBus, ChangeEvent, ChangeSubscription, ResourceKind};
pub use forms::{submit_proforma, ChecklistField, FormErrors, OptionSet, ProformaForm, ProformaSink};
pub use local::LocalSource;
pub use prescribing::{
    filter_rows, resolve_target_proforma, submit_bulk_prescriptions, PrescriptionDrafts,
    PrescriptionSink,
};
pub use repositories::{
    AdlFileService, AuditService, ClinicalOptionService, Listing, PatientService,
    PrescriptionService, ProformaService, UserService,
};
pub use validation::PageRequest;

/// Every resource service over one database and one change bus.
#[derive(Clone)]
pub struct Services {
    pub users: UserService,
    pub patients: PatientService,
    pub proformas: ProformaService,
    pub prescriptions: PrescriptionService,
    pub adl_files: AdlFileService,
    pub options: ClinicalOptionService,
    pub audit: AuditService,
    bus: ChangeBus,
}

impl Services {
    pub fn new(db: Database, bus: ChangeBus) -> Self {
        Self {
            users: UserService::new(db.clone(), bus.clone()),
            patients: PatientService::new(db.clone(), bus.clone()),
            proformas: ProformaService::new(db.clone(), bus.clone()),
            prescriptions: PrescriptionService::new(db.clone(), bus.clone()),
            adl_files: AdlFileService::new(db.clone(), bus.clone()),
            options: ClinicalOptionService::new(db.clone(), bus.clone()),
            audit: AuditService::new(db),
            bus,
        }
    }

    /// Opens the configured database and builds the services on a fresh change bus.
    ///
    /// # Errors
    ///
    /// Returns `RecordError` if the database cannot be opened or migrated.
    pub fn open(cfg: &CoreConfig) -> RecordResult<Self> {
        let db = Database::open(cfg.database_path())?;
        Ok(Self::new(db, ChangeBus::new()))
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_database_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("nested").join("opd.sqlite3");
        let cfg = CoreConfig::new(path.clone(), None).expect("config should be valid");

        let services = Services::open(&cfg).expect("open should succeed");

        assert!(path.exists());
        let options = services
            .options
            .list(ChecklistField::Mood)
            .expect("options should load");
        assert!(!options.labels().is_empty());
    }

    #[test]
    fn test_reopening_keeps_data() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = CoreConfig::new(temp_dir.path().join("opd.sqlite3"), None).unwrap();

        let first = Services::open(&cfg).unwrap();
        first.options.add(ChecklistField::Fits, "Pseudoseizure").unwrap();
        drop(first);

        let second = Services::open(&cfg).unwrap();
        assert!(second
            .options
            .list(ChecklistField::Fits)
            .unwrap()
            .contains("Pseudoseizure"));
    }
}
