//! Shared, field-scoped vocabulary for checklist fields.
//!
//! Adding a label that already exists is a no-op, so two users adding the same label at
//! once both succeed and the list still holds it once.

use api_shared::AuditAction;
use opd_types::MultiSelect;
use rusqlite::{params, Connection};

use super::Store;
use crate::db::Database;
use crate::events::{ChangeBus, ChangeEvent, ResourceKind};
use crate::forms::{ChecklistField, OptionSet};
use crate::validation::require_text;
use crate::{RecordError, RecordResult};

fn load(conn: &Connection, field: ChecklistField) -> RecordResult<OptionSet> {
    let mut stmt =
        conn.prepare("SELECT option_label FROM clinical_options WHERE field_name = ?1 ORDER BY id")?;
    let labels = stmt
        .query_map([field.as_str()], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(OptionSet::new(field, labels))
}

#[derive(Clone)]
pub struct ClinicalOptionService {
    store: Store,
}

impl ClinicalOptionService {
    pub fn new(db: Database, bus: ChangeBus) -> Self {
        Self {
            store: Store::new(db, bus),
        }
    }

    /// Labels of `field` in insertion order.
    pub fn list(&self, field: ChecklistField) -> RecordResult<OptionSet> {
        self.store.db.with_connection(|conn| load(conn, field))
    }

    /// Adds a label and returns the updated list.
    ///
    /// # Errors
    ///
    /// `RecordError::InvalidInput` if the label is blank or holds a comma, which would not
    /// survive being stored in a checklist.
    pub fn add(&self, field: ChecklistField, label: &str) -> RecordResult<OptionSet> {
        let label = require_text("label", label)?;
        if !MultiSelect::is_storable_label(&label) {
            return Err(RecordError::InvalidInput(format!(
                "label cannot contain a comma: {label}"
            )));
        }
        let (options, inserted) = self.store.db.with_transaction(|tx| {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO clinical_options (field_name, option_label) VALUES (?1, ?2)",
                params![field.as_str(), label],
            )?;
            Ok((load(tx, field)?, inserted > 0))
        })?;

        if inserted {
            tracing::info!(field = %field, label = %label, "clinical option added");
            self.store.bus.publish(ChangeEvent::new(
                ResourceKind::ClinicalOption,
                None,
                AuditAction::Create,
            ));
        }
        Ok(options)
    }

    /// Removes a label and returns the updated list.
    ///
    /// # Errors
    ///
    /// `RecordError::NotFound` if the field has no such label.
    pub fn delete(&self, field: ChecklistField, label: &str) -> RecordResult<OptionSet> {
        let options = self.store.db.with_transaction(|tx| {
            let deleted = tx.execute(
                "DELETE FROM clinical_options WHERE field_name = ?1 AND option_label = ?2",
                params![field.as_str(), label.trim()],
            )?;
            if deleted == 0 {
                return Err(RecordError::NotFound(format!(
                    "option '{}' for {field}",
                    label.trim()
                )));
            }
            load(tx, field)
        })?;

        tracing::info!(field = %field, label = %label.trim(), "clinical option deleted");
        self.store.bus.publish(ChangeEvent::new(
            ResourceKind::ClinicalOption,
            None,
            AuditAction::Delete,
        ));
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ClinicalOptionService {
        ClinicalOptionService::new(Database::open_in_memory().unwrap(), ChangeBus::new())
    }

    #[test]
    fn test_defaults_are_seeded() {
        let options = service().list(ChecklistField::Fits).unwrap();
        assert_eq!(options.labels(), ChecklistField::Fits.default_options());
    }

    #[test]
    fn test_adding_twice_keeps_one() {
        let service = service();

        service.add(ChecklistField::Mood, "Euphoric").unwrap();
        let options = service.add(ChecklistField::Mood, " Euphoric ").unwrap();

        assert_eq!(
            options.labels().iter().filter(|l| *l == "Euphoric").count(),
            1
        );
        assert_eq!(options.labels().last().map(String::as_str), Some("Euphoric"));
    }

    #[test]
    fn test_labels_are_scoped_by_field() {
        let service = service();
        service.add(ChecklistField::Speech, "Stammering").unwrap();

        assert!(service.list(ChecklistField::Speech).unwrap().contains("Stammering"));
        assert!(!service.list(ChecklistField::Mood).unwrap().contains("Stammering"));
    }

    #[test]
    fn test_delete_missing_label_is_not_found() {
        let service = service();

        let options = service.delete(ChecklistField::Mood, "Sad").unwrap();
        assert!(!options.contains("Sad"));
        assert!(matches!(
            service.delete(ChecklistField::Mood, "Sad"),
            Err(RecordError::NotFound(_))
        ));
    }

    #[test]
    fn test_comma_label_rejected() {
        let service = service();
        assert!(matches!(
            service.add(ChecklistField::Mood, "Low, tearful"),
            Err(RecordError::InvalidInput(_))
        ));
        let options = service.list(ChecklistField::Mood).unwrap();
        assert!(!options.contains("Low, tearful"));
        assert!(!options.contains("Low"));
    }

    #[test]
    fn test_blank_label_rejected() {
        assert!(matches!(
            service().add(ChecklistField::Mood, "  "),
            Err(RecordError::InvalidInput(_))
        ));
    }
}
