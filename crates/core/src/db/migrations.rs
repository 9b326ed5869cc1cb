use rusqlite::{params, Connection};
use tracing::info;

use super::schema::CREATE_TABLES;
use crate::constants::SCHEMA_VERSION;
use crate::forms::ChecklistField;
use crate::RecordResult;

/// Brings the schema up to [`SCHEMA_VERSION`]. Safe to run on every start.
pub fn run_migrations(conn: &Connection) -> RecordResult<()> {
    let current_version = current_version(conn)?;

    if current_version == 0 {
        info!("creating database schema version {}", SCHEMA_VERSION);
        initial_setup(conn)?;
    } else if current_version < SCHEMA_VERSION {
        info!(
            "migrating database schema from version {} to {}",
            current_version, SCHEMA_VERSION
        );
        // Later schema versions add their steps here.
        conn.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [SCHEMA_VERSION],
        )?;
    } else {
        info!("database schema is current (version {})", current_version);
    }

    Ok(())
}

pub(crate) fn current_version(conn: &Connection) -> RecordResult<i32> {
    let table_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_migrations')",
        [],
        |row| row.get(0),
    )?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })?;

    Ok(version.unwrap_or(0))
}

fn initial_setup(conn: &Connection) -> RecordResult<()> {
    conn.execute_batch(CREATE_TABLES)?;
    seed_clinical_options(conn)?;
    conn.execute(
        "INSERT INTO schema_migrations (version) VALUES (?1)",
        [SCHEMA_VERSION],
    )?;
    Ok(())
}

/// Seeds the shared checklist vocabulary. Runs once, so deleted defaults stay deleted.
fn seed_clinical_options(conn: &Connection) -> RecordResult<()> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO clinical_options (field_name, option_label) VALUES (?1, ?2)",
    )?;

    let mut seeded = 0usize;
    for field in ChecklistField::ALL {
        for label in field.default_options() {
            seeded += stmt.execute(params![field.as_str(), label])?;
        }
    }

    info!("seeded {} clinical option labels", seeded);
    Ok(())
}
