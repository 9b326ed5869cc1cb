//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services, so
//! request handling never reads process-wide environment variables.

use crate::constants::{DEFAULT_DATABASE_PATH, DEFAULT_PRESCRIPTION_CAP};
use crate::{RecordError, RecordResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    database_path: PathBuf,
    prescription_cap: Option<usize>,
}

impl CoreConfig {
    pub fn new(database_path: PathBuf, prescription_cap: Option<usize>) -> RecordResult<Self> {
        if database_path.as_os_str().is_empty() {
            return Err(RecordError::InvalidInput(
                "database path cannot be empty".into(),
            ));
        }

        Ok(Self {
            database_path,
            prescription_cap,
        })
    }

    /// Builds the configuration from raw environment values.
    ///
    /// # Arguments
    ///
    /// * `database_path` - Value of `OPD_DATABASE_PATH`, if set.
    /// * `prescription_cap` - Value of `OPD_PRESCRIPTION_CAP`, if set.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::InvalidInput` if the cap is not a number, `0` or `none`.
    pub fn from_env_values(
        database_path: Option<String>,
        prescription_cap: Option<String>,
    ) -> RecordResult<Self> {
        let database_path = database_path
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_PATH.into());

        Self::new(
            PathBuf::from(database_path),
            prescription_cap_from_env_value(prescription_cap)?,
        )
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    /// Maximum number of proformas whose prescriptions are fetched per patient view.
    /// `None` means unbounded.
    pub fn prescription_cap(&self) -> Option<usize> {
        self.prescription_cap
    }
}

/// Parses the prescription fan-out cap.
///
/// Unset or blank gives the default of 10; `0` or `none` disables the cap.
pub fn prescription_cap_from_env_value(value: Option<String>) -> RecordResult<Option<usize>> {
    let value = value
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty());

    match value.as_deref() {
        None => Ok(Some(DEFAULT_PRESCRIPTION_CAP)),
        Some("none") | Some("0") => Ok(None),
        Some(raw) => raw.parse::<usize>().map(Some).map_err(|_| {
            RecordError::InvalidInput(format!("OPD_PRESCRIPTION_CAP is not a number: {raw}"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_unset() {
        let cfg = CoreConfig::from_env_values(None, None).unwrap();
        assert_eq!(cfg.database_path(), Path::new(DEFAULT_DATABASE_PATH));
        assert_eq!(cfg.prescription_cap(), Some(10));
    }

    #[test]
    fn test_cap_can_be_disabled_or_changed() {
        assert_eq!(prescription_cap_from_env_value(Some("none".into())).unwrap(), None);
        assert_eq!(prescription_cap_from_env_value(Some("0".into())).unwrap(), None);
        assert_eq!(prescription_cap_from_env_value(Some(" 25 ".into())).unwrap(), Some(25));
        assert!(prescription_cap_from_env_value(Some("ten".into())).is_err());
    }
}
