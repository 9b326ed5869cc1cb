//! Constants used throughout the OPD core crate.

/// Default SQLite database path when no explicit path is configured.
pub const DEFAULT_DATABASE_PATH: &str = "opd_data/opd.sqlite3";

/// Number of proformas whose prescriptions are fetched for one patient view by default.
pub const DEFAULT_PRESCRIPTION_CAP: usize = 10;

/// Current schema version recorded in `schema_migrations`.
pub const SCHEMA_VERSION: i32 = 1;

/// Page used when a list request does not name one.
pub const DEFAULT_PAGE: u32 = 1;

/// Page size used when a list request does not name one.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Largest page size a list request may ask for.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Capacity of the change-event broadcast channel.
pub const CHANGE_BUS_CAPACITY: usize = 256;

/// Group key used when a visit has neither a visit date nor a creation time.
pub const UNKNOWN_DATE_KEY: &str = "Unknown Date";

/// `chrono` format used for visit-history group keys, e.g. `10 Jan 2024`.
pub const VISIT_DATE_FORMAT: &str = "%d %b %Y";

/// Prefix of generated ADL file numbers (`ADL-2024-00001`).
pub const ADL_NUMBER_PREFIX: &str = "ADL";

/// Key prefix for per-patient prescription drafts in a keyed store.
pub const PRESCRIPTION_DRAFT_KEY_PREFIX: &str = "prescription_draft_";
