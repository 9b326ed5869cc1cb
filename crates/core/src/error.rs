use crate::forms::FormErrors;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("access denied: {0}")]
    Forbidden(String),
    #[error("invalid ADL file transition: {0}")]
    InvalidTransition(String),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("failed to serialise record: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("failed to create database directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("database lock poisoned")]
    LockPoisoned,
}

impl RecordError {
    pub(crate) fn not_found(what: &str, id: i64) -> Self {
        RecordError::NotFound(format!("{what} {id}"))
    }
}

pub type RecordResult<T> = std::result::Result<T, RecordError>;

/// Errors raised by a [`RecordSource`](crate::aggregation::RecordSource) or a write sink.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("server responded {status}: {message}")]
    Status { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Failures of client-side workflows (form submit, bulk prescribing).
///
/// None of these consume the caller's form state, so the user can correct and retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("form has {} invalid field(s)", .0.len())]
    Validation(FormErrors),
    #[error("add at least one medication with a medicine name")]
    NoPrescriptions,
    #[error("{0}")]
    MissingPrerequisite(String),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("draft store error: {0}")]
    Drafts(String),
}

impl WorkflowError {
    /// Message suitable for a toast notification.
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::Validation(errors) => errors
                .first()
                .map(|(field, msg)| format!("{field}: {msg}"))
                .unwrap_or_else(|| "Please correct the highlighted fields".into()),
            WorkflowError::Source(SourceError::Status { message, .. }) if !message.is_empty() => {
                message.clone()
            }
            WorkflowError::Source(_) => "Something went wrong. Please try again.".into(),
            other => other.to_string(),
        }
    }
}

pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;

/// Failure of the parts of an aggregation that have no sensible fallback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError {
    #[error("failed to load proforma {id}: {source}")]
    Proforma { id: i64, source: SourceError },
    #[error("failed to load patient {id}: {source}")]
    Patient { id: i64, source: SourceError },
    #[error("failed to list proformas for patient {patient_id}: {source}")]
    Proformas { patient_id: i64, source: SourceError },
}
