//! Input validation utilities.
//!
//! Server-side checks applied before a write reaches the database.

use crate::constants::{DEFAULT_PAGE, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use crate::{RecordError, RecordResult};
use opd_types::NonEmptyText;

/// Validates a required free-text field and returns it trimmed.
pub fn require_text(field: &str, value: &str) -> RecordResult<String> {
    NonEmptyText::new(value)
        .map(NonEmptyText::into_inner)
        .map_err(|_| RecordError::InvalidInput(format!("{field} is required")))
}

/// Trims optional text, mapping blank values to `None`.
pub fn optional_text(value: Option<&str>) -> Option<String> {
    NonEmptyText::from_optional(value).map(NonEmptyText::into_inner)
}

/// Minimal structural e-mail check: one `@` with text on both sides and a dot in the domain.
pub fn validate_email(email: &str) -> RecordResult<String> {
    let email = require_text("email", email)?;
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.contains('@')
        }
        None => false,
    };

    if !valid {
        return Err(RecordError::InvalidInput(format!("invalid email: {email}")));
    }
    Ok(email.to_ascii_lowercase())
}

/// Validates a patient age in years.
pub fn validate_age(age: Option<i32>) -> RecordResult<Option<i32>> {
    match age {
        Some(a) if !(0..=150).contains(&a) => Err(RecordError::InvalidInput(format!(
            "age must be between 0 and 150, got {a}"
        ))),
        other => Ok(other),
    }
}

/// Resolved `page`/`limit` pair for a list query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Applies defaults and bounds to raw query values.
    ///
    /// `limit` above the maximum is clamped; a zero `page` or `limit` is rejected.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> RecordResult<Self> {
        let page = page.unwrap_or(DEFAULT_PAGE);
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);

        if page == 0 {
            return Err(RecordError::InvalidInput("page must be at least 1".into()));
        }
        if limit == 0 {
            return Err(RecordError::InvalidInput("limit must be at least 1".into()));
        }

        Ok(Self {
            page,
            limit: limit.min(MAX_PAGE_LIMIT),
        })
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }

    pub fn limit_i64(&self) -> i64 {
        i64::from(self.limit)
    }

    pub fn pagination(&self, total: u64) -> api_shared::Pagination {
        api_shared::Pagination::new(self.page, self.limit, total)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_text_trims() {
        assert_eq!(require_text("name", "  Asha ").unwrap(), "Asha");
        assert!(matches!(
            require_text("name", " "),
            Err(RecordError::InvalidInput(msg)) if msg == "name is required"
        ));
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(validate_email("Dr.Rao@Hospital.org").unwrap(), "dr.rao@hospital.org");
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("a@b").is_err());
    }

    #[test]
    fn test_page_request_defaults_and_bounds() {
        let req = PageRequest::new(None, None).unwrap();
        assert_eq!((req.page, req.limit), (1, 10));

        let req = PageRequest::new(Some(3), Some(500)).unwrap();
        assert_eq!(req.limit, 100);
        assert_eq!(req.offset(), 200);

        assert!(PageRequest::new(Some(0), None).is_err());
        assert!(PageRequest::new(None, Some(0)).is_err());
    }
}
