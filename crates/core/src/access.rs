//! Role-based visibility of record sections.

use api_shared::{AuthContext, Role};

use crate::{RecordError, RecordResult};

/// A part of the patient record that is shown or hidden as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    PatientDetails,
    OutpatientRecord,
    ClinicalProforma,
    AdlFile,
    Prescription,
    UserManagement,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::PatientDetails => "patient details",
            Section::OutpatientRecord => "outpatient record",
            Section::ClinicalProforma => "clinical proforma",
            Section::AdlFile => "ADL files",
            Section::Prescription => "prescriptions",
            Section::UserManagement => "user management",
        }
    }
}

pub fn can_view(role: Role, section: Section) -> bool {
    match role {
        Role::Admin => true,
        Role::Mwo => matches!(section, Section::PatientDetails | Section::OutpatientRecord),
        Role::Jr | Role::Sr => section != Section::UserManagement,
    }
}

/// Roles allowed to write the outpatient (socio-demographic) record.
pub fn can_edit_outpatient(role: Role) -> bool {
    matches!(role, Role::Admin | Role::Mwo)
}

/// # Errors
///
/// Returns `RecordError::Forbidden` if the caller's role cannot see `section`.
pub fn require_view(ctx: &AuthContext, section: Section) -> RecordResult<()> {
    if can_view(ctx.role, section) {
        Ok(())
    } else {
        Err(RecordError::Forbidden(format!(
            "{} cannot access {}",
            ctx.role,
            section.as_str()
        )))
    }
}

/// # Errors
///
/// Returns `RecordError::Forbidden` unless the caller has one of `allowed`.
pub fn require_role(ctx: &AuthContext, allowed: &[Role], action: &str) -> RecordResult<()> {
    if allowed.contains(&ctx.role) {
        Ok(())
    } else {
        Err(RecordError::Forbidden(format!(
            "{} cannot {action}",
            ctx.role
        )))
    }
}
