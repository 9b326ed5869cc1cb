//! Resource models as they travel over the wire.
//!
//! Each persisted resource is split into an `*Input` struct (what a client may write) and
//! the resource itself (input flattened in, plus server-owned columns such as ids and
//! timestamps). The same structs are used by the REST server, the core services and the
//! HTTP client.

use chrono::{DateTime, NaiveDate, Utc};
use opd_types::MultiSelect;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Error returned when an enum value cannot be parsed from its wire form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal, { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
        pub enum $name {
            $(
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($wire => Ok($name::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

wire_enum!(
    /// Staff role. Controls which record sections a user can see.
    Role, "role", {
        Admin => "Admin",
        Mwo => "MWO",
        Jr => "JR",
        Sr => "SR",
    }
);

wire_enum!(Sex, "sex", { Male => "M", Female => "F", Other => "Other" });

wire_enum!(VisitType, "visit type", {
    FirstVisit => "first_visit",
    FollowUp => "follow_up",
});

wire_enum!(CaseSeverity, "case severity", {
    Mild => "mild",
    Moderate => "moderate",
    Severe => "severe",
    Critical => "critical",
});

wire_enum!(DoctorDecision, "doctor decision", {
    SimpleCase => "simple_case",
    ComplexCase => "complex_case",
});

wire_enum!(
    /// Physical tracking state of an ADL file.
    AdlStatus, "ADL file status", {
        Created => "created",
        Stored => "stored",
        Retrieved => "retrieved",
        Active => "active",
        Archived => "archived",
    }
);

wire_enum!(MovementType, "movement type", {
    Created => "created",
    Retrieved => "retrieved",
    Returned => "returned",
    Archived => "archived",
});

wire_enum!(AuditAction, "audit action", {
    Create => "create",
    Update => "update",
    Delete => "delete",
});

impl Default for VisitType {
    fn default() -> Self {
        VisitType::FirstVisit
    }
}

fn default_true() -> bool {
    true
}

// ============================================================================
// USERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserInput {
    pub name: String,
    pub role: Role,
    pub email: String,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: i64,
    #[serde(flatten)]
    pub fields: UserInput,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// PATIENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PatientInput {
    pub name: String,
    pub sex: Sex,
    #[serde(default)]
    pub age: Option<i32>,
    #[serde(default)]
    pub contact_number: Option<String>,
    /// Hospital Central Registration number.
    #[serde(default)]
    pub cr_no: Option<String>,
    /// Psychiatry department number.
    #[serde(default)]
    pub psy_no: Option<String>,
    #[serde(default)]
    pub assigned_room: Option<String>,
    #[serde(default)]
    pub assigned_doctor_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Patient {
    pub id: i64,
    #[serde(flatten)]
    pub fields: PatientInput,
    #[serde(default)]
    pub assigned_doctor_name: Option<String>,
    #[serde(default)]
    pub has_adl_file: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Socio-demographic details captured by the medical welfare officer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct OutpatientInput {
    pub marital_status: Option<String>,
    pub education: Option<String>,
    pub occupation: Option<String>,
    pub religion: Option<String>,
    pub family_type: Option<String>,
    pub locality: Option<String>,
    pub head_name: Option<String>,
    pub head_relationship: Option<String>,
    pub address: Option<String>,
    pub district: Option<String>,
    pub state: Option<String>,
    pub pin_code: Option<String>,
    pub monthly_income: Option<String>,
    pub filled_by: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OutpatientRecord {
    pub patient_id: i64,
    #[serde(flatten)]
    pub fields: OutpatientInput,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// CLINICAL PROFORMA
// ============================================================================

/// Writable part of a clinical proforma.
///
/// Checklist fields accept either a list or a comma-joined string and are always sent back
/// in the comma-joined form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ProformaInput {
    pub patient_id: i64,
    pub filled_by: Option<i64>,
    pub visit_date: Option<NaiveDate>,
    pub visit_type: VisitType,
    pub room_no: Option<String>,
    pub informant_present: bool,
    pub nature_of_information: Option<String>,
    pub onset_duration: Option<String>,
    pub course: Option<String>,
    pub precipitating_factor: Option<String>,
    pub illness_duration: Option<String>,
    pub current_episode_since: Option<String>,

    #[schema(value_type = String)]
    pub mood: MultiSelect,
    #[schema(value_type = String)]
    pub behaviour: MultiSelect,
    #[schema(value_type = String)]
    pub speech: MultiSelect,
    #[schema(value_type = String)]
    pub thought: MultiSelect,
    #[schema(value_type = String)]
    pub perception: MultiSelect,
    #[schema(value_type = String)]
    pub somatic: MultiSelect,
    #[schema(value_type = String)]
    pub bio_functions: MultiSelect,
    #[schema(value_type = String)]
    pub adjustment: MultiSelect,
    #[schema(value_type = String)]
    pub cognitive_function: MultiSelect,
    #[schema(value_type = String)]
    pub fits: MultiSelect,
    #[schema(value_type = String)]
    pub sexual_problem: MultiSelect,
    #[schema(value_type = String)]
    pub substance_use: MultiSelect,
    #[schema(value_type = String)]
    pub associated_medical_surgical: MultiSelect,
    #[schema(value_type = String)]
    pub mse_behaviour: MultiSelect,
    #[schema(value_type = String)]
    pub mse_affect: MultiSelect,
    #[schema(value_type = String)]
    pub mse_thought: MultiSelect,
    #[schema(value_type = String)]
    pub mse_perception: MultiSelect,
    #[schema(value_type = String)]
    pub mse_cognitive_function: MultiSelect,

    pub history_narrative: Option<String>,
    pub past_history: Option<String>,
    pub family_history: Option<String>,
    pub gpe: Option<String>,
    pub mse_insight: Option<String>,
    pub mse_judgement: Option<String>,

    pub diagnosis: Option<String>,
    pub icd_code: Option<String>,
    pub case_severity: Option<CaseSeverity>,
    pub doctor_decision: Option<DoctorDecision>,
    pub requires_adl_file: bool,
    pub adl_reasoning: Option<String>,
    pub treatment_prescribed: Option<String>,
    pub disposal: Option<String>,
    pub referred_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ClinicalProforma {
    pub id: i64,
    #[serde(flatten)]
    pub fields: ProformaInput,
    #[serde(default)]
    pub adl_file_id: Option<i64>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub doctor_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// PRESCRIPTIONS
// ============================================================================

/// One medication row. All fields are free text; only `medicine` is mandatory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PrescriptionInput {
    pub medicine: String,
    pub dosage: String,
    #[serde(rename = "when")]
    pub when_to_take: String,
    pub frequency: String,
    pub duration: String,
    pub qty: String,
    pub details: String,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Prescription {
    pub id: i64,
    pub clinical_proforma_id: i64,
    #[serde(flatten)]
    pub item: PrescriptionInput,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CreatePrescriptionReq {
    pub clinical_proforma_id: i64,
    #[serde(flatten)]
    pub item: PrescriptionInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BulkPrescriptionReq {
    pub clinical_proforma_id: i64,
    pub prescriptions: Vec<PrescriptionInput>,
}

// ============================================================================
// ADL FILES
// ============================================================================

/// Extended dossier kept for complex cases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct AdlDetails {
    pub history_narrative: Option<String>,
    pub history_specific_enquiry: Option<String>,
    pub family_history_father: Option<String>,
    pub family_history_mother: Option<String>,
    pub family_history_siblings: Option<String>,
    pub personal_history: Option<String>,
    pub premorbid_personality: Option<String>,
    pub mse_general_appearance: Option<String>,
    pub mse_attitude: Option<String>,
    pub mse_speech: Option<String>,
    pub mse_mood_affect: Option<String>,
    pub mse_thought: Option<String>,
    pub mse_perception: Option<String>,
    pub mse_cognition: Option<String>,
    pub mse_insight: Option<String>,
    pub diagnostic_formulation: Option<String>,
    pub provisional_diagnosis: Option<String>,
    pub treatment_plan: Option<String>,
    pub consultant_comments: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AdlFile {
    pub id: i64,
    pub patient_id: i64,
    pub adl_no: String,
    pub clinical_proforma_id: Option<i64>,
    pub created_by: Option<i64>,
    pub file_status: AdlStatus,
    pub physical_file_location: Option<String>,
    pub file_created_date: NaiveDate,
    pub last_accessed_date: Option<NaiveDate>,
    pub last_accessed_by: Option<i64>,
    pub total_visits: i64,
    pub is_active: bool,
    pub notes: Option<String>,
    #[serde(default)]
    pub details: AdlDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct UpdateAdlFileReq {
    pub physical_file_location: Option<String>,
    pub notes: Option<String>,
    pub details: Option<AdlDetails>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct AdlMovementReq {
    pub to_location: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FileMovement {
    pub id: i64,
    pub adl_file_id: i64,
    pub patient_id: i64,
    pub moved_by: Option<i64>,
    pub movement_type: MovementType,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    pub movement_date: DateTime<Utc>,
    pub notes: Option<String>,
}

// ============================================================================
// AUDIT & OPTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuditLog {
    pub id: i64,
    pub table_name: String,
    pub record_id: i64,
    pub action: AuditAction,
    pub changed_by: Option<i64>,
    pub changed_at: DateTime<Utc>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AddOptionReq {
    pub label: String,
}
