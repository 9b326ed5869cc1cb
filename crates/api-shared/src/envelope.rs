//! Response envelope and list payloads.
//!
//! Every successful response is `{ "success": true, "data": ... }`; list payloads carry a
//! `pagination` block next to the items. Failures are `{ "success": false, "message": ... }`.

use crate::models::{AdlFile, ClinicalProforma, FileMovement, Patient, Prescription, User};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub success: bool,
    pub message: String,
}

impl ErrorRes {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u32,
}

impl Pagination {
    /// Builds the pagination block for `total` rows split into pages of `limit`.
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let pages = if limit == 0 {
            0
        } else {
            total.div_ceil(u64::from(limit)) as u32
        };
        Self {
            page,
            limit,
            total,
            pages,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PatientList {
    pub patients: Vec<Patient>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProformaList {
    pub proformas: Vec<ClinicalProforma>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PrescriptionList {
    pub prescriptions: Vec<Prescription>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdlFileList {
    pub files: Vec<AdlFile>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserList {
    pub users: Vec<User>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MovementList {
    pub movements: Vec<FileMovement>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OptionList {
    pub field: String,
    pub options: Vec<String>,
}

/// Result of saving a proforma. `adl_file` is set when the save created or linked a dossier.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProformaSaved {
    pub proforma: ClinicalProforma,
    #[serde(default)]
    pub adl_file: Option<AdlFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BulkPrescriptionRes {
    pub prescriptions: Vec<Prescription>,
    pub count: usize,
}
