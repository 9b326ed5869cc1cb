//! Patient registration and the outpatient (socio-demographic) record.

use api_shared::{
    ApiResponse, AuthContext, ErrorRes, OutpatientInput, OutpatientRecord, Patient, PatientInput,
    PatientList, Role,
};
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use opd_core::access::can_edit_outpatient;
use opd_core::{require_role, require_view, PageRequest, RecordError, Section};

use super::created;
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, ApiQuery, PatientListQuery};
use crate::AppState;

#[utoipa::path(
    get,
    path = "/patients",
    params(PatientListQuery),
    responses(
        (status = 200, description = "One page of active patients", body = PatientList),
        (status = 401, description = "Missing or unknown role", body = ErrorRes)
    )
)]
pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<PatientListQuery>,
) -> ApiResult<Json<ApiResponse<PatientList>>> {
    require_view(&caller, Section::PatientDetails)?;
    let page = PageRequest::new(query.page, query.limit)?;
    let listing = state
        .services
        .patients
        .list(&page, query.search.as_deref())?;
    Ok(Json(ApiResponse::ok(PatientList {
        patients: listing.items,
        pagination: listing.pagination,
    })))
}

#[utoipa::path(
    get,
    path = "/patients/{id}",
    params(("id" = i64, Path, description = "Patient id")),
    responses(
        (status = 200, description = "The patient", body = Patient),
        (status = 404, description = "No such patient", body = ErrorRes)
    )
)]
pub async fn get(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<Patient>>> {
    require_view(&caller, Section::PatientDetails)?;
    Ok(Json(ApiResponse::ok(state.services.patients.get(id)?)))
}

#[utoipa::path(
    post,
    path = "/patients",
    request_body = PatientInput,
    responses(
        (status = 201, description = "Patient registered", body = Patient),
        (status = 400, description = "Invalid patient details", body = ErrorRes)
    )
)]
pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiJson(input): ApiJson<PatientInput>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Patient>>)> {
    require_view(&caller, Section::PatientDetails)?;
    let patient = state.services.patients.create(&input, caller.user_id)?;
    Ok(created(patient))
}

#[utoipa::path(
    put,
    path = "/patients/{id}",
    params(("id" = i64, Path, description = "Patient id")),
    request_body = PatientInput,
    responses(
        (status = 200, description = "Patient updated", body = Patient),
        (status = 404, description = "No such patient", body = ErrorRes)
    )
)]
pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<PatientInput>,
) -> ApiResult<Json<ApiResponse<Patient>>> {
    require_view(&caller, Section::PatientDetails)?;
    Ok(Json(ApiResponse::ok(
        state.services.patients.update(id, &input, caller.user_id)?,
    )))
}

#[utoipa::path(
    delete,
    path = "/patients/{id}",
    params(("id" = i64, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Patient deactivated; the record stays readable", body = Patient),
        (status = 403, description = "Caller is not an administrator", body = ErrorRes)
    )
)]
/// Soft delete: the patient is hidden from lists but nothing is removed.
pub async fn deactivate(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<Patient>>> {
    require_role(&caller, &[Role::Admin], "deactivate patients")?;
    let patient = state.services.patients.deactivate(id, caller.user_id)?;
    Ok(Json(ApiResponse::with_message(patient, "Patient deactivated")))
}

#[utoipa::path(
    get,
    path = "/patients/{id}/outpatient-record",
    params(("id" = i64, Path, description = "Patient id")),
    responses(
        (status = 200, description = "The outpatient record", body = OutpatientRecord),
        (status = 404, description = "No record for this patient", body = ErrorRes)
    )
)]
pub async fn outpatient_record(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<OutpatientRecord>>> {
    require_view(&caller, Section::OutpatientRecord)?;
    Ok(Json(ApiResponse::ok(
        state.services.patients.outpatient_record(id)?,
    )))
}

#[utoipa::path(
    put,
    path = "/patients/{id}/outpatient-record",
    params(("id" = i64, Path, description = "Patient id")),
    request_body = OutpatientInput,
    responses(
        (status = 200, description = "Outpatient record saved", body = OutpatientRecord),
        (status = 403, description = "Only Admin and MWO may edit", body = ErrorRes)
    )
)]
pub async fn save_outpatient_record(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<OutpatientInput>,
) -> ApiResult<Json<ApiResponse<OutpatientRecord>>> {
    if !can_edit_outpatient(caller.role) {
        return Err(RecordError::Forbidden(format!(
            "{} cannot edit outpatient records",
            caller.role
        ))
        .into());
    }
    let record = state
        .services
        .patients
        .save_outpatient_record(id, &input, caller.user_id)?;
    Ok(Json(ApiResponse::ok(record)))
}
