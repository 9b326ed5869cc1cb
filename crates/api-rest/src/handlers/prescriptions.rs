//! Medication rows, always attached to a clinical proforma.

use api_shared::{
    ApiResponse, AuthContext, BulkPrescriptionReq, BulkPrescriptionRes, CreatePrescriptionReq,
    ErrorRes, Prescription, PrescriptionInput, PrescriptionList,
};
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use opd_core::{require_view, Section};

use super::created;
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, ApiQuery, PageQuery};
use crate::AppState;

#[utoipa::path(
    post,
    path = "/prescriptions",
    request_body = CreatePrescriptionReq,
    responses(
        (status = 201, description = "Prescription added", body = Prescription),
        (status = 404, description = "No such proforma", body = ErrorRes)
    )
)]
pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiJson(req): ApiJson<CreatePrescriptionReq>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Prescription>>)> {
    require_view(&caller, Section::Prescription)?;
    let prescription = state.services.prescriptions.create(&req, caller.user_id)?;
    Ok(created(prescription))
}

#[utoipa::path(
    post,
    path = "/prescriptions/bulk",
    request_body = BulkPrescriptionReq,
    responses(
        (status = 201, description = "All rows stored", body = BulkPrescriptionRes),
        (status = 400, description = "Empty list or a row without a medicine; nothing stored", body = ErrorRes),
        (status = 404, description = "No such proforma", body = ErrorRes)
    )
)]
/// Stores every row in one transaction, or none of them.
pub async fn create_bulk(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiJson(req): ApiJson<BulkPrescriptionReq>,
) -> ApiResult<(StatusCode, Json<ApiResponse<BulkPrescriptionRes>>)> {
    require_view(&caller, Section::Prescription)?;
    let prescriptions = state
        .services
        .prescriptions
        .create_bulk(&req, caller.user_id)?;
    Ok(created(BulkPrescriptionRes {
        count: prescriptions.len(),
        prescriptions,
    }))
}

#[utoipa::path(
    get,
    path = "/prescriptions/proforma/{proforma_id}",
    params(
        ("proforma_id" = i64, Path, description = "Proforma id"),
        PageQuery
    ),
    responses(
        (status = 200, description = "The proforma's prescriptions", body = PrescriptionList),
        (status = 404, description = "No such proforma", body = ErrorRes)
    )
)]
pub async fn list_for_proforma(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(proforma_id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Json<ApiResponse<PrescriptionList>>> {
    require_view(&caller, Section::Prescription)?;
    let listing = state
        .services
        .prescriptions
        .list_for_proforma(proforma_id, &query.page_request()?)?;
    Ok(Json(ApiResponse::ok(PrescriptionList {
        prescriptions: listing.items,
        pagination: listing.pagination,
    })))
}

#[utoipa::path(
    get,
    path = "/prescriptions/{id}",
    params(("id" = i64, Path, description = "Prescription id")),
    responses(
        (status = 200, description = "The prescription", body = Prescription),
        (status = 404, description = "No such prescription", body = ErrorRes)
    )
)]
pub async fn get(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<Prescription>>> {
    require_view(&caller, Section::Prescription)?;
    Ok(Json(ApiResponse::ok(state.services.prescriptions.get(id)?)))
}

#[utoipa::path(
    put,
    path = "/prescriptions/{id}",
    params(("id" = i64, Path, description = "Prescription id")),
    request_body = PrescriptionInput,
    responses(
        (status = 200, description = "Prescription updated", body = Prescription),
        (status = 404, description = "No such prescription", body = ErrorRes)
    )
)]
pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(item): ApiJson<PrescriptionInput>,
) -> ApiResult<Json<ApiResponse<Prescription>>> {
    require_view(&caller, Section::Prescription)?;
    Ok(Json(ApiResponse::ok(
        state
            .services
            .prescriptions
            .update(id, &item, caller.user_id)?,
    )))
}

#[utoipa::path(
    delete,
    path = "/prescriptions/{id}",
    params(("id" = i64, Path, description = "Prescription id")),
    responses(
        (status = 200, description = "Prescription deleted"),
        (status = 404, description = "No such prescription", body = ErrorRes)
    )
)]
pub async fn delete(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<()>>> {
    require_view(&caller, Section::Prescription)?;
    state.services.prescriptions.delete(id, caller.user_id)?;
    Ok(Json(ApiResponse::with_message((), "Prescription deleted")))
}
