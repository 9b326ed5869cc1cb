//! ADL files: the physical dossier kept for complex cases and its movements.

use api_shared::{
    AdlFile, AdlFileList, AdlMovementReq, AdlStatus, ApiResponse, AuthContext, ErrorRes,
    MovementList, UpdateAdlFileReq,
};
use axum::extract::State;
use axum::{Extension, Json};
use opd_core::{require_view, AdlFileService, PageRequest, RecordResult, Section};

use crate::error::{ApiError, ApiResult};
use crate::extract::{AdlListQuery, ApiJson, ApiPath, ApiQuery};
use crate::AppState;

#[utoipa::path(
    get,
    path = "/adl-files",
    params(AdlListQuery),
    responses(
        (status = 200, description = "One page of ADL files", body = AdlFileList),
        (status = 400, description = "Unknown status filter", body = ErrorRes)
    )
)]
pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<AdlListQuery>,
) -> ApiResult<Json<ApiResponse<AdlFileList>>> {
    require_view(&caller, Section::AdlFile)?;
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<AdlStatus>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let page = PageRequest::new(query.page, query.limit)?;

    let listing = state.services.adl_files.list(&page, status)?;
    Ok(Json(ApiResponse::ok(AdlFileList {
        files: listing.items,
        pagination: listing.pagination,
    })))
}

#[utoipa::path(
    get,
    path = "/adl-files/{id}",
    params(("id" = i64, Path, description = "ADL file id")),
    responses(
        (status = 200, description = "The ADL file", body = AdlFile),
        (status = 404, description = "No such file", body = ErrorRes)
    )
)]
pub async fn get(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<AdlFile>>> {
    require_view(&caller, Section::AdlFile)?;
    Ok(Json(ApiResponse::ok(state.services.adl_files.get(id)?)))
}

#[utoipa::path(
    get,
    path = "/adl-files/patient/{patient_id}",
    params(("patient_id" = i64, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Every ADL file of the patient, newest first", body = [AdlFile]),
        (status = 404, description = "No such patient", body = ErrorRes)
    )
)]
pub async fn for_patient(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(patient_id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<Vec<AdlFile>>>> {
    require_view(&caller, Section::AdlFile)?;
    Ok(Json(ApiResponse::ok(
        state.services.adl_files.for_patient(patient_id)?,
    )))
}

#[utoipa::path(
    put,
    path = "/adl-files/{id}",
    params(("id" = i64, Path, description = "ADL file id")),
    request_body = UpdateAdlFileReq,
    responses(
        (status = 200, description = "ADL file updated", body = AdlFile),
        (status = 404, description = "No such file", body = ErrorRes)
    )
)]
pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateAdlFileReq>,
) -> ApiResult<Json<ApiResponse<AdlFile>>> {
    require_view(&caller, Section::AdlFile)?;
    Ok(Json(ApiResponse::ok(
        state.services.adl_files.update(id, &req, caller.user_id)?,
    )))
}

type MoveFn = fn(&AdlFileService, i64, &AdlMovementReq, Option<i64>) -> RecordResult<AdlFile>;

/// Shared body of the three movement endpoints. The request body is optional.
fn move_file(
    state: &AppState,
    caller: &AuthContext,
    id: i64,
    body: Option<ApiJson<AdlMovementReq>>,
    movement: MoveFn,
    message: &str,
) -> ApiResult<Json<ApiResponse<AdlFile>>> {
    require_view(caller, Section::AdlFile)?;
    let req = body.map(|ApiJson(req)| req).unwrap_or_default();
    let file = movement(&state.services.adl_files, id, &req, caller.user_id)?;
    Ok(Json(ApiResponse::with_message(file, message)))
}

#[utoipa::path(
    post,
    path = "/adl-files/{id}/retrieve",
    params(("id" = i64, Path, description = "ADL file id")),
    request_body(content = AdlMovementReq, description = "Optional destination and notes"),
    responses(
        (status = 200, description = "File retrieved", body = AdlFile),
        (status = 400, description = "File cannot be retrieved from its current status", body = ErrorRes)
    )
)]
pub async fn retrieve(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
    body: Option<ApiJson<AdlMovementReq>>,
) -> ApiResult<Json<ApiResponse<AdlFile>>> {
    move_file(&state, &caller, id, body, AdlFileService::retrieve, "ADL file retrieved")
}

#[utoipa::path(
    post,
    path = "/adl-files/{id}/return",
    params(("id" = i64, Path, description = "ADL file id")),
    request_body(content = AdlMovementReq, description = "Optional storage location and notes"),
    responses(
        (status = 200, description = "File returned to storage", body = AdlFile),
        (status = 400, description = "File is not retrieved", body = ErrorRes)
    )
)]
pub async fn return_file(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
    body: Option<ApiJson<AdlMovementReq>>,
) -> ApiResult<Json<ApiResponse<AdlFile>>> {
    move_file(&state, &caller, id, body, AdlFileService::return_file, "ADL file returned")
}

#[utoipa::path(
    post,
    path = "/adl-files/{id}/archive",
    params(("id" = i64, Path, description = "ADL file id")),
    request_body(content = AdlMovementReq, description = "Optional notes"),
    responses(
        (status = 200, description = "File archived", body = AdlFile),
        (status = 400, description = "File is already archived", body = ErrorRes)
    )
)]
pub async fn archive(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
    body: Option<ApiJson<AdlMovementReq>>,
) -> ApiResult<Json<ApiResponse<AdlFile>>> {
    move_file(&state, &caller, id, body, AdlFileService::archive, "ADL file archived")
}

#[utoipa::path(
    get,
    path = "/adl-files/{id}/movements",
    params(("id" = i64, Path, description = "ADL file id")),
    responses(
        (status = 200, description = "Movement history, oldest first", body = MovementList),
        (status = 404, description = "No such file", body = ErrorRes)
    )
)]
pub async fn movements(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<MovementList>>> {
    require_view(&caller, Section::AdlFile)?;
    let movements = state.services.adl_files.movements(id)?;
    Ok(Json(ApiResponse::ok(MovementList { movements })))
}
