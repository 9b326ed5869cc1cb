//! Clinical proformas: one record per patient visit.

use api_shared::{
    ApiResponse, AuthContext, ClinicalProforma, ErrorRes, ProformaInput, ProformaList,
    ProformaSaved,
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
    get,
    path = "/clinical-proforma",
    params(PageQuery),
    responses(
        (status = 200, description = "One page of proformas, latest visit first", body = ProformaList),
        (status = 403, description = "Role cannot see clinical proformas", body = ErrorRes)
    )
)]
pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Json<ApiResponse<ProformaList>>> {
    require_view(&caller, Section::ClinicalProforma)?;
    let listing = state.services.proformas.list(&query.page_request()?)?;
    Ok(Json(ApiResponse::ok(ProformaList {
        proformas: listing.items,
        pagination: listing.pagination,
    })))
}

#[utoipa::path(
    get,
    path = "/clinical-proforma/patient/{patient_id}",
    params(
        ("patient_id" = i64, Path, description = "Patient id"),
        PageQuery
    ),
    responses(
        (status = 200, description = "The patient's proformas, latest visit first", body = ProformaList),
        (status = 404, description = "No such patient", body = ErrorRes)
    )
)]
pub async fn list_for_patient(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(patient_id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Json<ApiResponse<ProformaList>>> {
    require_view(&caller, Section::ClinicalProforma)?;
    let listing = state
        .services
        .proformas
        .list_for_patient(patient_id, &query.page_request()?)?;
    Ok(Json(ApiResponse::ok(ProformaList {
        proformas: listing.items,
        pagination: listing.pagination,
    })))
}

#[utoipa::path(
    get,
    path = "/clinical-proforma/{id}",
    params(("id" = i64, Path, description = "Proforma id")),
    responses(
        (status = 200, description = "The proforma", body = ClinicalProforma),
        (status = 404, description = "No such proforma", body = ErrorRes)
    )
)]
pub async fn get(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<ClinicalProforma>>> {
    require_view(&caller, Section::ClinicalProforma)?;
    Ok(Json(ApiResponse::ok(state.services.proformas.get(id)?)))
}

#[utoipa::path(
    post,
    path = "/clinical-proforma",
    request_body = ProformaInput,
    responses(
        (status = 201, description = "Visit recorded; `adl_file` is set for complex cases", body = ProformaSaved),
        (status = 404, description = "Patient or filling user does not exist", body = ErrorRes)
    )
)]
pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiJson(input): ApiJson<ProformaInput>,
) -> ApiResult<(StatusCode, Json<ApiResponse<ProformaSaved>>)> {
    require_view(&caller, Section::ClinicalProforma)?;
    let saved = state.services.proformas.create(&input, caller.user_id)?;
    Ok(created(saved))
}

#[utoipa::path(
    put,
    path = "/clinical-proforma/{id}",
    params(("id" = i64, Path, description = "Proforma id")),
    request_body = ProformaInput,
    responses(
        (status = 200, description = "Proforma updated", body = ProformaSaved),
        (status = 404, description = "No such proforma", body = ErrorRes)
    )
)]
pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<ProformaInput>,
) -> ApiResult<Json<ApiResponse<ProformaSaved>>> {
    require_view(&caller, Section::ClinicalProforma)?;
    Ok(Json(ApiResponse::ok(
        state.services.proformas.update(id, &input, caller.user_id)?,
    )))
}

#[utoipa::path(
    delete,
    path = "/clinical-proforma/{id}",
    params(("id" = i64, Path, description = "Proforma id")),
    responses(
        (status = 200, description = "Proforma and its prescriptions deleted"),
        (status = 404, description = "No such proforma", body = ErrorRes)
    )
)]
pub async fn delete(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<()>>> {
    require_view(&caller, Section::ClinicalProforma)?;
    state.services.proformas.delete(id, caller.user_id)?;
    Ok(Json(ApiResponse::with_message((), "Clinical proforma deleted")))
}
