//! Shared option vocabularies of the proforma checklist fields.

use api_shared::{AddOptionReq, ApiResponse, AuthContext, ErrorRes, OptionList};
use axum::extract::State;
use axum::{Extension, Json};
use opd_core::{require_view, ChecklistField, OptionSet, Section};

use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath};
use crate::AppState;

fn parse_field(raw: &str) -> ApiResult<ChecklistField> {
    raw.parse::<ChecklistField>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn option_list(options: OptionSet) -> OptionList {
    OptionList {
        field: options.field().as_str().to_string(),
        options: options.labels().to_vec(),
    }
}

#[utoipa::path(
    get,
    path = "/clinical-options/{field}",
    params(("field" = String, Path, description = "Checklist field, e.g. `mood`")),
    responses(
        (status = 200, description = "Labels in insertion order", body = OptionList),
        (status = 400, description = "Unknown field", body = ErrorRes)
    )
)]
pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(field): ApiPath<String>,
) -> ApiResult<Json<ApiResponse<OptionList>>> {
    require_view(&caller, Section::ClinicalProforma)?;
    let field = parse_field(&field)?;
    let options = state.services.options.list(field)?;
    Ok(Json(ApiResponse::ok(option_list(options))))
}

#[utoipa::path(
    post,
    path = "/clinical-options/{field}",
    params(("field" = String, Path, description = "Checklist field, e.g. `mood`")),
    request_body = AddOptionReq,
    responses(
        (status = 200, description = "Label present; adding an existing label is not an error", body = OptionList),
        (status = 400, description = "Unknown field or blank label", body = ErrorRes)
    )
)]
pub async fn add(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(field): ApiPath<String>,
    ApiJson(req): ApiJson<AddOptionReq>,
) -> ApiResult<Json<ApiResponse<OptionList>>> {
    require_view(&caller, Section::ClinicalProforma)?;
    let field = parse_field(&field)?;
    let options = state.services.options.add(field, &req.label)?;
    Ok(Json(ApiResponse::ok(option_list(options))))
}

#[utoipa::path(
    delete,
    path = "/clinical-options/{field}/{label}",
    params(
        ("field" = String, Path, description = "Checklist field, e.g. `mood`"),
        ("label" = String, Path, description = "Label to remove")
    ),
    responses(
        (status = 200, description = "Label removed", body = OptionList),
        (status = 404, description = "No such label", body = ErrorRes)
    )
)]
pub async fn delete(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath((field, label)): ApiPath<(String, String)>,
) -> ApiResult<Json<ApiResponse<OptionList>>> {
    require_view(&caller, Section::ClinicalProforma)?;
    let field = parse_field(&field)?;
    let options = state.services.options.delete(field, &label)?;
    Ok(Json(ApiResponse::ok(option_list(options))))
}
