//! Staff accounts. Reading and changing them is reserved for administrators.

use api_shared::{ApiResponse, AuthContext, ErrorRes, Role, User, UserInput, UserList};
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use opd_core::{require_role, require_view, Section};

use super::created;
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, ApiQuery, PageQuery};
use crate::AppState;

const MANAGE_USERS: &str = "manage users";

#[utoipa::path(
    get,
    path = "/users",
    params(PageQuery),
    responses(
        (status = 200, description = "One page of users", body = UserList),
        (status = 403, description = "Caller is not an administrator", body = ErrorRes)
    )
)]
pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Json<ApiResponse<UserList>>> {
    require_view(&caller, Section::UserManagement)?;
    let listing = state.services.users.list(&query.page_request()?)?;
    Ok(Json(ApiResponse::ok(UserList {
        users: listing.items,
        pagination: listing.pagination,
    })))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "The user", body = User),
        (status = 404, description = "No such user", body = ErrorRes)
    )
)]
pub async fn get(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<User>>> {
    require_view(&caller, Section::UserManagement)?;
    Ok(Json(ApiResponse::ok(state.services.users.get(id)?)))
}

#[utoipa::path(
    post,
    path = "/users",
    request_body = UserInput,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid or duplicate e-mail", body = ErrorRes)
    )
)]
pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiJson(input): ApiJson<UserInput>,
) -> ApiResult<(StatusCode, Json<ApiResponse<User>>)> {
    require_role(&caller, &[Role::Admin], MANAGE_USERS)?;
    let user = state.services.users.create(&input, caller.user_id)?;
    Ok(created(user))
}

#[utoipa::path(
    put,
    path = "/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    request_body = UserInput,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 404, description = "No such user", body = ErrorRes)
    )
)]
pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<UserInput>,
) -> ApiResult<Json<ApiResponse<User>>> {
    require_role(&caller, &[Role::Admin], MANAGE_USERS)?;
    Ok(Json(ApiResponse::ok(
        state.services.users.update(id, &input, caller.user_id)?,
    )))
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted; their references are cleared"),
        (status = 404, description = "No such user", body = ErrorRes)
    )
)]
pub async fn delete(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<()>>> {
    require_role(&caller, &[Role::Admin], MANAGE_USERS)?;
    state.services.users.delete(id, caller.user_id)?;
    Ok(Json(ApiResponse::with_message((), "User deleted")))
}
