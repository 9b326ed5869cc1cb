//! Request handlers, one module per resource.
//!
//! Handlers check the caller's role, call the matching core service and wrap the result in
//! the `{ success, data }` envelope. Services are synchronous; every call is one short
//! SQLite transaction.

pub mod adl_files;
pub mod health;
pub mod options;
pub mod patients;
pub mod prescriptions;
pub mod proformas;
pub mod users;

use api_shared::ApiResponse;
use axum::http::StatusCode;
use axum::Json;

/// `201 Created` with the new resource in the envelope.
pub(crate) fn created<T>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(ApiResponse::ok(data)))
}
