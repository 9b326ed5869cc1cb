//! Error type returned by every handler.
//!
//! Failures leave the server as `{ "success": false, "message": ... }`. Storage and other
//! internal failures are logged here and reported with a generic message.

use api_shared::{AuthError, ErrorRes};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use opd_core::RecordError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Unauthorized(#[from] AuthError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("{0}")]
    BadRequest(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn status_and_message(self) -> (StatusCode, String) {
        match self {
            ApiError::Unauthorized(err) => (StatusCode::UNAUTHORIZED, err.to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Record(err) => match err {
                RecordError::InvalidInput(message) => (StatusCode::BAD_REQUEST, message),
                RecordError::InvalidTransition(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                RecordError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
                RecordError::Forbidden(message) => (StatusCode::FORBIDDEN, message),
                other => {
                    tracing::error!(error = %other, "request failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_string(),
                    )
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        (status, Json(ErrorRes::new(message))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_errors_map_to_statuses() {
        let cases = [
            (RecordError::InvalidInput("name is required".into()), StatusCode::BAD_REQUEST),
            (RecordError::NotFound("patient 4".into()), StatusCode::NOT_FOUND),
            (RecordError::Forbidden("MWO cannot access".into()), StatusCode::FORBIDDEN),
            (
                RecordError::InvalidTransition("archived to retrieved".into()),
                StatusCode::BAD_REQUEST,
            ),
            (RecordError::LockPoisoned, StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), expected);
        }
    }

    #[test]
    fn test_internal_details_are_not_returned() {
        let (status, message) = ApiError::from(RecordError::LockPoisoned).status_and_message();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "Internal server error");
    }

    #[test]
    fn test_auth_errors_are_unauthorised() {
        let response = ApiError::from(AuthError::MissingRole).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
