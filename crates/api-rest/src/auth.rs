//! Caller identity middleware.
//!
//! Requests are expected to arrive through a gateway that has already authenticated the
//! user and forwards the role and user id as headers. The middleware parses them into an
//! [`AuthContext`] and stores it in the request extensions for handlers to pick up.

use api_shared::auth::{ROLE_HEADER, USER_ID_HEADER};
use api_shared::AuthContext;
use axum::extract::Request;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Rejects requests without a valid role header with `401`.
pub async fn require_identity(mut req: Request, next: Next) -> Result<Response, ApiError> {
    let caller = AuthContext::from_header_values(
        header(req.headers(), ROLE_HEADER),
        header(req.headers(), USER_ID_HEADER),
    )
    .map_err(|err| {
        tracing::debug!(error = %err, path = %req.uri().path(), "rejected request");
        err
    })?;

    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}
