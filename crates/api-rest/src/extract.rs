//! Extractors whose rejections use the JSON error body.

use axum::extract::{FromRequest, FromRequestParts};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::ApiError;
use opd_core::{PageRequest, RecordResult};

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// 1-based page number (default 1).
    pub page: Option<u32>,
    /// Page size (default 10, at most 100).
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn page_request(&self) -> RecordResult<PageRequest> {
        PageRequest::new(self.page, self.limit)
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PatientListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// Matches name, CR number or psychiatry number.
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AdlListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// One of `created`, `stored`, `retrieved`, `active`, `archived`.
    pub status: Option<String>,
}
