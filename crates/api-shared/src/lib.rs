//! # API Shared
//!
//! Shared wire definitions for the OPD records APIs.
//!
//! Contains:
//! - Resource models and request bodies (`models`)
//! - The `{success, data}` envelope and list payloads (`envelope`)
//! - Caller identity parsing from gateway headers (`auth`)
//! - `HealthService`
//!
//! Used by `opd-core`, `api-rest` and `opd-client`.

pub mod auth;
pub mod envelope;
pub mod health;
pub mod models;

pub use auth::{AuthContext, AuthError};
pub use envelope::*;
pub use health::{HealthRes, HealthService};
pub use models::*;
