//! # OPD Client
//!
//! Typed access to the OPD REST API for front ends and tools.
//!
//! - [`ApiClient`]: reqwest-based client implementing the core read and write traits, so the
//!   aggregation and submission workflows in `opd-core` run unchanged against a remote server
//! - [`QueryCache`]: response cache keyed by path and tagged by resource kind
//! - [`LiveVisitHistory`]: a patient view that re-aggregates when its resources change
//! - [`ClientConfig`]: base URL, caller identity and local draft settings

#![warn(rust_2018_idioms)]

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod live;

pub use cache::QueryCache;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use http::ApiClient;
pub use live::LiveVisitHistory;
