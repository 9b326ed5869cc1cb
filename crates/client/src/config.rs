//! Client runtime configuration.
//!
//! Resolved once at startup from raw environment values, like the server's `CoreConfig`.

use api_shared::{AuthContext, Role};
use opd_core::config::prescription_cap_from_env_value;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::DEFAULT_STALE_AFTER;
use crate::error::{ClientError, ClientResult};

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_DRAFT_DIR: &str = "opd_drafts";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    base_url: String,
    identity: AuthContext,
    draft_dir: PathBuf,
    prescription_cap: Option<usize>,
    cache_stale_after: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, identity: AuthContext) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            identity,
            draft_dir: PathBuf::from(DEFAULT_DRAFT_DIR),
            prescription_cap: Some(opd_core::constants::DEFAULT_PRESCRIPTION_CAP),
            cache_stale_after: DEFAULT_STALE_AFTER,
        }
    }

    pub fn with_draft_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.draft_dir = dir.into();
        self
    }

    pub fn with_prescription_cap(mut self, cap: Option<usize>) -> Self {
        self.prescription_cap = cap;
        self
    }

    pub fn with_cache_stale_after(mut self, stale_after: Duration) -> Self {
        self.cache_stale_after = stale_after;
        self
    }

    /// Builds the configuration from raw environment values.
    ///
    /// # Arguments
    ///
    /// * `base_url` - `OPD_API_BASE_URL`
    /// * `role` - `OPD_USER_ROLE`, defaults to `JR`
    /// * `user_id` - `OPD_USER_ID`
    /// * `draft_dir` - `OPD_DRAFT_DIR`
    /// * `prescription_cap` - `OPD_PRESCRIPTION_CAP`
    /// * `cache_stale_secs` - `OPD_CACHE_STALE_SECS`, defaults to 30
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidConfig` for an unknown role, a non-numeric user id, cap or
    /// stale time, or a base URL that is not an absolute http(s) URL.
    pub fn from_env_values(
        base_url: Option<String>,
        role: Option<String>,
        user_id: Option<String>,
        draft_dir: Option<String>,
        prescription_cap: Option<String>,
        cache_stale_secs: Option<String>,
    ) -> ClientResult<Self> {
        let non_blank = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        let base_url = non_blank(base_url).unwrap_or_else(|| DEFAULT_API_BASE_URL.into());
        let parsed = Url::parse(&base_url).map_err(|e| {
            ClientError::InvalidConfig(format!("OPD_API_BASE_URL {base_url}: {e}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::InvalidConfig(format!(
                "OPD_API_BASE_URL must be an http(s) URL, got {base_url}"
            )));
        }

        let role = non_blank(role).unwrap_or_else(|| Role::Jr.as_str().into());
        let identity = AuthContext::from_header_values(Some(&role), user_id.as_deref())
            .map_err(|e| ClientError::InvalidConfig(e.to_string()))?;

        let cap = prescription_cap_from_env_value(prescription_cap)
            .map_err(|e| ClientError::InvalidConfig(e.to_string()))?;

        let stale_after = match non_blank(cache_stale_secs) {
            Some(raw) => raw.parse::<u64>().map(Duration::from_secs).map_err(|_| {
                ClientError::InvalidConfig(format!(
                    "OPD_CACHE_STALE_SECS must be a whole number of seconds, got {raw}"
                ))
            })?,
            None => DEFAULT_STALE_AFTER,
        };

        let mut cfg = Self::new(base_url, identity)
            .with_prescription_cap(cap)
            .with_cache_stale_after(stale_after);
        if let Some(dir) = non_blank(draft_dir) {
            cfg = cfg.with_draft_dir(dir);
        }
        Ok(cfg)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn identity(&self) -> AuthContext {
        self.identity
    }

    pub fn draft_dir(&self) -> &Path {
        &self.draft_dir
    }

    pub fn prescription_cap(&self) -> Option<usize> {
        self.prescription_cap
    }

    pub fn cache_stale_after(&self) -> Duration {
        self.cache_stale_after
    }
}
