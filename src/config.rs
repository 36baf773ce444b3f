//! Client configuration: where the API lives, where the credential is kept,
//! and how long a request may take. Values come from CLI flags or their
//! `PARAMPARA_*` environment fallbacks; blank values fall back to the defaults.
//! Configuration values are not secret; the credential itself never lives here.

use crate::{auth::guards::DEFAULT_LOGIN_PATH, auth::state::ProfileUpdatePolicy, http::AppError};
use std::{path::PathBuf, time::Duration};
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const APP_DIR: &str = "parampara";

/// `<config dir>/parampara`, or `./.parampara` when the platform has no config dir.
#[must_use]
pub fn default_credential_dir() -> PathBuf {
    dirs::config_dir().map_or_else(|| PathBuf::from(".parampara"), |dir| dir.join(APP_DIR))
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api_base_url: String,
    pub credential_dir: PathBuf,
    pub request_timeout: Duration,
    pub login_path: String,
    pub profile_update_policy: ProfileUpdatePolicy,
}

impl AppConfig {
    /// Defaults for everything except the API base URL.
    #[must_use]
    pub fn new(api_base_url: &str) -> Self {
        Self {
            api_base_url: api_base_url.trim().trim_end_matches('/').to_string(),
            credential_dir: default_credential_dir(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            profile_update_policy: ProfileUpdatePolicy::default(),
        }
    }

    /// Applies `overrides` on top of the defaults and validates the result.
    ///
    /// # Errors
    /// Returns `AppError::Config` if the API URL is not an absolute http(s) URL or
    /// the timeout is zero.
    pub fn load(overrides: Overrides) -> Result<Self, AppError> {
        let mut config = Self::new(DEFAULT_API_BASE_URL);
        apply_overrides(&mut config, overrides);
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        let url = Url::parse(&self.api_base_url).map_err(|err| {
            AppError::Config(format!("Invalid API URL {}: {err}", self.api_base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::Config(format!(
                "API URL must use http or https: {}",
                self.api_base_url
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(AppError::Config(
                "Request timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Optional values supplied by the CLI or the environment.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub api_base_url: Option<String>,
    pub credential_dir: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub profile_update_policy: Option<ProfileUpdatePolicy>,
}

fn apply_overrides(config: &mut AppConfig, overrides: Overrides) {
    if let Some(value) = overrides.api_base_url.as_deref().and_then(normalize_value) {
        config.api_base_url = value.trim_end_matches('/').to_string();
    }
    if let Some(value) = overrides.credential_dir.as_deref().and_then(normalize_value) {
        config.credential_dir = PathBuf::from(value);
    }
    if let Some(seconds) = overrides.timeout_seconds {
        config.request_timeout = Duration::from_secs(seconds);
    }
    if let Some(policy) = overrides.profile_update_policy {
        config.profile_update_policy = policy;
    }
}

/// Trims `value`; blank means unset.
#[must_use]
pub fn normalize_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
