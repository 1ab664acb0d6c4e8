//! Session configuration parsed from environment variables.

use std::path::PathBuf;

use crate::error::SessionError;

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api/v1";
pub const DEFAULT_PROFILE_PATH: &str = "/profile";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_STORE_DIR_NAME: &str = ".fitsession";

const PROVIDER_AUTH_SUFFIX: &str = "/auth/v1";

/// Which session backend the client talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// Application REST API issuing bearer tokens.
    #[default]
    Rest,
    /// Delegated auth provider (GoTrue-compatible).
    Provider,
}

impl std::str::FromStr for BackendKind {
    type Err = SessionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "rest" | "token" => Ok(Self::Rest),
            "provider" | "delegated" => Ok(Self::Provider),
            other => Err(SessionError::Config(format!("unknown FITSESSION_BACKEND: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Auth API root, e.g. `https://project.example.co/auth/v1`.
    pub auth_url: String,
    /// Public (anon) key sent as the `apikey` header.
    pub api_key: String,
}

impl ProviderConfig {
    /// Normalise a project URL into the auth API root.
    #[must_use]
    pub fn new(project_url: &str, api_key: impl Into<String>) -> Self {
        let trimmed = project_url.trim().trim_end_matches('/');
        let auth_url = if trimmed.ends_with(PROVIDER_AUTH_SUFFIX) {
            trimmed.to_owned()
        } else {
            format!("{trimmed}{PROVIDER_AUTH_SUFFIX}")
        };
        Self { auth_url, api_key: api_key.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub backend: BackendKind,
    /// Versioned REST base, without trailing slash.
    pub api_url: String,
    /// Endpoint used to re-validate a restored token. `None` skips re-validation.
    pub profile_path: Option<String>,
    /// Required when `backend` is [`BackendKind::Provider`].
    pub provider: Option<ProviderConfig>,
    /// Whether a successful sign-up that returns a credential signs the user in.
    pub signup_establishes_session: bool,
    pub timeouts: Timeouts,
    pub store_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Rest,
            api_url: DEFAULT_API_URL.to_owned(),
            profile_path: Some(DEFAULT_PROFILE_PATH.to_owned()),
            provider: None,
            signup_establishes_session: false,
            timeouts: Timeouts::default(),
            store_dir: default_store_dir(),
        }
    }
}

impl SessionConfig {
    /// Build config from process environment variables.
    ///
    /// - `FITSESSION_BACKEND`: `rest` (default) or `provider`
    /// - `FITSESSION_API_URL`: default `http://localhost:8080/api/v1`
    /// - `FITSESSION_PROFILE_PATH`: default `/profile`; empty disables re-validation
    /// - `FITSESSION_PROVIDER_URL`, `FITSESSION_PROVIDER_KEY`: required for `provider`
    /// - `FITSESSION_SIGNUP_ESTABLISHES_SESSION`: default false
    /// - `FITSESSION_REQUEST_TIMEOUT_SECS`: default 10
    /// - `FITSESSION_CONNECT_TIMEOUT_SECS`: default 5
    /// - `FITSESSION_STORE_DIR`: default `~/.fitsession`
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] for unparseable values or missing
    /// provider settings.
    pub fn from_env() -> Result<Self, SessionError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SessionConfig::from_env`], reading through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`SessionConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SessionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = lookup("FITSESSION_BACKEND")
            .map(|raw| raw.parse::<BackendKind>())
            .transpose()?
            .unwrap_or_default();

        let api_url = lookup("FITSESSION_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.to_owned())
            .trim()
            .trim_end_matches('/')
            .to_owned();

        let profile_path = match lookup("FITSESSION_PROFILE_PATH") {
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(raw.trim().to_owned()),
            None => Some(DEFAULT_PROFILE_PATH.to_owned()),
        };

        let provider = match (lookup("FITSESSION_PROVIDER_URL"), lookup("FITSESSION_PROVIDER_KEY")) {
            (Some(url), Some(key)) if !url.trim().is_empty() && !key.trim().is_empty() => {
                Some(ProviderConfig::new(&url, key.trim()))
            }
            _ => None,
        };
        if backend == BackendKind::Provider && provider.is_none() {
            return Err(SessionError::Config(
                "provider backend requires FITSESSION_PROVIDER_URL and FITSESSION_PROVIDER_KEY".to_owned(),
            ));
        }

        let signup_establishes_session = match lookup("FITSESSION_SIGNUP_ESTABLISHES_SESSION") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                SessionError::Config(format!("invalid FITSESSION_SIGNUP_ESTABLISHES_SESSION: {raw}"))
            })?,
            None => false,
        };

        let timeouts = Timeouts {
            request_secs: parse_u64(&lookup, "FITSESSION_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
            connect_secs: parse_u64(&lookup, "FITSESSION_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?,
        };

        let store_dir = lookup("FITSESSION_STORE_DIR")
            .filter(|raw| !raw.trim().is_empty())
            .map_or_else(default_store_dir, PathBuf::from);

        Ok(Self { backend, api_url, profile_path, provider, signup_establishes_session, timeouts, store_dir })
    }
}

/// Parse the usual on/off spellings.
#[must_use]
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_u64<F>(lookup: &F, key: &str, default: u64) -> Result<u64, SessionError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(SessionError::Config(format!("invalid {key}: {raw}"))),
        },
        None => Ok(default),
    }
}

fn default_store_dir() -> PathBuf {
    dirs::home_dir().map_or_else(|| PathBuf::from(DEFAULT_STORE_DIR_NAME), |home| home.join(DEFAULT_STORE_DIR_NAME))
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
