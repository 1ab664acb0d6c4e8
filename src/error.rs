//! Session error taxonomy.
//!
//! ERROR HANDLING
//! ==============
//! Validation failures are raised before any request is made. Credential and
//! network failures put the manager into `Error` with a displayable message
//! and are never retried automatically. Unauthorized responses from
//! downstream calls force a sign-out instead of surfacing as login errors.

/// Errors produced by session operations and the authenticated API client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// A client-side precondition failed; nothing was sent.
    #[error("{0}")]
    Validation(String),

    /// The backend rejected the identifier, secret or reset token.
    #[error("{0}")]
    Credential(String),

    /// Transport failure or timeout.
    #[error("network error: {0}")]
    Network(String),

    /// An authenticated request's credential was rejected downstream.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The backend answered with a non-auth failure status.
    #[error("{message}")]
    Api { status: u16, message: String },

    /// A newer call of the same kind started before this one completed.
    #[error("superseded by a newer request")]
    Superseded,

    /// Local session storage could not be read or written.
    #[error("storage error: {0}")]
    Storage(String),

    /// A configuration value is missing or invalid.
    #[error("config error: {0}")]
    Config(String),
}

impl SessionError {
    /// Stable machine-readable code for logs and CLI output.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "E_VALIDATION",
            Self::Credential(_) => "E_CREDENTIAL",
            Self::Network(_) => "E_NETWORK",
            Self::Unauthorized(_) => "E_UNAUTHORIZED",
            Self::Api { .. } => "E_API",
            Self::Superseded => "E_SUPERSEDED",
            Self::Storage(_) => "E_STORAGE",
            Self::Config(_) => "E_CONFIG",
        }
    }

    /// Whether resubmitting the same request could succeed.
    ///
    /// Nothing in this crate retries on its own; this only informs the caller.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Api { status: 429 | 500..=599, .. })
    }

    pub(crate) fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network("request timed out".to_owned())
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
