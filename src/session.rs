//! Session data model: user, credential, session and the published auth state.
//!
//! SYSTEM CONTEXT
//! ==============
//! `AuthState` is the value every consumer observes through the manager's
//! watch channel. Only the manager constructs new states; consumers clone
//! snapshots and never write back.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::error::SessionError;
use crate::validate;

/// Current Unix time in seconds.
#[must_use]
pub fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

// =============================================================================
// USER
// =============================================================================

/// Identity attached to a session. Opaque to the manager beyond `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Backend user identifier. The REST backend issues numbers, the provider UUIDs.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Remaining profile fields, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), email: None, name: None, extra: Map::new() }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Best human-readable label: name, then email, then id.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .or(self.email.as_deref().filter(|email| !email.is_empty()))
            .unwrap_or(&self.id)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}

// =============================================================================
// CREDENTIAL
// =============================================================================

/// Opaque bearer token. `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Value for the `Authorization` header.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// An authenticated binding between this client and a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    pub credential: Credential,
    /// Provider refresh token, when the delegated flow issues one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<Credential>,
    /// Unix seconds after which `credential` is no longer valid, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl Session {
    #[must_use]
    pub fn new(user: User, credential: Credential) -> Self {
        Self { user, credential, refresh_token: None, expires_at: None }
    }

    /// Sessions without a reported expiry never expire locally.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Both halves present and not expired.
    #[must_use]
    pub fn is_valid(&self, now: i64) -> bool {
        !self.user.id.trim().is_empty() && !self.credential.is_empty() && !self.is_expired(now)
    }
}

// =============================================================================
// AUTH STATE
// =============================================================================

/// Position in the session state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStatus {
    #[default]
    Unauthenticated,
    Loading,
    Authenticated,
    Error,
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Loading => "loading",
            Self::Authenticated => "authenticated",
            Self::Error => "error",
        })
    }
}

/// Snapshot of the client's authentication state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub status: AuthStatus,
    pub session: Option<Session>,
    /// Displayable reason for the last failed sign-in or sign-up.
    pub error: Option<String>,
}

impl AuthState {
    pub(crate) fn authenticated(session: Session) -> Self {
        Self { status: AuthStatus::Authenticated, session: Some(session), error: None }
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.status == AuthStatus::Loading
    }

    /// `Authenticated` with a session that has not expired.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.status == AuthStatus::Authenticated
            && self.session.as_ref().is_some_and(|session| session.is_valid(unix_now()))
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        if self.is_authenticated() {
            self.session.as_ref().map(|session| &session.user)
        } else {
            None
        }
    }
}

// =============================================================================
// PENDING RESET
// =============================================================================

/// A password reset awaiting confirmation with an externally supplied token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReset {
    pub token: String,
    pub requested_at: OffsetDateTime,
}

impl PendingReset {
    /// Wrap a reset token.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Validation`] when the token is empty.
    pub fn new(token: &str) -> Result<Self, SessionError> {
        let token = validate::require_reset_token(token)?;
        Ok(Self { token: token.to_owned(), requested_at: OffsetDateTime::now_utc() })
    }

    /// Extract the token from a reset link, or accept a bare token.
    ///
    /// Looks at `token` and `access_token` in the query string, then in the
    /// fragment (provider links carry the recovery token there).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Validation`] when no token can be found.
    pub fn from_link(link: &str) -> Result<Self, SessionError> {
        let link = link.trim();
        let Ok(url) = reqwest::Url::parse(link) else {
            return Self::new(link);
        };

        let from_query = url
            .query_pairs()
            .find(|(key, _)| key == "token" || key == "access_token")
            .map(|(_, value)| value.into_owned());
        let from_fragment = || {
            url.fragment().and_then(|fragment| {
                fragment.split('&').find_map(|pair| {
                    let (key, value) = pair.split_once('=')?;
                    (key == "token" || key == "access_token").then(|| value.to_owned())
                })
            })
        };

        match from_query.or_else(from_fragment) {
            Some(token) => Self::new(&token),
            None => Err(SessionError::Validation("reset link has no token".to_owned())),
        }
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
