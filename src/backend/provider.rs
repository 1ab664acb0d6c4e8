//! Delegated flow against a GoTrue-compatible auth service.
//!
//! SYSTEM CONTEXT
//! ==============
//! The provider owns credential issuance and refresh. This client keeps the
//! provider's session record under [`PROVIDER_SESSION_KEY`] and refreshes it
//! when it is about to expire.
//!
//! Sign-in and sign-up only return what the provider issued. The record
//! changes when the manager commits a result ([`SessionBackend::adopt`]) or
//! ends the session ([`SessionBackend::discard`]). Changes that originate
//! here, a refresh or a user update, go out on a broadcast channel that the
//! manager listens to.
//!
//! Every request carries the project's public key in the `apikey` header.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::http::{auth_response_text, build_client, decode_body, join_url};
use super::{AuthFlow, SessionBackend, SessionEvent, SessionEventKind, SignUpOutcome};
use crate::config::{ProviderConfig, Timeouts};
use crate::error::SessionError;
use crate::session::{Credential, Session, User, unix_now};
use crate::store::{PROVIDER_SESSION_KEY, SessionStore, load_json, save_json};

/// Refresh a stored session this many seconds before it expires.
pub const REFRESH_MARGIN_SECS: i64 = 30;

const EVENT_CAPACITY: usize = 16;

pub struct ProviderBackend {
    http: reqwest::Client,
    auth_url: String,
    api_key: String,
    store: Arc<dyn SessionStore>,
    current: Mutex<Option<Session>>,
    refreshing: tokio::sync::Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

impl ProviderBackend {
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &ProviderConfig, timeouts: Timeouts, store: Arc<dyn SessionStore>) -> Result<Self, SessionError> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            http: build_client(timeouts)?,
            auth_url: config.auth_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            store,
            current: Mutex::new(None),
            refreshing: tokio::sync::Mutex::new(()),
            events,
        })
    }

    /// Exchange the current refresh token for a new session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Unauthorized`] when there is no session to
    /// refresh or the provider rejects the refresh token; the session record
    /// is cleared in the latter case. Returns [`SessionError::Superseded`]
    /// when the record changed while the refresh was in flight. Transport
    /// failures leave the record untouched.
    pub async fn refresh_session(&self) -> Result<Session, SessionError> {
        let _refreshing = self.refreshing.lock().await;
        let record = self.record().clone();
        let Some((credential, refresh_token)) =
            record.and_then(|session| session.refresh_token.map(|token| (session.credential, token)))
        else {
            return Err(SessionError::Unauthorized("no session to refresh".to_owned()));
        };

        match self.exchange_refresh(&refresh_token).await {
            Ok(fresh) => {
                if !self.replace_if_current(&credential, Some(fresh.clone()), SessionEventKind::TokenRefreshed) {
                    return Err(SessionError::Superseded);
                }
                Ok(fresh)
            }
            Err(SessionError::Credential(message)) => {
                self.replace_if_current(&credential, None, SessionEventKind::SignedOut);
                Err(SessionError::Unauthorized(message))
            }
            Err(error) => Err(error),
        }
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        bearer: Option<&Credential>,
        body: Option<&B>,
    ) -> Result<String, SessionError> {
        let mut request =
            self.http.request(method, join_url(&self.auth_url, path)).header("apikey", &self.api_key);
        if let Some(credential) = bearer {
            request = request.header(reqwest::header::AUTHORIZATION, credential.bearer());
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(|e| SessionError::from_transport(&e))?;
        auth_response_text(response).await
    }

    async fn exchange_refresh(&self, refresh_token: &Credential) -> Result<Session, SessionError> {
        let body = RefreshBody { refresh_token: refresh_token.as_str() };
        let raw = self.send(Method::POST, "/token?grant_type=refresh_token", None, Some(&body)).await?;
        let token: TokenResponse = decode_body(200, &raw)?;
        token.into_session(unix_now())
    }

    /// The session record, loaded from storage on first use.
    fn record(&self) -> MutexGuard<'_, Option<Session>> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.is_none() {
            *current = load_json::<Session>(self.store.as_ref(), PROVIDER_SESSION_KEY);
        }
        current
    }

    /// Replace the session record and mirror it to storage.
    fn store_record(&self, current: &mut Option<Session>, session: Option<Session>) {
        let persisted = match &session {
            Some(session) => save_json(self.store.as_ref(), PROVIDER_SESSION_KEY, session),
            None => self.store.remove(PROVIDER_SESSION_KEY),
        };
        if let Err(error) = persisted {
            warn!(%error, "provider session record not persisted");
        }
        *current = session;
    }

    /// Replace the record and notify listeners, but only if it still holds
    /// `expected`. A record replaced or cleared meanwhile is left alone.
    fn replace_if_current(&self, expected: &Credential, session: Option<Session>, kind: SessionEventKind) -> bool {
        let mut current = self.record();
        if current.as_ref().is_none_or(|live| live.credential != *expected) {
            debug!(kind = ?kind, "session record changed during provider call; result dropped");
            return false;
        }
        self.store_record(&mut current, session.clone());
        let _ = self.events.send(SessionEvent { kind, session });
        true
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
struct PasswordBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct RecoverBody<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct UpdatePasswordBody<'a> {
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self, now: i64) -> Result<Session, SessionError> {
        let credential = Credential::new(self.access_token);
        if credential.is_empty() {
            return Err(SessionError::Api { status: 200, message: "token response carried no access token".to_owned() });
        }
        Ok(Session {
            user: self.user,
            credential,
            refresh_token: self.refresh_token.filter(|token| !token.trim().is_empty()).map(Credential::new),
            expires_at: self.expires_at.or_else(|| self.expires_in.map(|secs| now + secs)),
        })
    }
}

/// Sign-up answers with a full session when no confirmation is required,
/// otherwise with the bare user (or `{ "user": ... }`).
fn parse_sign_up(raw: &str, now: i64) -> Result<SignUpOutcome, SessionError> {
    let value: Value = decode_body(200, raw)?;
    if value.get("access_token").is_some() {
        let token: TokenResponse = decode_body(200, raw)?;
        let session = token.into_session(now)?;
        return Ok(SignUpOutcome { user: Some(session.user.clone()), session: Some(session) });
    }
    let user_value = value.get("user").cloned().unwrap_or(value);
    let user = serde_json::from_value::<User>(user_value).ok();
    Ok(SignUpOutcome { user, session: None })
}

// =============================================================================
// BACKEND
// =============================================================================

#[async_trait::async_trait]
impl SessionBackend for ProviderBackend {
    fn flow(&self) -> AuthFlow {
        AuthFlow::Delegated
    }

    async fn restore(&self, _seed: Option<Session>) -> Result<Option<Session>, SessionError> {
        let _refreshing = self.refreshing.lock().await;
        let record = self.record().clone();
        let Some(session) = record else {
            return Ok(None);
        };

        let now = unix_now();
        let due = session.expires_at.is_some_and(|at| at - REFRESH_MARGIN_SECS <= now);
        if !due {
            return Ok(Some(session));
        }
        let Some(refresh_token) = session.refresh_token.clone() else {
            info!("provider session expired without refresh token");
            self.replace_if_current(&session.credential, None, SessionEventKind::SignedOut);
            return Ok(None);
        };

        match self.exchange_refresh(&refresh_token).await {
            Ok(fresh) => {
                if !self.replace_if_current(&session.credential, Some(fresh.clone()), SessionEventKind::TokenRefreshed) {
                    return Ok(self.record().clone());
                }
                info!(user_id = %fresh.user.id, "provider session refreshed");
                Ok(Some(fresh))
            }
            Err(SessionError::Credential(message)) => {
                warn!(reason = %message, "provider rejected refresh token");
                self.replace_if_current(&session.credential, None, SessionEventKind::SignedOut);
                Ok(None)
            }
            Err(error) if !session.is_expired(now) => {
                warn!(%error, "refresh failed; using unexpired session");
                Ok(Some(session))
            }
            Err(error) => Err(error),
        }
    }

    async fn sign_in(&self, identifier: &str, secret: &str) -> Result<Session, SessionError> {
        let body = PasswordBody { email: identifier, password: secret };
        let raw = self.send(Method::POST, "/token?grant_type=password", None, Some(&body)).await?;
        let token: TokenResponse = decode_body(200, &raw)?;
        token.into_session(unix_now())
    }

    async fn sign_up(&self, identifier: &str, secret: &str) -> Result<SignUpOutcome, SessionError> {
        let body = PasswordBody { email: identifier, password: secret };
        let raw = self.send(Method::POST, "/signup", None, Some(&body)).await?;
        parse_sign_up(&raw, unix_now())
    }

    async fn sign_out(&self, credential: &Credential) -> Result<(), SessionError> {
        let result = self.send::<()>(Method::POST, "/logout", Some(credential), None).await.map(drop);

        // The local record goes regardless of what the provider said, unless
        // a newer session replaced it while the call was in flight.
        let mut current = self.record();
        if current.as_ref().is_none_or(|live| live.credential == *credential) {
            self.store_record(&mut current, None);
        }
        result
    }

    async fn request_password_reset(&self, identifier: &str) -> Result<(), SessionError> {
        self.send(Method::POST, "/recover", None, Some(&RecoverBody { email: identifier })).await?;
        Ok(())
    }

    async fn confirm_password_reset(&self, token: &str, new_secret: &str) -> Result<(), SessionError> {
        let recovery = Credential::new(token);
        let raw = self.send(Method::PUT, "/user", Some(&recovery), Some(&UpdatePasswordBody { password: new_secret })).await?;

        // Refresh the user on a live session for the same account.
        if let Ok(user) = serde_json::from_str::<User>(&raw) {
            let mut current = self.record();
            if let Some(session) = current.clone().filter(|session| session.user.id == user.id) {
                let session = Some(Session { user, ..session });
                self.store_record(&mut current, session.clone());
                let _ = self.events.send(SessionEvent { kind: SessionEventKind::UserUpdated, session });
            }
        }
        Ok(())
    }

    fn adopt(&self, session: &Session) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        self.store_record(&mut current, Some(session.clone()));
    }

    fn discard(&self) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        self.store_record(&mut current, None);
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<SessionEvent>> {
        Some(self.events.subscribe())
    }
}

#[cfg(test)]
#[path = "provider_test.rs"]
mod tests;
