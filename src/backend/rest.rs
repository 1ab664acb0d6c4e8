//! Token-backed REST flow against the application API.
//!
//! Endpoints live under the versioned API base:
//! `POST /auth/login`, `/auth/register`, `/auth/logout`, `/auth/reset-password`
//! and `/auth/reset-password/confirm`. A persisted token is re-validated with
//! `GET {profile_path}` when one is configured.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::http::{auth_response_text, build_client, decode_body, failure_message, join_url};
use super::{AuthFlow, SessionBackend, SignUpOutcome};
use crate::config::Timeouts;
use crate::error::SessionError;
use crate::session::{Credential, Session, User};

pub struct RestBackend {
    http: reqwest::Client,
    base_url: String,
    profile_path: Option<String>,
}

impl RestBackend {
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, profile_path: Option<String>, timeouts: Timeouts) -> Result<Self, SessionError> {
        Ok(Self {
            http: build_client(timeouts)?,
            base_url: base_url.trim_end_matches('/').to_owned(),
            profile_path: profile_path.filter(|path| !path.trim().is_empty()),
        })
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    async fn post_auth<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<String, SessionError> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| SessionError::from_transport(&e))?;
        auth_response_text(response).await
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
struct CredentialsBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct ResetRequestBody<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct ResetConfirmBody<'a> {
    token: &'a str,
    new_password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
    user: User,
}

#[derive(Deserialize)]
struct RegisterResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    user: Option<User>,
}

fn session_from_login(body: &str) -> Result<Session, SessionError> {
    let login: LoginResponse = decode_body(200, body)?;
    let credential = Credential::new(login.token);
    if credential.is_empty() {
        return Err(SessionError::Api { status: 200, message: "login response carried no token".to_owned() });
    }
    Ok(Session::new(login.user, credential))
}

fn outcome_from_register(body: &str) -> Result<SignUpOutcome, SessionError> {
    let register: RegisterResponse = decode_body(200, body)?;
    let session = match (register.token, register.user.clone()) {
        (Some(token), Some(user)) if !token.trim().is_empty() => Some(Session::new(user, Credential::new(token))),
        _ => None,
    };
    Ok(SignUpOutcome { user: register.user, session })
}

// =============================================================================
// BACKEND
// =============================================================================

#[async_trait::async_trait]
impl SessionBackend for RestBackend {
    fn flow(&self) -> AuthFlow {
        AuthFlow::TokenBacked
    }

    async fn restore(&self, seed: Option<Session>) -> Result<Option<Session>, SessionError> {
        let Some(seed) = seed else {
            return Ok(None);
        };
        let Some(profile_path) = &self.profile_path else {
            return Ok(Some(seed));
        };

        let response = self
            .http
            .get(self.url(profile_path))
            .header(reqwest::header::AUTHORIZATION, seed.credential.bearer())
            .send()
            .await
            .map_err(|e| SessionError::from_transport(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(Some(seed));
        }
        let body = response.text().await.unwrap_or_default();
        let message = failure_message(status.as_u16(), &body);
        if status == StatusCode::UNAUTHORIZED {
            return Err(SessionError::Unauthorized(message));
        }
        Err(SessionError::Api { status: status.as_u16(), message })
    }

    async fn sign_in(&self, identifier: &str, secret: &str) -> Result<Session, SessionError> {
        let body = self.post_auth("/auth/login", &CredentialsBody { email: identifier, password: secret }).await?;
        session_from_login(&body)
    }

    async fn sign_up(&self, identifier: &str, secret: &str) -> Result<SignUpOutcome, SessionError> {
        let body = self.post_auth("/auth/register", &CredentialsBody { email: identifier, password: secret }).await?;
        outcome_from_register(&body)
    }

    async fn sign_out(&self, credential: &Credential) -> Result<(), SessionError> {
        let response = self
            .http
            .post(self.url("/auth/logout"))
            .header(reqwest::header::AUTHORIZATION, credential.bearer())
            .send()
            .await
            .map_err(|e| SessionError::from_transport(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(SessionError::Api { status: status.as_u16(), message: failure_message(status.as_u16(), &body) })
    }

    async fn request_password_reset(&self, identifier: &str) -> Result<(), SessionError> {
        self.post_auth("/auth/reset-password", &ResetRequestBody { email: identifier }).await?;
        Ok(())
    }

    async fn confirm_password_reset(&self, token: &str, new_secret: &str) -> Result<(), SessionError> {
        self.post_auth("/auth/reset-password/confirm", &ResetConfirmBody { token, new_password: new_secret })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "rest_test.rs"]
mod tests;
