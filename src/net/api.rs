//! Authenticated JSON client for the application API.
//!
//! Every request carries `Authorization: Bearer <credential>` when the
//! manager holds a live session. A `401` answer forces sign-out, but only if
//! the rejected credential is still the current one.

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::http::{build_client, decode_body, failure_message, join_url};
use crate::config::Timeouts;
use crate::error::SessionError;
use crate::manager::SessionManager;

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: SessionManager,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeouts: Timeouts, session: SessionManager) -> Result<Self, SessionError> {
        Ok(Self { http: build_client(timeouts)?, base_url: base_url.trim_end_matches('/').to_owned(), session })
    }

    #[must_use]
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SessionError> {
        self.request::<(), T>(Method::GET, path, None).await
    }

    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, SessionError> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, SessionError> {
        self.request(Method::PUT, path, Some(body)).await
    }

    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, SessionError> {
        self.request::<(), T>(Method::DELETE, path, None).await
    }

    /// Send a JSON request and decode the JSON answer. An empty body decodes as `null`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Validation`] when `body` cannot be encoded.
    /// - [`SessionError::Network`] on transport failure or timeout.
    /// - [`SessionError::Unauthorized`] on `401`, after forcing sign-out.
    /// - [`SessionError::Api`] on other non-2xx statuses or an unexpected body.
    pub async fn request<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, SessionError> {
        let url = join_url(&self.base_url, path);
        let credential = self.session.credential();

        let mut request = self.http.request(method.clone(), &url);
        if let Some(credential) = &credential {
            request = request.header(reqwest::header::AUTHORIZATION, credential.bearer());
        }
        if let Some(body) = body {
            let payload = serde_json::to_value(body)
                .map_err(|e| SessionError::Validation(format!("request body could not be encoded: {e}")))?;
            request = request.json(&payload);
        }

        let response = request.send().await.map_err(|e| SessionError::from_transport(&e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| SessionError::from_transport(&e))?;
        debug!(%method, path, status = status.as_u16(), "api request");

        if status == StatusCode::UNAUTHORIZED {
            let message = failure_message(status.as_u16(), &text);
            if let Some(credential) = &credential {
                if self.session.handle_unauthorized(credential) {
                    warn!(path, "session ended by 401");
                }
            }
            return Err(SessionError::Unauthorized(message));
        }
        if !status.is_success() {
            return Err(SessionError::Api { status: status.as_u16(), message: failure_message(status.as_u16(), &text) });
        }

        if text.trim().is_empty() {
            return decode_body(status.as_u16(), "null");
        }
        decode_body(status.as_u16(), &text)
    }

    /// Untyped variant used by ad-hoc callers such as the CLI.
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn request_value(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, SessionError> {
        self.request(method, path, body).await
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
