//! HTTP plumbing shared by both backends and the API client.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::Timeouts;
use crate::error::SessionError;

/// Build a client with the configured request and connect timeouts.
///
/// # Errors
///
/// Returns [`SessionError::Config`] if the TLS backend fails to initialise.
pub fn build_client(timeouts: Timeouts) -> Result<reqwest::Client, SessionError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeouts.request_secs))
        .connect_timeout(Duration::from_secs(timeouts.connect_secs))
        .build()
        .map_err(|e| SessionError::Config(format!("http client build failed: {e}")))
}

/// Join a base URL and a path with exactly one slash between them.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Pull a human-readable reason out of an error body.
///
/// Tries `error_description`, `msg`, `message`, then `error` (when it is a
/// string). Falls back to `request failed: <status>`.
#[must_use]
pub fn failure_message(status: u16, body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    parsed
        .as_ref()
        .and_then(|value| {
            ["error_description", "msg", "message", "error"]
                .iter()
                .find_map(|key| value.get(key).and_then(Value::as_str))
        })
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map_or_else(|| format!("request failed: {status}"), ToOwned::to_owned)
}

/// Classify a failed response from an auth endpoint.
///
/// Client errors mean the backend rejected what was submitted; rate limits
/// and server errors are reported as API failures.
#[must_use]
pub fn auth_failure(status: StatusCode, body: &str) -> SessionError {
    let message = failure_message(status.as_u16(), body);
    match status.as_u16() {
        408 | 429 => SessionError::Api { status: status.as_u16(), message },
        400..=499 => SessionError::Credential(message),
        _ => SessionError::Api { status: status.as_u16(), message },
    }
}

/// Read the response body, failing on non-success with [`auth_failure`].
///
/// # Errors
///
/// Returns a transport error when the body cannot be read, or the classified
/// failure for non-2xx statuses.
pub async fn auth_response_text(response: reqwest::Response) -> Result<String, SessionError> {
    let status = response.status();
    let body = response.text().await.map_err(|e| SessionError::from_transport(&e))?;
    if !status.is_success() {
        return Err(auth_failure(status, &body));
    }
    Ok(body)
}

/// Decode a successful response body.
///
/// # Errors
///
/// Returns [`SessionError::Api`] when the body does not match `T`.
pub fn decode_body<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, SessionError> {
    serde_json::from_str(body).map_err(|e| SessionError::Api { status, message: format!("unexpected response: {e}") })
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
