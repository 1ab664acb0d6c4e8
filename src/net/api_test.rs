use std::sync::Arc;

use axum::Json;
use axum::http::{HeaderMap, StatusCode as HttpStatus};
use axum::routing::{delete, get, post};
use serde_json::json;

use super::*;
use crate::manager::ManagerOptions;
use crate::session::{AuthState, Session};
use crate::store::{MemoryStore, SessionStore, TOKEN_KEY, USER_KEY};
use crate::test_support::{MockBackend, serve, session_for, unreachable_url};

async fn signed_in(session: Session) -> (SessionManager, Arc<MemoryStore>) {
    let backend = Arc::new(MockBackend::token_backed());
    backend.respond_sign_in(Ok(session));
    let store = Arc::new(MemoryStore::new());
    let manager = SessionManager::new(backend, store.clone(), ManagerOptions::default());
    manager.sign_in("user@example.com", "pw").await.unwrap();
    (manager, store)
}

fn signed_out() -> SessionManager {
    SessionManager::new(Arc::new(MockBackend::token_backed()), Arc::new(MemoryStore::new()), ManagerOptions::default())
}

fn auth_header(headers: &HeaderMap) -> Option<String> {
    headers.get("authorization").and_then(|v| v.to_str().ok()).map(ToOwned::to_owned)
}

#[tokio::test]
async fn get_attaches_bearer_and_decodes_json() {
    let router = axum::Router::new().route(
        "/api/v1/exercises",
        get(|headers: HeaderMap| async move { Json(json!({"auth": auth_header(&headers)})) }),
    );
    let base = serve(router).await;
    let (manager, _) = signed_in(session_for("1", "jwt-1")).await;
    let api = ApiClient::new(&format!("{base}/api/v1"), Timeouts::default(), manager).unwrap();

    let body: Value = api.get("/exercises").await.unwrap();
    assert_eq!(body, json!({"auth": "Bearer jwt-1"}));
}

#[tokio::test]
async fn signed_out_requests_carry_no_authorization() {
    let router = axum::Router::new()
        .route("/ping", get(|headers: HeaderMap| async move { Json(json!({"auth": auth_header(&headers)})) }));
    let base = serve(router).await;
    let api = ApiClient::new(&base, Timeouts::default(), signed_out()).unwrap();

    let body: Value = api.get("ping").await.unwrap();
    assert_eq!(body, json!({"auth": null}));
}

#[tokio::test]
async fn downstream_401_signs_out_and_clears_storage() {
    let router = axum::Router::new().route(
        "/entries",
        get(|| async { (HttpStatus::UNAUTHORIZED, Json(json!({"error": "Invalid or expired token"}))) }),
    );
    let base = serve(router).await;
    let (manager, store) = signed_in(session_for("1", "jwt-1")).await;
    let api = ApiClient::new(&base, Timeouts::default(), manager.clone()).unwrap();

    let err = api.get::<Value>("/entries").await.unwrap_err();

    assert_eq!(err, SessionError::Unauthorized("Invalid or expired token".to_owned()));
    assert_eq!(manager.state(), AuthState::default());
    assert_eq!(store.load(TOKEN_KEY).unwrap(), None);
    assert_eq!(store.load(USER_KEY).unwrap(), None);
}

#[tokio::test]
async fn post_sends_json_body() {
    let router = axum::Router::new().route(
        "/entries",
        post(|Json(body): Json<Value>| async move { (HttpStatus::CREATED, Json(json!({"echo": body}))) }),
    );
    let base = serve(router).await;
    let (manager, _) = signed_in(session_for("1", "jwt-1")).await;
    let api = ApiClient::new(&base, Timeouts::default(), manager).unwrap();

    let body: Value = api.post("/entries", &json!({"reps": 5})).await.unwrap();
    assert_eq!(body, json!({"echo": {"reps": 5}}));
}

#[tokio::test]
async fn server_error_is_api_error_and_keeps_session() {
    let router = axum::Router::new()
        .route("/entries", get(|| async { (HttpStatus::INTERNAL_SERVER_ERROR, Json(json!({"error": "db down"}))) }));
    let base = serve(router).await;
    let (manager, _) = signed_in(session_for("1", "jwt-1")).await;
    let api = ApiClient::new(&base, Timeouts::default(), manager.clone()).unwrap();

    let err = api.get::<Value>("/entries").await.unwrap_err();

    assert_eq!(err, SessionError::Api { status: 500, message: "db down".to_owned() });
    assert!(err.retryable());
    assert!(manager.state().is_authenticated());
}

#[tokio::test]
async fn empty_body_decodes_as_null() {
    let router = axum::Router::new().route("/entries/1", delete(|| async { HttpStatus::NO_CONTENT }));
    let base = serve(router).await;
    let (manager, _) = signed_in(session_for("1", "jwt-1")).await;
    let api = ApiClient::new(&base, Timeouts::default(), manager).unwrap();

    let body: Option<Value> = api.delete("/entries/1").await.unwrap();
    assert_eq!(body, None);
}

#[tokio::test]
async fn unreachable_api_is_network_error() {
    let base = unreachable_url().await;
    let api = ApiClient::new(&base, Timeouts::default(), signed_out()).unwrap();

    let err = api.request_value(Method::GET, "/exercises", None).await.unwrap_err();
    assert!(matches!(err, SessionError::Network(_)));
    assert!(err.retryable());
}
