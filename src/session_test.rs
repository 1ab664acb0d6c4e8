use super::*;

// =============================================================================
// User
// =============================================================================

#[test]
fn user_accepts_numeric_id_from_rest_backend() {
    let user: User =
        serde_json::from_value(serde_json::json!({ "id": 42, "email": "a@example.com", "name": "Ada" })).unwrap();
    assert_eq!(user.id, "42");
    assert_eq!(user.email.as_deref(), Some("a@example.com"));
}

#[test]
fn user_accepts_string_id_and_keeps_unknown_fields() {
    let user: User = serde_json::from_value(serde_json::json!({
        "id": "8d0fbd6e-3b8e-4c5e-9a57-5d3c1e0f2a11",
        "email": "b@example.com",
        "role": "authenticated",
        "app_metadata": { "provider": "email" }
    }))
    .unwrap();
    assert_eq!(user.id, "8d0fbd6e-3b8e-4c5e-9a57-5d3c1e0f2a11");
    assert_eq!(user.extra["role"], "authenticated");
    assert_eq!(user.extra["app_metadata"]["provider"], "email");
}

#[test]
fn user_rejects_missing_id() {
    let result = serde_json::from_value::<User>(serde_json::json!({ "email": "c@example.com" }));
    assert!(result.is_err());
}

#[test]
fn display_name_prefers_name_then_email_then_id() {
    let mut user = User::new("7").with_email("d@example.com");
    assert_eq!(user.display_name(), "d@example.com");
    user.name = Some("  ".to_owned());
    assert_eq!(user.display_name(), "d@example.com");
    user.name = Some("Dana".to_owned());
    assert_eq!(user.display_name(), "Dana");
    assert_eq!(User::new("7").display_name(), "7");
}

// =============================================================================
// Credential
// =============================================================================

#[test]
fn credential_debug_is_redacted() {
    let credential = Credential::new("super-secret-token");
    let debug = format!("{credential:?}");
    assert!(!debug.contains("super-secret-token"));
}

#[test]
fn credential_bearer_header_value() {
    assert_eq!(Credential::new("abc").bearer(), "Bearer abc");
}

#[test]
fn credential_serializes_transparently() {
    let json = serde_json::to_string(&Credential::new("abc")).unwrap();
    assert_eq!(json, "\"abc\"");
}

// =============================================================================
// Session
// =============================================================================

#[test]
fn session_without_expiry_never_expires() {
    let session = Session::new(User::new("1"), Credential::new("tok"));
    assert!(!session.is_expired(i64::MAX));
    assert!(session.is_valid(unix_now()));
}

#[test]
fn session_expires_at_reported_time() {
    let mut session = Session::new(User::new("1"), Credential::new("tok"));
    session.expires_at = Some(1_000);
    assert!(!session.is_expired(999));
    assert!(session.is_expired(1_000));
    assert!(!session.is_valid(1_001));
}

#[test]
fn session_with_blank_credential_is_invalid() {
    let session = Session::new(User::new("1"), Credential::new("  "));
    assert!(!session.is_valid(0));
}

// =============================================================================
// AuthState
// =============================================================================

#[test]
fn auth_state_default_is_unauthenticated() {
    let state = AuthState::default();
    assert_eq!(state.status, AuthStatus::Unauthenticated);
    assert!(state.session.is_none());
    assert!(state.error.is_none());
    assert!(!state.is_authenticated());
}

#[test]
fn auth_state_hides_user_when_session_expired() {
    let mut session = Session::new(User::new("1"), Credential::new("tok"));
    session.expires_at = Some(unix_now() - 60);
    let state = AuthState::authenticated(session);
    assert!(!state.is_authenticated());
    assert!(state.user().is_none());
}

#[test]
fn auth_state_exposes_user_when_authenticated() {
    let state = AuthState::authenticated(Session::new(User::new("1"), Credential::new("tok")));
    assert_eq!(state.user().map(|user| user.id.as_str()), Some("1"));
}

#[test]
fn auth_status_displays_lowercase() {
    assert_eq!(AuthStatus::Authenticated.to_string(), "authenticated");
    assert_eq!(AuthStatus::Error.to_string(), "error");
}

// =============================================================================
// PendingReset
// =============================================================================

#[test]
fn pending_reset_rejects_empty_token() {
    let err = PendingReset::new("   ").unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
}

#[test]
fn pending_reset_from_query_link() {
    let reset = PendingReset::from_link("https://app.example.com/reset-password?token=abc123").unwrap();
    assert_eq!(reset.token, "abc123");
}

#[test]
fn pending_reset_from_fragment_link() {
    let reset =
        PendingReset::from_link("https://app.example.com/reset#access_token=rec-tok&type=recovery").unwrap();
    assert_eq!(reset.token, "rec-tok");
}

#[test]
fn pending_reset_accepts_bare_token() {
    let reset = PendingReset::from_link("  deadbeef  ").unwrap();
    assert_eq!(reset.token, "deadbeef");
}

#[test]
fn pending_reset_link_without_token_is_validation_error() {
    let err = PendingReset::from_link("https://app.example.com/reset-password").unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
}
