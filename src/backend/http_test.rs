use super::*;

// =============================================================================
// failure_message
// =============================================================================

#[test]
fn failure_message_reads_error_field() {
    assert_eq!(failure_message(400, r#"{"error":"invalid credentials"}"#), "invalid credentials");
}

#[test]
fn failure_message_prefers_error_description() {
    let body = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
    assert_eq!(failure_message(400, body), "Invalid login credentials");
}

#[test]
fn failure_message_reads_msg_field() {
    assert_eq!(failure_message(422, r#"{"code":422,"msg":"User already registered"}"#), "User already registered");
}

#[test]
fn failure_message_ignores_non_string_error() {
    assert_eq!(failure_message(500, r#"{"error":{"code":1}}"#), "request failed: 500");
}

#[test]
fn failure_message_falls_back_for_non_json() {
    assert_eq!(failure_message(502, "<html>bad gateway</html>"), "request failed: 502");
    assert_eq!(failure_message(404, ""), "request failed: 404");
}

// =============================================================================
// auth_failure
// =============================================================================

#[test]
fn auth_failure_client_errors_are_credential_errors() {
    let err = auth_failure(StatusCode::UNAUTHORIZED, r#"{"error":"Invalid email or password"}"#);
    assert_eq!(err, SessionError::Credential("Invalid email or password".to_owned()));
    let err = auth_failure(StatusCode::CONFLICT, r#"{"error":"Email already registered"}"#);
    assert!(matches!(err, SessionError::Credential(_)));
}

#[test]
fn auth_failure_server_errors_are_api_errors() {
    let err = auth_failure(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"Failed to generate token"}"#);
    assert_eq!(err, SessionError::Api { status: 500, message: "Failed to generate token".to_owned() });
}

#[test]
fn auth_failure_rate_limit_is_api_error() {
    let err = auth_failure(StatusCode::TOO_MANY_REQUESTS, "{}");
    assert!(matches!(err, SessionError::Api { status: 429, .. }));
}

// =============================================================================
// join_url / decode_body
// =============================================================================

#[test]
fn join_url_normalises_slashes() {
    assert_eq!(join_url("http://h/api/v1/", "/auth/login"), "http://h/api/v1/auth/login");
    assert_eq!(join_url("http://h/api/v1", "auth/login"), "http://h/api/v1/auth/login");
}

#[test]
fn decode_body_reports_shape_mismatch_as_api_error() {
    let err = decode_body::<Vec<u8>>(200, r#"{"not":"a list"}"#).unwrap_err();
    assert!(matches!(err, SessionError::Api { status: 200, .. }));
}
