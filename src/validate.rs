//! Client-side form guards. Failures here never reach the network.
//!
//! These mirror what the sign-in, registration and reset forms enforce; the
//! backend may apply stricter rules of its own.

use crate::error::SessionError;

/// Minimum length for a new password, counted in characters.
pub const MIN_SECRET_LEN: usize = 8;

/// Require a non-empty identifier. Returns it trimmed.
///
/// # Errors
///
/// Returns [`SessionError::Validation`] when the identifier is blank.
pub fn require_identifier(identifier: &str) -> Result<&str, SessionError> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return Err(SessionError::Validation("Email is required".to_owned()));
    }
    Ok(trimmed)
}

/// Require a non-empty identifier and secret for sign-in and sign-up.
///
/// # Errors
///
/// Returns [`SessionError::Validation`] when either field is blank.
pub fn require_credentials<'a>(identifier: &'a str, secret: &str) -> Result<&'a str, SessionError> {
    let identifier = require_identifier(identifier)?;
    if secret.is_empty() {
        return Err(SessionError::Validation("Password is required".to_owned()));
    }
    Ok(identifier)
}

/// Require a reset token. Returns it trimmed.
///
/// # Errors
///
/// Returns [`SessionError::Validation`] when the token is blank.
pub fn require_reset_token(token: &str) -> Result<&str, SessionError> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return Err(SessionError::Validation("Reset token is missing".to_owned()));
    }
    Ok(trimmed)
}

/// Enforce the minimum new-password length.
///
/// # Errors
///
/// Returns [`SessionError::Validation`] when `secret` is too short.
pub fn check_new_secret(secret: &str) -> Result<(), SessionError> {
    if secret.chars().count() < MIN_SECRET_LEN {
        return Err(SessionError::Validation(format!(
            "Password must be at least {MIN_SECRET_LEN} characters"
        )));
    }
    Ok(())
}

/// The reset form's check: both entries match, then the length rule.
///
/// # Errors
///
/// Returns [`SessionError::Validation`] on mismatch or a short password.
pub fn validate_new_secret(secret: &str, confirmation: &str) -> Result<(), SessionError> {
    if secret != confirmation {
        return Err(SessionError::Validation("Passwords do not match".to_owned()));
    }
    check_new_secret(secret)
}

#[cfg(test)]
#[path = "validate_test.rs"]
mod tests;
