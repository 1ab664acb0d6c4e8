//! Session backends: where credentials are exchanged.
//!
//! DESIGN
//! ======
//! The manager depends only on [`SessionBackend`]. Two implementations exist:
//! [`rest::RestBackend`] for the application's own token-issuing API and
//! [`provider::ProviderBackend`] for a delegated auth service that owns
//! credential issuance and refresh and publishes session-change events.
//! Exactly one is selected at composition time by [`from_config`].

pub mod http;
pub mod provider;
pub mod rest;

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::{BackendKind, SessionConfig};
use crate::error::SessionError;
use crate::session::{Credential, Session, User};
use crate::store::SessionStore;

/// How a backend issues and keeps credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFlow {
    /// The client persists the issued token itself.
    TokenBacked,
    /// An external provider owns the session and reports changes.
    Delegated,
}

/// Result of account creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignUpOutcome {
    /// The created account, when the backend echoes it.
    pub user: Option<User>,
    /// Present when the backend signed the new account in immediately.
    pub session: Option<Session>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// Session-change notification from a delegated provider.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    /// The provider's session after the change; `None` means signed out.
    pub session: Option<Session>,
}

/// Credential exchange capability consumed by [`crate::SessionManager`].
#[async_trait::async_trait]
pub trait SessionBackend: Send + Sync {
    fn flow(&self) -> AuthFlow;

    /// Recover the current session.
    ///
    /// Token-backed backends receive the persisted `seed` and re-validate it;
    /// delegated backends ignore it and consult their own session record.
    async fn restore(&self, seed: Option<Session>) -> Result<Option<Session>, SessionError>;

    async fn sign_in(&self, identifier: &str, secret: &str) -> Result<Session, SessionError>;

    async fn sign_up(&self, identifier: &str, secret: &str) -> Result<SignUpOutcome, SessionError>;

    /// Invalidate `credential` remotely.
    async fn sign_out(&self, credential: &Credential) -> Result<(), SessionError>;

    /// Ask for a reset link. Success means "accepted", never "changed".
    async fn request_password_reset(&self, identifier: &str) -> Result<(), SessionError>;

    async fn confirm_password_reset(&self, token: &str, new_secret: &str) -> Result<(), SessionError>;

    /// The manager committed `session` as the live session.
    ///
    /// Called under the manager's state lock, only for a result that was not
    /// superseded. Backends that keep their own session record take it here.
    fn adopt(&self, _session: &Session) {}

    /// The manager ended the live session locally: a sign-out or a credential
    /// rejected downstream. Backends drop any session record they keep.
    fn discard(&self) {}

    /// Session-change notifications, for backends that publish them.
    ///
    /// Only changes originating in the backend itself are published, never
    /// the results of the manager's own calls.
    fn subscribe(&self) -> Option<broadcast::Receiver<SessionEvent>> {
        None
    }
}

/// Build the backend named by `config`.
///
/// `store` is handed to the delegated provider for its own session record.
///
/// # Errors
///
/// Returns [`SessionError::Config`] when provider settings are missing or the
/// HTTP client cannot be built.
pub fn from_config(
    config: &SessionConfig,
    store: Arc<dyn SessionStore>,
) -> Result<Arc<dyn SessionBackend>, SessionError> {
    match config.backend {
        BackendKind::Rest => {
            let backend = rest::RestBackend::new(&config.api_url, config.profile_path.clone(), config.timeouts)?;
            Ok(Arc::new(backend))
        }
        BackendKind::Provider => {
            let provider = config
                .provider
                .as_ref()
                .ok_or_else(|| SessionError::Config("provider backend selected without provider settings".into()))?;
            let backend = provider::ProviderBackend::new(provider, config.timeouts, store)?;
            Ok(Arc::new(backend))
        }
    }
}
