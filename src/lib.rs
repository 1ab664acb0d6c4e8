//! # fitsession
//!
//! Client-side session management for the fitness tracker.
//!
//! A single [`SessionManager`] owns the authentication state of one client
//! and drives it through sign-in, sign-up, sign-out and password reset
//! against one of two backends: the application's own token-issuing REST API
//! ([`backend::rest`]) or a delegated auth provider ([`backend::provider`]).
//! UI code reads state through [`SessionManager::subscribe`] and calls the
//! API through [`ApiClient`], which injects the bearer credential and turns
//! `401` responses into a forced sign-out.

pub mod backend;
pub mod config;
pub mod error;
pub mod manager;
pub mod net;
pub mod session;
pub mod store;
pub mod validate;
pub mod workout;

#[cfg(test)]
mod test_support;

pub use backend::{AuthFlow, SessionBackend, SessionEvent, SessionEventKind, SignUpOutcome};
pub use config::{BackendKind, SessionConfig};
pub use error::SessionError;
pub use manager::{ManagerOptions, SessionManager};
pub use net::api::ApiClient;
pub use session::{AuthState, AuthStatus, Credential, PendingReset, Session, User};
pub use store::{FileStore, MemoryStore, SessionStore};
