//! Session manager: the single writer of the client's authentication state.
//!
//! ARCHITECTURE
//! ============
//! One [`SessionManager`] per client. It is cheap to clone; all clones share
//! the same state. Consumers observe [`AuthState`] snapshots through
//! [`SessionManager::subscribe`] and never mutate them.
//!
//! ```text
//!   UI / CLI ──► SessionManager ──► SessionBackend (REST | provider)
//!                  │    ▲                 │
//!                  │    └── listener ◄────┘ session events
//!                  ▼
//!             SessionStore (token, user)
//! ```
//!
//! ORDERING
//! ========
//! Each operation kind carries a monotonically increasing sequence number.
//! A completion applies only if no newer operation of the same kind started
//! while it was in flight; otherwise it is discarded and reported as
//! [`SessionError::Superseded`]. Sign-out advances both the sign-in and
//! sign-up sequences. Provider events advance an epoch so that a notification
//! which arrived during a call wins over that call's late result.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{self, AuthFlow, SessionBackend, SessionEvent, SignUpOutcome};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::session::{AuthState, AuthStatus, Credential, Session, User, unix_now};
use crate::store::{FileStore, SessionStore, TOKEN_KEY, USER_KEY, load_json, save_json};
use crate::validate;

/// Behaviour switches that differ between deployments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Sign the new account in when the backend returns a session from sign-up.
    pub signup_establishes_session: bool,
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<dyn SessionBackend>,
    store: Arc<dyn SessionStore>,
    state: watch::Sender<AuthState>,
    sign_in_seq: AtomicU64,
    sign_up_seq: AtomicU64,
    epoch: AtomicU64,
    options: ManagerOptions,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let listener = self.listener.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = listener.take() {
            handle.abort();
        }
    }
}

impl SessionManager {
    #[must_use]
    pub fn new(backend: Arc<dyn SessionBackend>, store: Arc<dyn SessionStore>, options: ManagerOptions) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self {
            inner: Arc::new(Inner {
                backend,
                store,
                state,
                sign_in_seq: AtomicU64::new(0),
                sign_up_seq: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
                options,
                listener: Mutex::new(None),
            }),
        }
    }

    /// Compose a manager from configuration: file storage plus the configured backend.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] when the backend cannot be built.
    pub fn from_config(config: &SessionConfig) -> Result<Self, SessionError> {
        let store: Arc<dyn SessionStore> = Arc::new(FileStore::new(&config.store_dir));
        let backend = backend::from_config(config, Arc::clone(&store))?;
        let options = ManagerOptions { signup_establishes_session: config.signup_establishes_session };
        Ok(Self::new(backend, store, options))
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Current snapshot.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    /// The signed-in user, when authenticated.
    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.inner.state.borrow().user().cloned()
    }

    /// Bearer credential for outgoing requests, when a live session exists.
    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        let state = self.inner.state.borrow();
        state
            .session
            .as_ref()
            .filter(|session| !session.is_expired(unix_now()) && !session.credential.is_empty())
            .map(|session| session.credential.clone())
    }

    #[must_use]
    pub fn flow(&self) -> AuthFlow {
        self.inner.backend.flow()
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Recover the session left by a previous run.
    ///
    /// Token-backed flows read the persisted `token` and `user`; a missing or
    /// malformed half means no session and the leftovers are removed.
    /// Delegated flows ask the provider. A rejected credential clears storage;
    /// a transport failure leaves storage intact for the next attempt.
    /// Sign-in, sign-up, sign-out or a provider event that happens meanwhile
    /// takes precedence over the restored result.
    pub async fn initialize(&self) -> AuthState {
        self.ensure_listener();
        let started = self.generation();
        let token_backed = self.flow() == AuthFlow::TokenBacked;
        let seed = if token_backed { self.load_seed() } else { None };
        let had_seed = seed.is_some();

        self.inner.state.send_modify(|state| state.status = AuthStatus::Loading);
        let restored = self.inner.backend.restore(seed).await;

        let applied = self.commit(
            || self.generation() == started,
            |state| match restored {
                Ok(Some(session)) if session.is_valid(unix_now()) => {
                    info!(user_id = %session.user.id, "session restored");
                    *state = AuthState::authenticated(session);
                }
                Ok(_) => {
                    if token_backed && had_seed {
                        self.clear_storage();
                    }
                    *state = AuthState::default();
                }
                Err(SessionError::Unauthorized(reason)) => {
                    info!(%reason, "persisted session rejected");
                    if token_backed {
                        self.clear_storage();
                    }
                    *state = AuthState::default();
                }
                Err(error) => {
                    warn!(%error, "session restore failed; starting signed out");
                    *state = AuthState::default();
                }
            },
        );
        if !applied {
            debug!("restored session discarded; state changed during initialize");
        }
        self.state()
    }

    // =========================================================================
    // SIGN IN / SIGN UP
    // =========================================================================

    /// Exchange credentials for a session.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Validation`] for blank fields; state is untouched.
    /// - [`SessionError::Superseded`] when a newer sign-in or a sign-out
    ///   started before this one completed; state is untouched.
    /// - The backend's error otherwise; status becomes `Error` with the
    ///   reason as the displayable message and any prior session is kept.
    pub async fn sign_in(&self, identifier: &str, secret: &str) -> Result<Session, SessionError> {
        let identifier = validate::require_credentials(identifier, secret)?;
        let seq = self.inner.sign_in_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        self.begin_loading();

        let result = self.inner.backend.sign_in(identifier, secret).await;
        let latest = || self.inner.sign_in_seq.load(Ordering::SeqCst) == seq;

        match result {
            Ok(session) => {
                if !self.commit(latest, |state| self.adopt(state, &session, epoch)) {
                    debug!(seq, "sign-in result discarded; superseded");
                    return Err(SessionError::Superseded);
                }
                info!(user_id = %session.user.id, "signed in");
                Ok(session)
            }
            Err(error) => {
                if !self.commit(latest, |state| fail(state, &error)) {
                    debug!(seq, "sign-in failure discarded; superseded");
                    return Err(SessionError::Superseded);
                }
                warn!(code = error.error_code(), reason = %error, "sign-in failed");
                Err(error)
            }
        }
    }

    /// Create an account.
    ///
    /// The session a backend returns is adopted only when
    /// [`ManagerOptions::signup_establishes_session`] is set; otherwise the
    /// user stays signed out (or keeps the session they already had).
    ///
    /// # Errors
    ///
    /// Same classes as [`Self::sign_in`].
    pub async fn sign_up(&self, identifier: &str, secret: &str) -> Result<SignUpOutcome, SessionError> {
        let identifier = validate::require_credentials(identifier, secret)?;
        let seq = self.inner.sign_up_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        self.begin_loading();

        let result = self.inner.backend.sign_up(identifier, secret).await;
        let latest = || self.inner.sign_up_seq.load(Ordering::SeqCst) == seq;

        match result {
            Ok(outcome) => {
                let establish = self.inner.options.signup_establishes_session;
                let committed = self.commit(latest, |state| match &outcome.session {
                    Some(session) if establish => self.adopt(state, session, epoch),
                    _ => settle(state),
                });
                if !committed {
                    debug!(seq, "sign-up result discarded; superseded");
                    return Err(SessionError::Superseded);
                }
                info!(issued_session = outcome.session.is_some(), establish, "account created");
                Ok(outcome)
            }
            Err(error) => {
                if !self.commit(latest, |state| fail(state, &error)) {
                    debug!(seq, "sign-up failure discarded; superseded");
                    return Err(SessionError::Superseded);
                }
                warn!(code = error.error_code(), reason = %error, "sign-up failed");
                Err(error)
            }
        }
    }

    // =========================================================================
    // SIGN OUT
    // =========================================================================

    /// End the session locally and remotely.
    ///
    /// Local state and storage are cleared whatever the backend answers, and
    /// calling this while already signed out is a no-op beyond clearing.
    /// Any sign-in or sign-up still in flight is superseded.
    ///
    /// # Errors
    ///
    /// Returns the remote invalidation failure, after local cleanup.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        self.supersede_pending();
        let credential = self.inner.state.borrow().session.as_ref().map(|session| session.credential.clone());
        self.begin_loading();

        let result = match &credential {
            Some(credential) => self.inner.backend.sign_out(credential).await,
            None => Ok(()),
        };
        if let Err(error) = &result {
            warn!(%error, "remote sign-out failed; clearing local session anyway");
        }

        let mut cleared = false;
        self.inner.state.send_modify(|state| {
            // A session established after sign-out started is not ours to end.
            let ours = match (&state.session, &credential) {
                (None, _) => true,
                (Some(session), Some(ended)) => session.credential == *ended,
                (Some(_), None) => false,
            };
            if ours {
                self.clear_in_place(state);
                cleared = true;
            } else {
                settle(state);
            }
        });
        if cleared {
            info!("signed out");
        }
        result
    }

    /// Force sign-out after a downstream service rejected `rejected`.
    ///
    /// Only clears when `rejected` is still the live credential, so a stale
    /// response cannot end a newer session. Returns whether it cleared.
    pub fn handle_unauthorized(&self, rejected: &Credential) -> bool {
        let cleared = self.inner.state.send_if_modified(|state| {
            let live = state.session.as_ref().is_some_and(|session| session.credential == *rejected);
            if live {
                self.supersede_pending();
                self.clear_in_place(state);
            }
            live
        });
        if cleared {
            info!("credential rejected downstream; signed out");
        } else {
            debug!("ignoring 401 for a credential that is no longer current");
        }
        cleared
    }

    // =========================================================================
    // PASSWORD RESET
    // =========================================================================

    /// Ask for a reset link. Never changes session state.
    ///
    /// # Errors
    ///
    /// [`SessionError::Validation`] for a blank identifier, else the backend's error.
    pub async fn request_password_reset(&self, identifier: &str) -> Result<(), SessionError> {
        let identifier = validate::require_identifier(identifier)?;
        self.inner.backend.request_password_reset(identifier).await?;
        info!("password reset requested");
        Ok(())
    }

    /// Set a new secret with a reset token. Never signs in.
    ///
    /// # Errors
    ///
    /// [`SessionError::Validation`] for a blank token or short secret (no
    /// request is made), else the backend's error.
    pub async fn confirm_password_reset(&self, token: &str, new_secret: &str) -> Result<(), SessionError> {
        let token = validate::require_reset_token(token)?;
        validate::check_new_secret(new_secret)?;
        self.inner.backend.confirm_password_reset(token, new_secret).await?;
        info!("password reset confirmed");
        Ok(())
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    /// Sign-in sequence, sign-up sequence and event epoch, in that order.
    fn generation(&self) -> [u64; 3] {
        [
            self.inner.sign_in_seq.load(Ordering::SeqCst),
            self.inner.sign_up_seq.load(Ordering::SeqCst),
            self.inner.epoch.load(Ordering::SeqCst),
        ]
    }

    fn supersede_pending(&self) {
        self.inner.sign_in_seq.fetch_add(1, Ordering::SeqCst);
        self.inner.sign_up_seq.fetch_add(1, Ordering::SeqCst);
    }

    /// Run `update` under the state lock if `still_current` holds there.
    ///
    /// Checking inside the lock keeps a provider event or a newer call from
    /// slipping in between the check and the write.
    fn commit(&self, still_current: impl FnOnce() -> bool, update: impl FnOnce(&mut AuthState)) -> bool {
        self.inner.state.send_if_modified(|state| {
            if !still_current() {
                return false;
            }
            update(state);
            true
        })
    }

    fn begin_loading(&self) {
        self.inner.state.send_modify(|state| {
            state.status = AuthStatus::Loading;
            state.error = None;
        });
    }

    /// Adopt `session` unless a provider event has decided the state since `epoch`.
    fn adopt(&self, state: &mut AuthState, session: &Session, epoch: u64) {
        if self.inner.epoch.load(Ordering::SeqCst) != epoch {
            debug!("session event arrived during call; keeping event state");
            settle(state);
            return;
        }
        if self.flow() == AuthFlow::TokenBacked {
            self.persist(session);
        }
        self.inner.backend.adopt(session);
        *state = AuthState::authenticated(session.clone());
    }

    fn clear_in_place(&self, state: &mut AuthState) {
        if self.flow() == AuthFlow::TokenBacked {
            self.clear_storage();
        }
        self.inner.backend.discard();
        *state = AuthState::default();
    }

    fn persist(&self, session: &Session) {
        let store = self.inner.store.as_ref();
        let saved = store
            .save(TOKEN_KEY, session.credential.as_str())
            .and_then(|()| save_json(store, USER_KEY, &session.user));
        if let Err(error) = saved {
            warn!(%error, "session not persisted; it will not survive a restart");
        }
    }

    fn clear_storage(&self) {
        for key in [TOKEN_KEY, USER_KEY] {
            if let Err(error) = self.inner.store.remove(key) {
                warn!(key, %error, "failed to clear session storage");
            }
        }
    }

    fn load_seed(&self) -> Option<Session> {
        let store = self.inner.store.as_ref();
        let token = match store.load(TOKEN_KEY) {
            Ok(token) => token.filter(|token| !token.trim().is_empty()),
            Err(error) => {
                warn!(%error, "session storage read failed");
                None
            }
        };
        let user = load_json::<User>(store, USER_KEY).filter(|user| !user.id.trim().is_empty());

        match (token, user) {
            (Some(token), Some(user)) => Some(Session::new(user, Credential::new(token))),
            (None, None) if matches!(store.load(USER_KEY), Ok(None)) => None,
            _ => {
                debug!("discarding incomplete persisted session");
                self.clear_storage();
                None
            }
        }
    }

    /// Apply a provider notification. Newer than anything in flight.
    fn apply_event(&self, event: SessionEvent) {
        debug!(kind = ?event.kind, "session event");
        let next = match event.session {
            Some(session) if session.is_valid(unix_now()) => AuthState::authenticated(session),
            _ => AuthState::default(),
        };
        self.inner.state.send_modify(|state| {
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
            *state = next;
        });
    }

    fn ensure_listener(&self) {
        let mut slot = self.inner.listener.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }
        let Some(mut events) = self.inner.backend.subscribe() else {
            return;
        };
        let weak = Arc::downgrade(&self.inner);
        *slot = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        SessionManager { inner }.apply_event(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }
}

/// Leave `Loading` for whatever the current session implies.
fn settle(state: &mut AuthState) {
    state.status = if state.session.as_ref().is_some_and(|session| session.is_valid(unix_now())) {
        AuthStatus::Authenticated
    } else {
        AuthStatus::Unauthenticated
    };
}

fn fail(state: &mut AuthState, error: &SessionError) {
    state.status = AuthStatus::Error;
    state.error = Some(error.to_string());
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;
