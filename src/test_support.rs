//! Shared fixtures for unit tests: in-process HTTP servers and a scripted backend.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};

use crate::backend::{AuthFlow, SessionBackend, SessionEvent, SignUpOutcome};
use crate::error::SessionError;
use crate::session::{Credential, Session, User};

// =============================================================================
// HTTP
// =============================================================================

/// Serve `router` on an ephemeral localhost port and return its base URL.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A localhost URL nothing is listening on.
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub fn session_for(id: &str, token: &str) -> Session {
    Session::new(User::new(id).with_email(format!("{id}@example.com")), Credential::new(token))
}

// =============================================================================
// MOCK BACKEND
// =============================================================================

type SignInReply = Result<Session, SessionError>;

/// Backend whose answers are scripted by the test.
///
/// Sign-in replies can be queued as oneshot channels so a test controls the
/// order in which overlapping calls complete.
pub struct MockBackend {
    flow: AuthFlow,
    calls: Mutex<Vec<String>>,
    sign_in_queue: Mutex<VecDeque<oneshot::Receiver<SignInReply>>>,
    sign_in_reply: Mutex<Option<SignInReply>>,
    restore_reply: Mutex<Option<Result<Option<Session>, SessionError>>>,
    sign_up_reply: Mutex<Result<SignUpOutcome, SessionError>>,
    sign_out_reply: Mutex<Result<(), SessionError>>,
    events: Option<broadcast::Sender<SessionEvent>>,
}

impl MockBackend {
    pub fn token_backed() -> Self {
        Self::with_flow(AuthFlow::TokenBacked, None)
    }

    pub fn delegated() -> Self {
        let (events, _) = broadcast::channel(16);
        Self::with_flow(AuthFlow::Delegated, Some(events))
    }

    fn with_flow(flow: AuthFlow, events: Option<broadcast::Sender<SessionEvent>>) -> Self {
        Self {
            flow,
            calls: Mutex::new(Vec::new()),
            sign_in_queue: Mutex::new(VecDeque::new()),
            sign_in_reply: Mutex::new(None),
            restore_reply: Mutex::new(None),
            sign_up_reply: Mutex::new(Ok(SignUpOutcome::default())),
            sign_out_reply: Mutex::new(Ok(())),
            events,
        }
    }

    /// Queue a deferred sign-in reply; the next `sign_in` waits on it.
    pub fn queue_sign_in(&self) -> oneshot::Sender<SignInReply> {
        let (tx, rx) = oneshot::channel();
        self.sign_in_queue.lock().unwrap().push_back(rx);
        tx
    }

    /// Immediate reply for every unqueued `sign_in`.
    pub fn respond_sign_in(&self, reply: SignInReply) {
        *self.sign_in_reply.lock().unwrap() = Some(reply);
    }

    /// Reply for `restore`. Unset means "echo the seed".
    pub fn respond_restore(&self, reply: Result<Option<Session>, SessionError>) {
        *self.restore_reply.lock().unwrap() = Some(reply);
    }

    pub fn respond_sign_up(&self, reply: Result<SignUpOutcome, SessionError>) {
        *self.sign_up_reply.lock().unwrap() = reply;
    }

    pub fn respond_sign_out(&self, reply: Result<(), SessionError>) {
        *self.sign_out_reply.lock().unwrap() = reply;
    }

    pub fn emit(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|call| call.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl SessionBackend for MockBackend {
    fn flow(&self) -> AuthFlow {
        self.flow
    }

    async fn restore(&self, seed: Option<Session>) -> Result<Option<Session>, SessionError> {
        self.record("restore".to_owned());
        let reply = self.restore_reply.lock().unwrap().clone();
        reply.unwrap_or(Ok(seed))
    }

    async fn sign_in(&self, identifier: &str, _secret: &str) -> Result<Session, SessionError> {
        self.record(format!("sign_in:{identifier}"));
        let queued = self.sign_in_queue.lock().unwrap().pop_front();
        if let Some(rx) = queued {
            return rx.await.unwrap_or(Err(SessionError::Network("reply dropped".to_owned())));
        }
        let reply = self.sign_in_reply.lock().unwrap().clone();
        reply.unwrap_or_else(|| Err(SessionError::Credential("no scripted reply".to_owned())))
    }

    async fn sign_up(&self, identifier: &str, _secret: &str) -> Result<SignUpOutcome, SessionError> {
        self.record(format!("sign_up:{identifier}"));
        self.sign_up_reply.lock().unwrap().clone()
    }

    async fn sign_out(&self, credential: &Credential) -> Result<(), SessionError> {
        self.record(format!("sign_out:{}", credential.as_str()));
        self.sign_out_reply.lock().unwrap().clone()
    }

    async fn request_password_reset(&self, identifier: &str) -> Result<(), SessionError> {
        self.record(format!("reset_request:{identifier}"));
        Ok(())
    }

    async fn confirm_password_reset(&self, token: &str, _new_secret: &str) -> Result<(), SessionError> {
        self.record(format!("reset_confirm:{token}"));
        Ok(())
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<SessionEvent>> {
        self.events.as_ref().map(broadcast::Sender::subscribe)
    }
}

/// Poll until `backend` has recorded at least `count` calls starting with `prefix`.
pub async fn wait_for_calls(backend: &MockBackend, prefix: &str, count: usize) {
    for _ in 0..200 {
        if backend.call_count(prefix) >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {count} {prefix} calls; saw {:?}", backend.calls());
}

/// Poll until `check` holds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}
