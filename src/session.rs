//! Session lifecycle.
//!
//! The state of a session only ever changes in response to connection-state transitions
//! reported by the transport (or to the session being closed locally). Request failures never
//! move it.

use crate::error::Code;
use crate::proto::ZkError;
use crate::types::KeeperState;
use crate::{Credential, StateEvent};
use parking_lot::{Condvar, Mutex};
use std::{fmt, time::Duration};
use tokio::sync::watch;

/// The connection lifecycle of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected. This is the initial state, and the state the session returns to whenever
    /// the transport loses its connection.
    Disconnected,
    /// A link is being established.
    Connecting,
    /// Connected to a server that is part of the quorum.
    Connected,
    /// Connected to a server that only serves reads.
    ConnectedReadOnly,
    /// The most recently added credential was rejected. The session itself remains usable.
    AuthenticationFailed,
    /// The service expired the session. Terminal.
    Expired,
    /// The session was closed locally. Terminal.
    Closed,
}

impl SessionState {
    /// Whether requests can currently reach the service.
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            SessionState::Connected | SessionState::ConnectedReadOnly
        )
    }

    /// Whether the session can never be used again.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Expired | SessionState::Closed)
    }

    /// The raw code every request submitted in this state fails with, if the state is terminal.
    pub(crate) fn terminal_error(self) -> Option<ZkError> {
        match self {
            SessionState::Expired => Some(ZkError::SessionExpired),
            SessionState::Closed => Some(ZkError::Closing),
            _ => None,
        }
    }

    pub(crate) fn terminal_code(self) -> Option<Code> {
        self.terminal_error().map(|e| Code::from_zk(e, None))
    }

    /// Apply a raw connection-state transition.
    ///
    /// Returns the new state, and the event to deliver to state watchers if there is one.
    /// Terminal states absorb everything, and repeated connectivity states are not reported
    /// twice. A successful authentication after a failed one returns the session to `resumed`,
    /// the state it was in when the failure arrived.
    pub(crate) fn on(
        self,
        raw: KeeperState,
        resumed: SessionState,
    ) -> (SessionState, Option<StateEvent>) {
        if self.is_terminal() {
            return (self, None);
        }
        let next = match raw {
            KeeperState::SaslAuthenticated => {
                let next = match self {
                    SessionState::AuthenticationFailed => resumed,
                    s => s,
                };
                return (next, Some(StateEvent::Authenticated));
            }
            KeeperState::AuthFailed => {
                return (
                    SessionState::AuthenticationFailed,
                    Some(StateEvent::AuthenticationFailed),
                )
            }
            KeeperState::Disconnected => SessionState::Disconnected,
            KeeperState::SyncConnected => SessionState::Connected,
            KeeperState::ConnectedReadOnly => SessionState::ConnectedReadOnly,
            KeeperState::Expired => SessionState::Expired,
        };
        if next == self {
            (self, None)
        } else {
            (next, Some(StateEvent::from(raw)))
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The identity of a session as assigned by the service, which can be used to resume it.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential {
    /// The session id.
    pub id: i64,
    /// The session password.
    pub password: Vec<u8>,
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("id", &format_args!("{:#x}", self.id))
            .finish()
    }
}

struct Inner {
    state: SessionState,
    /// Where a successful authentication leads back to after a failed one
    resumed: SessionState,
    session: Option<SessionCredential>,
    timeout: Option<Duration>,
    read_only: bool,
    credentials: Vec<Credential>,
}

/// The process-local view of one session, shared between the facades and the dispatch flow.
///
/// All mutation goes through one lock. Blocking waiters park on `changed`; async waiters
/// subscribe to `publisher`.
pub(crate) struct SessionCell {
    inner: Mutex<Inner>,
    changed: Condvar,
    publisher: watch::Sender<SessionState>,
}

impl SessionCell {
    pub(crate) fn new() -> Self {
        let (publisher, _) = watch::channel(SessionState::Disconnected);
        SessionCell {
            inner: Mutex::new(Inner {
                state: SessionState::Disconnected,
                resumed: SessionState::Connected,
                session: None,
                timeout: None,
                read_only: false,
                credentials: Vec::new(),
            }),
            changed: Condvar::new(),
            publisher,
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    fn set(&self, inner: &mut Inner, state: SessionState) {
        inner.state = state;
        self.publisher.send_replace(state);
        self.changed.notify_all();
    }

    pub(crate) fn connecting(&self) {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Disconnected {
            self.set(&mut inner, SessionState::Connecting);
        }
    }

    pub(crate) fn apply(&self, raw: KeeperState) -> Option<StateEvent> {
        let mut inner = self.inner.lock();
        let current = inner.state;
        let (next, event) = current.on(raw, inner.resumed);
        if next == SessionState::AuthenticationFailed && current != next {
            inner.resumed = current;
        }
        if next != current {
            self.set(&mut inner, next);
        }
        event
    }

    pub(crate) fn close(&self) {
        let mut inner = self.inner.lock();
        if !inner.state.is_terminal() {
            self.set(&mut inner, SessionState::Closed);
        }
    }

    pub(crate) fn establish(&self, session: SessionCredential, timeout: Duration, read_only: bool) {
        let mut inner = self.inner.lock();
        inner.session = Some(session);
        inner.timeout = Some(timeout);
        inner.read_only = read_only;
    }

    pub(crate) fn add_credential(&self, credential: Credential) {
        self.inner.lock().credentials.push(credential);
    }

    pub(crate) fn session(&self) -> Option<SessionCredential> {
        self.inner.lock().session.clone()
    }

    pub(crate) fn timeout(&self) -> Option<Duration> {
        self.inner.lock().timeout
    }

    pub(crate) fn read_only(&self) -> bool {
        self.inner.lock().read_only
    }

    pub(crate) fn credentials(&self) -> Vec<Credential> {
        self.inner.lock().credentials.clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.publisher.subscribe()
    }

    /// Block the current thread until the session is connected, fails for good, or `timeout`
    /// passes.
    pub(crate) fn wait_connected(&self, timeout: Option<Duration>) -> Result<(), Code> {
        let deadline = timeout.map(|t| std::time::Instant::now() + t);
        let mut inner = self.inner.lock();
        loop {
            if let Some(result) = connected_outcome(inner.state) {
                return result;
            }
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut inner, deadline).timed_out() {
                        return connected_outcome(inner.state).unwrap_or(Err(Code::Timeout));
                    }
                }
                None => self.changed.wait(&mut inner),
            }
        }
    }
}

/// What waiting for a connection yields in `state`, or `None` to keep waiting.
pub(crate) fn connected_outcome(state: SessionState) -> Option<Result<(), Code>> {
    match state {
        SessionState::Connected | SessionState::ConnectedReadOnly => Some(Ok(())),
        SessionState::AuthenticationFailed => Some(Err(Code::AuthFailed)),
        s => s.terminal_code().map(Err),
    }
}
