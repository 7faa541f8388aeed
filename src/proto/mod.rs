//! The seam between the session core and the transport that actually talks to the service.
//!
//! The transport is an external collaborator. It accepts raw requests (an opcode plus the
//! encoded request body) and reports everything that happens on one ordered feed of
//! [`RawEvent`]s: the handshake, connection-state transitions, replies and watch triggers.
//! Reconnection, retries and framing are its business, not ours.

use crate::session::SessionCredential;
use async_trait::async_trait;
use futures::Stream;
use std::time::Duration;

mod dispatcher;
mod error;
mod registry;
mod request;
mod response;
mod watch;

pub(crate) use self::dispatcher::{Command, Dispatcher, Enqueuer, Responder};
pub(crate) use self::error::ZkError;
pub(crate) use self::request::{OpCode, Request};
pub(crate) use self::response::Response;
pub(crate) use self::watch::{Watch, WatchType};

#[cfg(test)]
pub(crate) use self::request::{write_list, MultiHeader, WriteTo};
#[cfg(test)]
pub(crate) use self::response::{BufferReader, ReadFrom, StringReader};

/// Parameters for establishing (or re-attaching to) a session.
#[derive(Clone, Debug)]
pub struct ConnectRequest {
    /// The session timeout the client asks the service for.
    pub session_timeout: Duration,
    /// Whether the client accepts connecting to a read-only server.
    pub read_only: bool,
    /// An existing session to resume, if any.
    pub session: Option<SessionCredential>,
}

/// A request handed to the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawRequest {
    /// Correlates the request with its [`RawEvent::Reply`].
    pub xid: i32,
    /// The service opcode of the request.
    pub opcode: i32,
    /// The big-endian encoded request body.
    pub payload: Vec<u8>,
}

/// An entry on the transport's ordered event feed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawEvent {
    /// The service accepted the session.
    Handshake {
        session_id: i64,
        password: Vec<u8>,
        /// Negotiated session timeout in milliseconds.
        timeout: i32,
        read_only: bool,
    },
    /// The connection moved to a new raw keeper state.
    State(i32),
    /// The reply to the request submitted with `xid`. A `code` of zero means success, in which
    /// case `payload` holds the encoded response body.
    ///
    /// A successful version check, on its own or inside a transaction, must be answered with
    /// the checked node's encoded `Stat`. The service itself sends no body for a check, so a
    /// transport relaying its replies has to supply the stat (from the check's zxid, or a read
    /// it issues itself). A check reply without one is classified as undecodable.
    Reply {
        xid: i32,
        code: i32,
        payload: Vec<u8>,
    },
    /// A watch trigger: event type, keeper state and path, encoded like a reply body.
    Trigger(Vec<u8>),
}

/// An established link to the service.
///
/// The stream half is the session's single ordered event feed. It ends when the transport has
/// been closed.
pub trait Transport: Stream<Item = RawEvent> + Send + Unpin + 'static {
    /// Hand a request to the transport. Its reply arrives on the feed.
    fn submit(&mut self, request: RawRequest) -> Result<(), failure::Error>;

    /// Release the link. Idempotent.
    fn close(&mut self);
}

/// Something that can establish a [`Transport`].
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The transport this connector produces.
    type Transport: Transport;

    /// Establish a link. The session handshake and the initial connection state are reported on
    /// the returned transport's feed.
    async fn connect(&self, request: ConnectRequest) -> Result<Self::Transport, failure::Error>;
}
