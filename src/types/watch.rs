use crate::{Path, Pending};
use futures::{channel::mpsc, Stream, StreamExt};
use std::{
    convert::TryFrom,
    pin::Pin,
    task::{Context, Poll},
};

/// A change in the connection state of a session.
///
/// State events carry no path; they are delivered to every [`StateWatch`] of the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateEvent {
    /// The session is connected to a server that is part of the quorum.
    Connected,
    /// The session is connected to a server that is partitioned from the quorum. Only reads will
    /// succeed until the session reconnects elsewhere.
    ConnectedReadOnly,
    /// The connection was lost. The transport reconnects on its own; watches and pending
    /// requests survive this.
    Disconnected,
    /// The service expired the session. This is terminal: every pending request and watch has
    /// been invalidated, and the session must be replaced.
    Expired,
    /// A credential added with `add_auth` was accepted.
    Authenticated,
    /// A credential added with `add_auth` was rejected.
    AuthenticationFailed,
}

/// A change to a watched node.
///
/// Node events are delivered at most once per watch registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeEvent {
    /// A node was created at the path.
    Created(Path),
    /// The node at the path was deleted.
    Deleted(Path),
    /// The data of the node at the path was set. There is no guarantee the data actually changed.
    DataChanged(Path),
    /// A child of the node at the path was created or deleted.
    ChildrenChanged(Path),
}

impl NodeEvent {
    /// The path of the node the event is about.
    pub fn path(&self) -> &Path {
        match *self {
            NodeEvent::Created(ref p)
            | NodeEvent::Deleted(ref p)
            | NodeEvent::DataChanged(ref p)
            | NodeEvent::ChildrenChanged(ref p) => p,
        }
    }

    pub(crate) fn new(event_type: WatchedEventType, path: Path) -> Option<Self> {
        match event_type {
            WatchedEventType::NodeCreated => Some(NodeEvent::Created(path)),
            WatchedEventType::NodeDeleted => Some(NodeEvent::Deleted(path)),
            WatchedEventType::NodeDataChanged => Some(NodeEvent::DataChanged(path)),
            WatchedEventType::NodeChildrenChanged => Some(NodeEvent::ChildrenChanged(path)),
            WatchedEventType::None
            | WatchedEventType::DataWatchRemoved
            | WatchedEventType::ChildWatchRemoved => None,
        }
    }
}

/// Anything the dispatch flow delivers to watchers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A session-scoped event.
    State(StateEvent),
    /// A path-scoped event.
    Node(NodeEvent),
}

impl From<StateEvent> for Event {
    fn from(e: StateEvent) -> Self {
        Event::State(e)
    }
}

impl From<NodeEvent> for Event {
    fn from(e: NodeEvent) -> Self {
        Event::Node(e)
    }
}

/// A one-shot watch registered by a read.
///
/// Resolves to `Some` with the first matching event, or `None` if the watch was invalidated
/// because the session expired or was closed. Re-register with another read to keep observing.
pub type NodeWatch = Pending<Option<NodeEvent>>;

/// The stream of state transitions of a session.
///
/// State watches persist until the session is closed or expires, at which point the stream
/// ends.
#[derive(Debug)]
pub struct StateWatch(pub(crate) mpsc::UnboundedReceiver<StateEvent>);

impl Stream for StateWatch {
    type Item = StateEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.0.poll_next_unpin(cx)
    }
}

/// Raw connection states, as reported by the transport's event feed.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum KeeperState {
    /// Not connected to any server.
    Disconnected = 0,
    /// Connected to a server of the quorum.
    SyncConnected = 3,
    /// Authentication failed.
    AuthFailed = 4,
    /// Connected to a server that is not connected to the majority.
    ConnectedReadOnly = 5,
    /// Authenticated, and operating with the permissions of the new identity.
    SaslAuthenticated = 6,
    /// The session has expired.
    Expired = -112,
}

impl TryFrom<i32> for KeeperState {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => KeeperState::Disconnected,
            3 => KeeperState::SyncConnected,
            4 => KeeperState::AuthFailed,
            5 => KeeperState::ConnectedReadOnly,
            6 => KeeperState::SaslAuthenticated,
            -112 => KeeperState::Expired,
            _ => return Err(code),
        })
    }
}

impl From<KeeperState> for StateEvent {
    fn from(state: KeeperState) -> Self {
        match state {
            KeeperState::Disconnected => StateEvent::Disconnected,
            KeeperState::SyncConnected => StateEvent::Connected,
            KeeperState::AuthFailed => StateEvent::AuthenticationFailed,
            KeeperState::ConnectedReadOnly => StateEvent::ConnectedReadOnly,
            KeeperState::SaslAuthenticated => StateEvent::Authenticated,
            KeeperState::Expired => StateEvent::Expired,
        }
    }
}

/// Raw trigger types, as carried by a watch trigger on the event feed.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WatchedEventType {
    /// Nothing happened to a node; the trigger is about the session.
    None = -1,
    NodeCreated = 1,
    NodeDeleted = 2,
    NodeDataChanged = 3,
    NodeChildrenChanged = 4,
    DataWatchRemoved = 5,
    ChildWatchRemoved = 6,
}

impl TryFrom<i32> for WatchedEventType {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Ok(match code {
            -1 => WatchedEventType::None,
            1 => WatchedEventType::NodeCreated,
            2 => WatchedEventType::NodeDeleted,
            3 => WatchedEventType::NodeDataChanged,
            4 => WatchedEventType::NodeChildrenChanged,
            5 => WatchedEventType::DataWatchRemoved,
            6 => WatchedEventType::ChildWatchRemoved,
            _ => return Err(code),
        })
    }
}
