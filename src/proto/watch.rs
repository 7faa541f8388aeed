use crate::pending::Promise;
use crate::NodeEvent;
use std::fmt;

/// A watch requested by a read, waiting for the read's reply.
pub(crate) struct Watch {
    pub(crate) path: String,
    pub(crate) wtype: WatchType,
    pub(crate) promise: Promise<Option<NodeEvent>>,
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch")
            .field("path", &self.path)
            .field("wtype", &self.wtype)
            .finish()
    }
}

/// Describes what a `Watch` is looking for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub(crate) enum WatchType {
    /// Watching for changes to children.
    Child,
    /// Watching for changes to data.
    Data,
    /// Watching for the creation of a node at the given path.
    Exist,
}

impl WatchType {
    /// Whether a trigger of the given kind fires a watch of this type.
    pub(crate) fn fired_by(self, event: &NodeEvent) -> bool {
        match (self, event) {
            (WatchType::Child, NodeEvent::Deleted(_))
            | (WatchType::Child, NodeEvent::ChildrenChanged(_)) => true,
            (WatchType::Child, _) => false,
            (WatchType::Data, NodeEvent::Deleted(_))
            | (WatchType::Data, NodeEvent::DataChanged(_)) => true,
            (WatchType::Data, _) => false,
            (WatchType::Exist, NodeEvent::ChildrenChanged(_)) => false,
            (WatchType::Exist, _) => true,
        }
    }
}
