use super::{Acl, Disposition, Stat};
use crate::error::OpKind;
use crate::Path;

/// A write request against the namespace.
///
/// Operations can be submitted on their own or grouped into a transaction. A `version` of `None`
/// (or `Some(-1)`, which is the same thing on the wire) skips the version check; any other
/// version must match the node's current version exactly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Create a node.
    Create {
        path: Path,
        data: Vec<u8>,
        acl: Vec<Acl>,
        disposition: Disposition,
    },
    /// Delete a node that has no children.
    Delete { path: Path, version: Option<i32> },
    /// Replace the data of a node.
    Set {
        path: Path,
        data: Vec<u8>,
        version: Option<i32>,
    },
    /// Assert a node's data version without modifying it.
    Check { path: Path, version: Option<i32> },
}

impl Operation {
    /// The path the operation is addressed to.
    pub fn path(&self) -> &Path {
        match *self {
            Operation::Create { ref path, .. }
            | Operation::Delete { ref path, .. }
            | Operation::Set { ref path, .. }
            | Operation::Check { ref path, .. } => path,
        }
    }

    pub(crate) fn kind(&self) -> OpKind {
        match *self {
            Operation::Create { .. } => OpKind::Create,
            Operation::Delete { .. } => OpKind::Delete,
            Operation::Set { .. } => OpKind::Set,
            Operation::Check { .. } => OpKind::Check,
        }
    }
}

/// The successful outcome of an [`Operation`]. Each variant corresponds to a variant of
/// `Operation`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpResult {
    /// A node was created. For sequential dispositions, `path` includes the service-assigned
    /// suffix and so differs from the requested path.
    Create { path: Path },
    /// The node was deleted.
    Delete { path: Path },
    /// The node's data was replaced; `stat` is its new metadata.
    Set { path: Path, stat: Stat },
    /// The node's version matched; `stat` is its current metadata.
    Check { path: Path, stat: Stat },
}

impl OpResult {
    /// The path of the node the operation applied to.
    pub fn path(&self) -> &Path {
        match *self {
            OpResult::Create { ref path }
            | OpResult::Delete { ref path }
            | OpResult::Set { ref path, .. }
            | OpResult::Check { ref path, .. } => path,
        }
    }
}
