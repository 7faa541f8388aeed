use crate::Path;

mod acl;
pub use self::acl::*;

mod multi;
pub use self::multi::*;

mod watch;
pub use self::watch::*;

/// Metadata about a node, similar to the UNIX `stat` structure.
///
/// # Time in the namespace
/// The concept of time is tricky in distributed systems. The service keeps track of time in a
/// number of ways.
///
/// - **zxid**: Every change to the namespace receives a stamp in the form of a *zxid*
///   (transaction ID). This exposes the total ordering of all changes. If *zxid:a* is smaller
///   than *zxid:b*, then the change stamped *zxid:a* happened before the one stamped *zxid:b*.
/// - **Version Numbers**: Every change to a node will cause an increase to one of the version
///   numbers of that node. These are what the `version` arguments of writes are checked against.
/// - **Clock Time**: The service does not use clock time to make decisions, but it uses it to put
///   timestamps into the `Stat` structure.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct Stat {
    /// The transaction ID that created the node.
    pub czxid: i64,
    /// The last transaction that modified the node.
    pub mzxid: i64,
    /// Milliseconds since epoch when the node was created.
    pub ctime: i64,
    /// Milliseconds since epoch when the node was last modified.
    pub mtime: i64,
    /// The number of changes to the data of the node.
    pub version: i32,
    /// The number of changes to the children of the node.
    pub cversion: i32,
    /// The number of changes to the ACL of the node.
    pub aversion: i32,
    /// The session ID of the owner of this node, if it is ephemeral, and zero otherwise.
    pub ephemeral_owner: i64,
    /// The length of the data field of the node.
    pub data_length: i32,
    /// The number of children this node has.
    pub num_children: i32,
    /// The transaction ID that last modified the children of the node.
    pub pzxid: i64,
}

impl Stat {
    /// Whether the node is bound to the lifetime of a session.
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral_owner != 0
    }
}

/// Determines the lifetime of a node, and whether the service appends a sequence number to its
/// name when it is created.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// The node outlives the session that created it.
    Persistent = 0,
    /// The node is deleted when the session that created it ends.
    Ephemeral = 1,
    /// A persistent node whose name is suffixed with a monotonically increasing number. The
    /// suffix is assigned by the service, is always ten digits, zero padded, and is unique among
    /// the siblings of the node at the time of creation.
    PersistentSequential = 2,
    /// An ephemeral node with a service-assigned sequence suffix.
    EphemeralSequential = 3,
}

impl Disposition {
    /// Whether the node will be removed when its owning session ends.
    pub fn is_ephemeral(self) -> bool {
        matches!(self, Disposition::Ephemeral | Disposition::EphemeralSequential)
    }

    /// Whether the service appends a sequence suffix to the node's name.
    pub fn is_sequential(self) -> bool {
        matches!(
            self,
            Disposition::PersistentSequential | Disposition::EphemeralSequential
        )
    }
}

/// A snapshot of a node as read from the service.
///
/// Reads always produce a fresh `Node`; nothing updates it afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    /// Where the node lives.
    pub path: Path,
    /// The node's payload.
    pub data: Vec<u8>,
    /// The node's metadata at the time of the read.
    pub stat: Stat,
}
