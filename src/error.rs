use crate::proto::ZkError;
use std::convert::TryFrom;

/// The reason an operation did not succeed.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Fail)]
pub enum Code {
    /// No node exists with the given path (or, for a create, its parent does not exist).
    #[fail(display = "target node does not exist")]
    NoNode,

    /// A node with the given path already exists.
    #[fail(display = "target node already exists")]
    NodeExists,

    /// The target node has children, and therefore cannot be deleted.
    #[fail(display = "target node has children, and cannot be deleted")]
    NotEmpty,

    /// The target node has a different version than was specified by the call.
    #[fail(
        display = "target node has different version than expected ({})",
        expected
    )]
    BadVersion {
        /// The expected node version.
        expected: i32,
    },

    /// The target node's ACL does not permit the operation for this session's credentials.
    #[fail(display = "insufficient authentication")]
    NoAuth,

    /// The given ACL is invalid.
    #[fail(display = "the given ACL is invalid")]
    InvalidAcl,

    /// The parent node is ephemeral, and cannot have children.
    #[fail(display = "parent node is ephemeral, and cannot have children")]
    NoChildrenForEphemerals,

    /// The service rejected the supplied credential.
    #[fail(display = "authentication failed")]
    AuthFailed,

    /// The session has been expired by the service.
    #[fail(display = "session expired")]
    SessionExpired,

    /// The transport lost its connection and gave up retrying this request.
    #[fail(display = "connection to the service was lost")]
    ConnectionLoss,

    /// The caller's deadline passed before the operation completed.
    #[fail(display = "operation timed out")]
    Timeout,

    /// The session was closed before the operation completed.
    #[fail(display = "session is closed")]
    ClosedSession,

    /// The given path is malformed.
    #[fail(display = "invalid path")]
    InvalidPath,

    /// The service reported a failure code outside the known set.
    #[fail(display = "unexpected service error code {}", _0)]
    Unexpected(i32),
}

impl Code {
    /// Classify a raw service code. `version` is the expected version the request carried.
    pub(crate) fn from_raw(code: i32, version: Option<i32>) -> Code {
        match ZkError::try_from(code) {
            Ok(e) => Code::from_zk(e, version),
            Err(code) => Code::Unexpected(code),
        }
    }

    pub(crate) fn from_zk(err: ZkError, version: Option<i32>) -> Code {
        match err {
            ZkError::NoNode => Code::NoNode,
            ZkError::NodeExists => Code::NodeExists,
            ZkError::NotEmpty => Code::NotEmpty,
            ZkError::BadVersion => Code::BadVersion {
                expected: version.unwrap_or(-1),
            },
            ZkError::NoAuth => Code::NoAuth,
            ZkError::InvalidAcl => Code::InvalidAcl,
            ZkError::NoChildrenForEphemerals => Code::NoChildrenForEphemerals,
            ZkError::AuthFailed => Code::AuthFailed,
            ZkError::SessionExpired => Code::SessionExpired,
            ZkError::ConnectionLoss => Code::ConnectionLoss,
            ZkError::OperationTimeout => Code::Timeout,
            ZkError::Closing => Code::ClosedSession,
            e => Code::Unexpected(e as i32),
        }
    }
}

/// Which kind of request a [`Problem`] belongs to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum OpKind {
    Create,
    Delete,
    Set,
    Check,
    Get,
    Exists,
    Children,
    GetAcl,
    SetAcl,
}

impl OpKind {
    pub(crate) fn problem(self, path: impl Into<String>, code: Code) -> Problem {
        let path = path.into();
        match self {
            OpKind::Create => Problem::Create { path, code },
            OpKind::Delete => Problem::Delete { path, code },
            OpKind::Set => Problem::Set { path, code },
            OpKind::Check => Problem::Check { path, code },
            OpKind::Get => Problem::Get { path, code },
            OpKind::Exists => Problem::Exists { path, code },
            OpKind::Children => Problem::Children { path, code },
            OpKind::GetAcl => Problem::GetAcl { path, code },
            OpKind::SetAcl => Problem::SetAcl { path, code },
        }
    }
}

/// The typed failure of a single request.
///
/// Every submitted request yields exactly one of its result or a `Problem`. The variant always
/// matches the kind of request that failed.
#[derive(Clone, PartialEq, Eq, Debug, Fail)]
pub enum Problem {
    /// A failed `create` request.
    #[fail(display = "create {} failed: {}", path, code)]
    Create { path: String, code: Code },

    /// A failed `delete` request.
    #[fail(display = "delete {} failed: {}", path, code)]
    Delete { path: String, code: Code },

    /// A failed `set` request.
    #[fail(display = "set {} failed: {}", path, code)]
    Set { path: String, code: Code },

    /// A failed `check` request.
    #[fail(display = "check {} failed: {}", path, code)]
    Check { path: String, code: Code },

    /// A failed `get` request.
    #[fail(display = "get {} failed: {}", path, code)]
    Get { path: String, code: Code },

    /// A failed `exists` request.
    #[fail(display = "exists {} failed: {}", path, code)]
    Exists { path: String, code: Code },

    /// A failed `children` request.
    #[fail(display = "children {} failed: {}", path, code)]
    Children { path: String, code: Code },

    /// A failed `get_acl` request.
    #[fail(display = "get_acl {} failed: {}", path, code)]
    GetAcl { path: String, code: Code },

    /// A failed `set_acl` request.
    #[fail(display = "set_acl {} failed: {}", path, code)]
    SetAcl { path: String, code: Code },

    /// A failed session-level request, such as authentication or waiting for a connection.
    #[fail(display = "session request failed: {}", code)]
    Session { code: Code },
}

impl Problem {
    /// The reason for the failure.
    pub fn code(&self) -> Code {
        match *self {
            Problem::Create { code, .. }
            | Problem::Delete { code, .. }
            | Problem::Set { code, .. }
            | Problem::Check { code, .. }
            | Problem::Get { code, .. }
            | Problem::Exists { code, .. }
            | Problem::Children { code, .. }
            | Problem::GetAcl { code, .. }
            | Problem::SetAcl { code, .. }
            | Problem::Session { code } => code,
        }
    }

    /// The path the failed request was addressed to, if any.
    pub fn path(&self) -> Option<&str> {
        match *self {
            Problem::Create { ref path, .. }
            | Problem::Delete { ref path, .. }
            | Problem::Set { ref path, .. }
            | Problem::Check { ref path, .. }
            | Problem::Get { ref path, .. }
            | Problem::Exists { ref path, .. }
            | Problem::Children { ref path, .. }
            | Problem::GetAcl { ref path, .. }
            | Problem::SetAcl { ref path, .. } => Some(path),
            Problem::Session { .. } => None,
        }
    }
}

/// The result of a failed transaction.
///
/// No operation of the transaction was applied. `index` identifies the first operation that
/// failed; session-wide failures (expiry, closure) are attributed to the first operation.
#[derive(Clone, PartialEq, Eq, Debug, Fail)]
#[fail(display = "transaction operation {} failed: {}", index, problem)]
pub struct BatchProblem {
    /// Position of the failing operation in the submitted batch.
    pub index: usize,
    /// Why that operation failed.
    pub problem: Problem,
}

/// A path string that is not a valid absolute node path.
#[derive(Clone, PartialEq, Eq, Debug, Fail)]
#[fail(display = "invalid path {:?}: {}", path, reason)]
pub struct InvalidPath {
    /// The offending input.
    pub path: String,
    /// What is wrong with it.
    pub reason: &'static str,
}

impl InvalidPath {
    pub(crate) fn new(path: &str, reason: &'static str) -> Self {
        InvalidPath {
            path: path.to_string(),
            reason,
        }
    }
}
