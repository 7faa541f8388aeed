//! A session client for ZooKeeper-style coordination services.
//!
//! A [`ZooKeeper`] handle owns one session with the service. Every request returns a
//! [`Pending`] handle that resolves exactly once, to either the typed result of the request or a
//! typed [`Problem`] describing why it failed. Service-side failures (a missing node, a version
//! mismatch, missing permissions) are never panics or untyped errors.
//!
//! All of a session's work flows through a single dispatch task: requests reach the transport
//! in submission order, and replies, watch triggers and state transitions are handled in the
//! order the transport reports them. Watches are one-shot; state watches persist until the
//! session ends.
//!
//! The wire transport is not part of this crate. It is plugged in through the [`Connector`] and
//! [`Transport`] traits, and is responsible for framing, reconnection and retries. The session
//! only ever learns about connectivity from the state transitions the transport reports.
//!
//! [`SyncZooKeeper`] offers the same operations as blocking calls with optional deadlines.

#[macro_use]
extern crate failure;

use futures::channel::{mpsc, oneshot};
use slog::{debug, info, o, trace};
use std::{borrow::Cow, fmt, sync::Arc, time::Duration};

mod error;
#[cfg(test)]
mod mock;
mod path;
mod pending;
mod proto;
mod session;
mod sync;
mod transform;
mod types;

use crate::error::OpKind;
use crate::pending::Promise;
use crate::proto::{Command, Dispatcher, Enqueuer, Request, Responder, Response, Watch, WatchType, ZkError};
use crate::session::{connected_outcome, SessionCell};
use crate::transform::RequestMarker;

pub use crate::error::{BatchProblem, Code, InvalidPath, Problem};
pub use crate::path::Path;
pub use crate::pending::{Continuation, Pending};
pub use crate::proto::{ConnectRequest, Connector, RawEvent, RawRequest, Transport};
pub use crate::session::{SessionCredential, SessionState};
pub use crate::sync::{SyncWatching, SyncZooKeeper};
pub use crate::types::*;

/// The eventual outcome of a single request.
pub type Deferred<T> = Pending<Result<T, Problem>>;

/// The eventual outcome of a transaction.
pub type DeferredBatch = Pending<Result<Vec<OpResult>, BatchProblem>>;

/// Configuration for a new session.
///
/// ```no_run
/// # async fn run<C: zkclient::Connector>(connector: C) -> Result<(), failure::Error> {
/// use std::time::Duration;
/// let mut builder = zkclient::ZooKeeperBuilder::default();
/// builder
///     .set_session_timeout(Duration::from_secs(10))
///     .set_root("/app".parse()?);
/// let (zk, _states) = builder.connect(&connector).await?;
/// zk.await_connected(Some(Duration::from_secs(5))).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct ZooKeeperBuilder {
    session_timeout: Duration,
    read_only: bool,
    root: Path,
    session: Option<SessionCredential>,
    operation_timeout: Option<Duration>,
    logger: slog::Logger,
}

impl Default for ZooKeeperBuilder {
    fn default() -> Self {
        ZooKeeperBuilder {
            session_timeout: Duration::from_secs(30),
            read_only: false,
            root: Path::root(),
            session: None,
            operation_timeout: None,
            logger: slog::Logger::root(slog::Discard, o!()),
        }
    }
}

impl ZooKeeperBuilder {
    /// Set the session timeout to ask the service for. Defaults to 30 seconds.
    pub fn set_session_timeout(&mut self, t: Duration) -> &mut Self {
        self.session_timeout = t;
        self
    }

    /// Allow the session to be served by a read-only server.
    pub fn set_read_only(&mut self, read_only: bool) -> &mut Self {
        self.read_only = read_only;
        self
    }

    /// Resolve every path under `root`.
    ///
    /// Paths reported back by the session (created names, node events) are relative to `root`
    /// again.
    pub fn set_root(&mut self, root: Path) -> &mut Self {
        self.root = root;
        self
    }

    /// Resume an existing session instead of starting a new one.
    pub fn set_credential(&mut self, session: SessionCredential) -> &mut Self {
        self.session = Some(session);
        self
    }

    /// Set the default deadline of calls made through [`SyncZooKeeper`].
    pub fn set_operation_timeout(&mut self, t: Duration) -> &mut Self {
        self.operation_timeout = Some(t);
        self
    }

    /// Set the logger that should be used internally in the session.
    ///
    /// By default, all logging is disabled.
    pub fn set_logger(&mut self, l: slog::Logger) -> &mut Self {
        self.logger = l;
        self
    }

    /// Establish a link through `connector` and start the session's dispatch task.
    ///
    /// Must be called from within a tokio runtime. The returned session may not be connected
    /// yet; see [`ZooKeeper::await_connected`]. The returned stream reports every state
    /// transition of the session.
    pub async fn connect<C: Connector>(
        self,
        connector: &C,
    ) -> Result<(ZooKeeper, StateWatch), failure::Error> {
        let logger = self.logger;
        let cell = Arc::new(SessionCell::new());
        cell.connecting();
        info!(logger, "connecting";
              "root" => %self.root,
              "session_timeout" => ?self.session_timeout,
              "resume" => self.session.is_some()
        );

        let transport = connector
            .connect(ConnectRequest {
                session_timeout: self.session_timeout,
                read_only: self.read_only,
                session: self.session,
            })
            .await?;

        let (state_tx, state_rx) = mpsc::unbounded();
        let (dispatcher, connection) = Dispatcher::new(
            transport,
            cell.clone(),
            self.root.clone(),
            state_tx,
            logger.clone(),
        );
        tokio::spawn(dispatcher);

        let zk = ZooKeeper {
            connection,
            cell,
            root: self.root,
            operation_timeout: self.operation_timeout,
            logger,
        };
        Ok((zk, StateWatch(state_rx)))
    }
}

/// A handle to a session.
///
/// Handles are cheap to clone and all clones share the session. The session is closed when
/// [`ZooKeeper::close`] is called, or when the last handle is dropped.
#[derive(Clone)]
pub struct ZooKeeper {
    connection: Enqueuer,
    cell: Arc<SessionCell>,
    root: Path,
    operation_timeout: Option<Duration>,
    logger: slog::Logger,
}

impl fmt::Debug for ZooKeeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZooKeeper")
            .field("root", &self.root)
            .field("state", &self.cell.state())
            .field("session", &self.cell.session())
            .finish()
    }
}

impl ZooKeeper {
    /// Start a session with the default configuration.
    ///
    /// See [`ZooKeeperBuilder::connect`].
    pub async fn connect<C: Connector>(
        connector: &C,
    ) -> Result<(ZooKeeper, StateWatch), failure::Error> {
        ZooKeeperBuilder::default().connect(connector).await
    }

    fn parse(kind: OpKind, path: &str) -> Result<Path, Problem> {
        Path::parse(path).map_err(|_| kind.problem(path, Code::InvalidPath))
    }

    fn full(&self, path: &Path) -> String {
        self.root.resolve(path).as_str().to_string()
    }

    /// Hand `request` to the dispatch flow. `classify` runs on the dispatch flow with the raw
    /// outcome; `closed` is what the handle resolves to if the request is abandoned.
    fn submit<O, F>(&self, request: Request, watch: Option<Watch>, closed: O, classify: F) -> Pending<O>
    where
        O: Send + 'static,
        F: FnOnce(Result<Response, i32>) -> O + Send + 'static,
    {
        let (promise, pending) = Promise::new(closed);
        let responder: Responder = Box::new(move |res| promise.resolve(classify(res)));

        if let Some(err) = self.cell.state().terminal_error() {
            trace!(self.logger, "refusing request on a finished session"; "code" => ?err);
            responder(Err(err as i32));
            return pending;
        }
        if let Err(Command::Submit { responder, .. }) = self.connection.enqueue(Command::Submit {
            request,
            responder,
            watch,
        }) {
            // the dispatch flow exited after we looked at the state
            let err = self.cell.state().terminal_error().unwrap_or(ZkError::Closing);
            responder(Err(err as i32));
        }
        pending
    }

    fn encode(&self, op: Operation) -> Request {
        match op {
            Operation::Create {
                path,
                data,
                acl,
                disposition,
            } => Request::Create {
                path: self.full(&path),
                data: Cow::Owned(data),
                acl: Cow::Owned(acl),
                mode: disposition,
            },
            Operation::Delete { path, version } => Request::Delete {
                path: self.full(&path),
                version: version.unwrap_or(-1),
            },
            Operation::Set {
                path,
                data,
                version,
            } => Request::SetData {
                path: self.full(&path),
                data: Cow::Owned(data),
                version: version.unwrap_or(-1),
            },
            Operation::Check { path, version } => Request::Check {
                path: self.full(&path),
                version: version.unwrap_or(-1),
            },
        }
    }

    /// Create a node at `path` with the given `data` and `acl`.
    ///
    /// Resolves to the actual path of the new node, which differs from `path` for sequential
    /// dispositions.
    pub fn create<D, A>(&self, path: &str, data: D, acl: A, disposition: Disposition) -> Deferred<Path>
    where
        D: Into<Cow<'static, [u8]>>,
        A: Into<Cow<'static, [Acl]>>,
    {
        let path = match Self::parse(OpKind::Create, path) {
            Ok(path) => path,
            Err(e) => return Pending::ready(Err(e)),
        };
        let request = Request::Create {
            path: self.full(&path),
            data: data.into(),
            acl: acl.into(),
            mode: disposition,
        };
        let closed = Err(OpKind::Create.problem(path.as_str(), Code::ClosedSession));
        let root = self.root.clone();
        self.submit(request, None, closed, move |res| {
            transform::create(&root, &path, res)
        })
    }

    /// Delete the node at `path`, if its version matches `version` (any version if `None`).
    pub fn delete(&self, path: &str, version: Option<i32>) -> Deferred<()> {
        let path = match Self::parse(OpKind::Delete, path) {
            Ok(path) => path,
            Err(e) => return Pending::ready(Err(e)),
        };
        let request = Request::Delete {
            path: self.full(&path),
            version: version.unwrap_or(-1),
        };
        let closed = Err(OpKind::Delete.problem(path.as_str(), Code::ClosedSession));
        self.submit(request, None, closed, move |res| {
            transform::delete(&path, version, res)
        })
    }

    /// Replace the data of the node at `path`, if its version matches `version`.
    ///
    /// Resolves to the node's new metadata.
    pub fn set<D>(&self, path: &str, data: D, version: Option<i32>) -> Deferred<Stat>
    where
        D: Into<Cow<'static, [u8]>>,
    {
        let path = match Self::parse(OpKind::Set, path) {
            Ok(path) => path,
            Err(e) => return Pending::ready(Err(e)),
        };
        let request = Request::SetData {
            path: self.full(&path),
            data: data.into(),
            version: version.unwrap_or(-1),
        };
        let closed = Err(OpKind::Set.problem(path.as_str(), Code::ClosedSession));
        self.submit(request, None, closed, move |res| {
            transform::set(&path, version, res)
        })
    }

    /// Assert that the node at `path` has version `version`, without changing it.
    pub fn check(&self, path: &str, version: Option<i32>) -> Deferred<Stat> {
        let path = match Self::parse(OpKind::Check, path) {
            Ok(path) => path,
            Err(e) => return Pending::ready(Err(e)),
        };
        let request = Request::Check {
            path: self.full(&path),
            version: version.unwrap_or(-1),
        };
        let closed = Err(OpKind::Check.problem(path.as_str(), Code::ClosedSession));
        self.submit(request, None, closed, move |res| {
            transform::check(&path, version, res)
        })
    }

    /// Execute a single [`Operation`].
    ///
    /// Resolves to the [`OpResult`] variant matching the operation, or a [`Problem`] of the
    /// same kind.
    pub fn apply(&self, op: Operation) -> Deferred<OpResult> {
        let marker = RequestMarker::from(&op);
        let closed = Err(op.kind().problem(op.path().as_str(), Code::ClosedSession));
        let request = self.encode(op);
        let root = self.root.clone();
        self.submit(request, None, closed, move |res| marker.classify(&root, res))
    }

    /// Apply `ops` atomically.
    ///
    /// Resolves to one result per operation, in order, if every operation applied. Otherwise
    /// none of them did, and the problem identifies the first operation that failed. An empty
    /// batch succeeds without contacting the service.
    pub fn transact(&self, ops: Vec<Operation>) -> DeferredBatch {
        if ops.is_empty() {
            return Pending::ready(Ok(Vec::new()));
        }
        let markers: Vec<RequestMarker> = ops.iter().map(RequestMarker::from).collect();
        let request = Request::Multi(ops.into_iter().map(|op| self.encode(op)).collect());
        let root = self.root.clone();
        let closed = transform::multi(&root, &markers, Err(ZkError::Closing as i32));
        self.submit(request, None, closed, move |res| {
            transform::multi(&root, &markers, res)
        })
    }

    /// Start building a transaction.
    pub fn transaction(&self) -> Transaction<'_> {
        Transaction {
            zk: self,
            ops: Vec::new(),
            count: 0,
            invalid: None,
        }
    }

    /// Set up a read, with a watch of type `wtype` if one is given.
    fn read<T, F>(
        &self,
        kind: OpKind,
        path: &str,
        wtype: Option<WatchType>,
        request: fn(String, bool) -> Request,
        classify: F,
    ) -> Deferred<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path, Result<Response, i32>, Option<NodeWatch>) -> Result<T, Problem>
            + Send
            + 'static,
    {
        let path = match Self::parse(kind, path) {
            Ok(path) => path,
            Err(e) => return Pending::ready(Err(e)),
        };
        let full = self.full(&path);
        let (watch, node_watch) = match wtype {
            Some(wtype) => {
                let (promise, pending) = Promise::new(None);
                let watch = Watch {
                    path: full.clone(),
                    wtype,
                    promise,
                };
                (Some(watch), Some(pending))
            }
            None => (None, None),
        };
        let request = request(full, watch.is_some());
        let closed = Err(kind.problem(path.as_str(), Code::ClosedSession));
        self.submit(request, watch, closed, move |res| {
            classify(&path, res, node_watch)
        })
    }

    /// Read the data and metadata of the node at `path`.
    pub fn get(&self, path: &str) -> Deferred<Node> {
        self.read(
            OpKind::Get,
            path,
            None,
            |path, watch| Request::GetData { path, watch },
            |path, res, _| transform::get(path, res),
        )
    }

    /// Read the metadata of the node at `path`, or `None` if there is no such node.
    pub fn exists(&self, path: &str) -> Deferred<Option<Stat>> {
        self.read(
            OpKind::Exists,
            path,
            None,
            |path, watch| Request::Exists { path, watch },
            |path, res, _| transform::exists(path, res),
        )
    }

    /// List the names of the children of the node at `path`.
    pub fn children(&self, path: &str) -> Deferred<Vec<String>> {
        self.read(
            OpKind::Children,
            path,
            None,
            |path, watch| Request::GetChildren { path, watch },
            |path, res, _| transform::children(path, res),
        )
    }

    /// Read the ACL of the node at `path`, along with its metadata.
    pub fn get_acl(&self, path: &str) -> Deferred<(Vec<Acl>, Stat)> {
        self.read(
            OpKind::GetAcl,
            path,
            None,
            |path, _| Request::GetAcl { path },
            |path, res, _| transform::get_acl(path, res),
        )
    }

    /// Replace the ACL of the node at `path`, if its ACL version matches `version`.
    pub fn set_acl<A>(&self, path: &str, acl: A, version: Option<i32>) -> Deferred<Stat>
    where
        A: Into<Cow<'static, [Acl]>>,
    {
        let path = match Self::parse(OpKind::SetAcl, path) {
            Ok(path) => path,
            Err(e) => return Pending::ready(Err(e)),
        };
        let request = Request::SetAcl {
            path: self.full(&path),
            acl: acl.into(),
            version: version.unwrap_or(-1),
        };
        let closed = Err(OpKind::SetAcl.problem(path.as_str(), Code::ClosedSession));
        self.submit(request, None, closed, move |res| {
            transform::set_acl(&path, version, res)
        })
    }

    /// Issue reads that also leave a one-shot watch on the node they read.
    pub fn watch(&self) -> Watching<'_> {
        Watching(self)
    }

    /// Add `credential` to the session's authentication.
    ///
    /// On success the credential is recorded in [`ZooKeeper::credentials`]. The service reports
    /// the outcome as a state transition as well.
    pub fn add_auth(&self, credential: Credential) -> Deferred<()> {
        let request = Request::Auth {
            scheme: credential.scheme.clone(),
            auth: credential.auth.clone(),
        };
        let cell = self.cell.clone();
        let closed = Err(Problem::Session {
            code: Code::ClosedSession,
        });
        self.submit(request, None, closed, move |res| {
            let r = transform::auth(res);
            if r.is_ok() {
                cell.add_credential(credential);
            }
            r
        })
    }

    /// Create `path` and every missing ancestor as persistent, world-accessible nodes.
    ///
    /// Nodes that already exist are left alone.
    pub async fn ensure(&self, path: &str) -> Result<(), Problem> {
        let target = Self::parse(OpKind::Create, path)?;
        let mut missing = target.ancestors();
        if !target.is_root() {
            missing.push(target);
        }
        for p in missing {
            match self
                .create(p.as_str(), Vec::new(), Acl::open_unsafe(), Disposition::Persistent)
                .await
            {
                Ok(_) => {}
                Err(ref e) if e.code() == Code::NodeExists => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Subscribe to the session's state transitions from now on.
    ///
    /// The stream ends when the session is closed or expires.
    pub fn watch_state(&self) -> StateWatch {
        let (tx, rx) = mpsc::unbounded();
        // if the session is over, the sender is dropped and the stream ends right away
        let _ = self.connection.enqueue(Command::WatchState(tx));
        StateWatch(rx)
    }

    /// The current state of the session.
    pub fn state(&self) -> SessionState {
        self.cell.state()
    }

    /// The id and password the service assigned to the session, once it has been established.
    pub fn session(&self) -> Option<SessionCredential> {
        self.cell.session()
    }

    /// The session timeout the service agreed to, once the session has been established.
    pub fn negotiated_timeout(&self) -> Option<Duration> {
        self.cell.timeout()
    }

    /// Whether the session is being served by a read-only server.
    pub fn is_read_only(&self) -> bool {
        self.cell.read_only()
    }

    /// The credentials that have been successfully added to the session.
    pub fn credentials(&self) -> Vec<Credential> {
        self.cell.credentials()
    }

    /// The namespace root all paths of this handle are resolved under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Wait until the session is connected.
    ///
    /// Fails with [`Code::Timeout`] once `timeout` passes, with [`Code::AuthFailed`] if the
    /// session's credentials were rejected, and with the terminal code of the session once it
    /// has expired or been closed.
    pub async fn await_connected(&self, timeout: Option<Duration>) -> Result<(), Problem> {
        let mut rx = self.cell.subscribe();
        let wait = async move {
            loop {
                let state = *rx.borrow_and_update();
                if let Some(outcome) = connected_outcome(state) {
                    return outcome;
                }
                if rx.changed().await.is_err() {
                    return Err(Code::ClosedSession);
                }
            }
        };
        let outcome = match timeout {
            Some(t) => tokio::time::timeout(t, wait)
                .await
                .unwrap_or(Err(Code::Timeout)),
            None => wait.await,
        };
        outcome.map_err(|code| Problem::Session { code })
    }

    /// Close the session.
    ///
    /// Every outstanding request fails with [`Code::ClosedSession`], every outstanding watch
    /// resolves to `None`, and state watches end. Closing a closed session does nothing.
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self.connection.enqueue(Command::Close(tx)).is_ok() {
            let _ = rx.await;
        }
        debug!(self.logger, "session closed"; "state" => %self.cell.state());
    }

    /// A blocking view of this session.
    pub fn blocking(&self) -> SyncZooKeeper {
        SyncZooKeeper::new(self.clone(), self.operation_timeout)
    }
}

/// Reads that leave a one-shot watch on the node they read.
///
/// The watch resolves to the first matching event for the node, or to `None` if the session
/// ends first. A watch is only left if the read succeeds, or, for [`Watching::exists`], if the
/// node does not exist.
#[derive(Debug)]
pub struct Watching<'a>(&'a ZooKeeper);

fn watch_or_gone(watch: Option<NodeWatch>) -> NodeWatch {
    watch.unwrap_or_else(|| Pending::ready(None))
}

impl Watching<'_> {
    /// Like [`ZooKeeper::get`]. The watch fires when the node's data changes or it is deleted.
    pub fn get(&self, path: &str) -> Deferred<(Node, NodeWatch)> {
        self.0.read(
            OpKind::Get,
            path,
            Some(WatchType::Data),
            |path, watch| Request::GetData { path, watch },
            |path, res, w| transform::get(path, res).map(|node| (node, watch_or_gone(w))),
        )
    }

    /// Like [`ZooKeeper::exists`]. The watch fires when the node is created, deleted or its data
    /// changes.
    pub fn exists(&self, path: &str) -> Deferred<(Option<Stat>, NodeWatch)> {
        self.0.read(
            OpKind::Exists,
            path,
            Some(WatchType::Exist),
            |path, watch| Request::Exists { path, watch },
            |path, res, w| transform::exists(path, res).map(|stat| (stat, watch_or_gone(w))),
        )
    }

    /// Like [`ZooKeeper::children`]. The watch fires when a child is added or removed, or the
    /// node is deleted.
    pub fn children(&self, path: &str) -> Deferred<(Vec<String>, NodeWatch)> {
        self.0.read(
            OpKind::Children,
            path,
            Some(WatchType::Child),
            |path, watch| Request::GetChildren { path, watch },
            |path, res, w| transform::children(path, res).map(|c| (c, watch_or_gone(w))),
        )
    }
}

/// Builds a transaction; see [`ZooKeeper::transact`].
#[derive(Debug)]
pub struct Transaction<'a> {
    zk: &'a ZooKeeper,
    ops: Vec<Operation>,
    count: usize,
    invalid: Option<BatchProblem>,
}

impl Transaction<'_> {
    fn push(mut self, kind: OpKind, path: &str, op: impl FnOnce(Path) -> Operation) -> Self {
        match Path::parse(path) {
            Ok(path) => self.ops.push(op(path)),
            Err(_) => {
                if self.invalid.is_none() {
                    self.invalid = Some(BatchProblem {
                        index: self.count,
                        problem: kind.problem(path, Code::InvalidPath),
                    });
                }
            }
        }
        self.count += 1;
        self
    }

    /// Add the creation of a node.
    pub fn create(
        self,
        path: &str,
        data: impl Into<Vec<u8>>,
        acl: &[Acl],
        disposition: Disposition,
    ) -> Self {
        let data = data.into();
        let acl = acl.to_vec();
        self.push(OpKind::Create, path, move |path| Operation::Create {
            path,
            data,
            acl,
            disposition,
        })
    }

    /// Add the replacement of a node's data.
    pub fn set(self, path: &str, data: impl Into<Vec<u8>>, version: Option<i32>) -> Self {
        let data = data.into();
        self.push(OpKind::Set, path, move |path| Operation::Set {
            path,
            data,
            version,
        })
    }

    /// Add the deletion of a node.
    pub fn delete(self, path: &str, version: Option<i32>) -> Self {
        self.push(OpKind::Delete, path, move |path| Operation::Delete {
            path,
            version,
        })
    }

    /// Add a version check.
    pub fn check(self, path: &str, version: Option<i32>) -> Self {
        self.push(OpKind::Check, path, move |path| Operation::Check {
            path,
            version,
        })
    }

    /// Submit the transaction.
    pub fn commit(self) -> DeferredBatch {
        match self.invalid {
            Some(problem) => Pending::ready(Err(problem)),
            None => self.zk.transact(self.ops),
        }
    }
}
