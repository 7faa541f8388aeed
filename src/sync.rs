//! Blocking access to a session.
//!
//! Every call submits the same request the asynchronous facade would and then parks the calling
//! thread until the outcome arrives. None of these methods may be called from a thread that
//! drives the session's runtime.

use crate::error::OpKind;
use crate::{
    Acl, BatchProblem, Code, Credential, Deferred, Disposition, Node, NodeWatch, OpResult,
    Operation, Path, Problem, SessionCredential, SessionState, Stat, StateWatch,
    ZooKeeper,
};
use std::borrow::Cow;
use std::time::Duration;

/// A blocking handle to a session.
///
/// Calls wait at most for the handle's timeout, if it has one, and then fail with
/// [`Code::Timeout`]. The request itself is not recalled; its eventual outcome is discarded.
#[derive(Clone, Debug)]
pub struct SyncZooKeeper {
    zk: ZooKeeper,
    timeout: Option<Duration>,
}

impl SyncZooKeeper {
    pub(crate) fn new(zk: ZooKeeper, timeout: Option<Duration>) -> Self {
        SyncZooKeeper { zk, timeout }
    }

    /// A handle to the same session whose calls wait at most `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> SyncZooKeeper {
        SyncZooKeeper {
            zk: self.zk.clone(),
            timeout: Some(timeout),
        }
    }

    /// The asynchronous handle this one wraps.
    pub fn non_blocking(&self) -> &ZooKeeper {
        &self.zk
    }

    fn wait<T>(&self, pending: Deferred<T>, kind: OpKind, path: &str) -> Result<T, Problem>
    where
        T: Send + 'static,
    {
        match pending.wait(self.timeout) {
            Some(outcome) => outcome,
            None => Err(kind.problem(path, self.gave_up())),
        }
    }

    /// Why a wait ended without an outcome.
    fn gave_up(&self) -> Code {
        match self.timeout {
            Some(_) => Code::Timeout,
            None => Code::ClosedSession,
        }
    }

    /// See [`ZooKeeper::create`].
    pub fn create<D, A>(
        &self,
        path: &str,
        data: D,
        acl: A,
        disposition: Disposition,
    ) -> Result<Path, Problem>
    where
        D: Into<Cow<'static, [u8]>>,
        A: Into<Cow<'static, [Acl]>>,
    {
        self.wait(
            self.zk.create(path, data, acl, disposition),
            OpKind::Create,
            path,
        )
    }

    /// See [`ZooKeeper::delete`].
    pub fn delete(&self, path: &str, version: Option<i32>) -> Result<(), Problem> {
        self.wait(self.zk.delete(path, version), OpKind::Delete, path)
    }

    /// See [`ZooKeeper::set`].
    pub fn set<D>(&self, path: &str, data: D, version: Option<i32>) -> Result<Stat, Problem>
    where
        D: Into<Cow<'static, [u8]>>,
    {
        self.wait(self.zk.set(path, data, version), OpKind::Set, path)
    }

    /// See [`ZooKeeper::check`].
    pub fn check(&self, path: &str, version: Option<i32>) -> Result<Stat, Problem> {
        self.wait(self.zk.check(path, version), OpKind::Check, path)
    }

    /// See [`ZooKeeper::apply`].
    pub fn apply(&self, op: Operation) -> Result<OpResult, Problem> {
        let kind = op.kind();
        let path = op.path().clone();
        self.wait(self.zk.apply(op), kind, path.as_str())
    }

    /// See [`ZooKeeper::transact`].
    pub fn transact(&self, ops: Vec<Operation>) -> Result<Vec<OpResult>, BatchProblem> {
        let first = ops.first().map(|op| (op.kind(), op.path().clone()));
        match (self.zk.transact(ops).wait(self.timeout), first) {
            (Some(outcome), _) => outcome,
            (None, Some((kind, path))) => Err(BatchProblem {
                index: 0,
                problem: kind.problem(path.as_str(), self.gave_up()),
            }),
            // empty batches resolve immediately
            (None, None) => Ok(Vec::new()),
        }
    }

    /// See [`ZooKeeper::get`].
    pub fn get(&self, path: &str) -> Result<Node, Problem> {
        self.wait(self.zk.get(path), OpKind::Get, path)
    }

    /// See [`ZooKeeper::exists`].
    pub fn exists(&self, path: &str) -> Result<Option<Stat>, Problem> {
        self.wait(self.zk.exists(path), OpKind::Exists, path)
    }

    /// See [`ZooKeeper::children`].
    pub fn children(&self, path: &str) -> Result<Vec<String>, Problem> {
        self.wait(self.zk.children(path), OpKind::Children, path)
    }

    /// See [`ZooKeeper::get_acl`].
    pub fn get_acl(&self, path: &str) -> Result<(Vec<Acl>, Stat), Problem> {
        self.wait(self.zk.get_acl(path), OpKind::GetAcl, path)
    }

    /// See [`ZooKeeper::set_acl`].
    pub fn set_acl<A>(&self, path: &str, acl: A, version: Option<i32>) -> Result<Stat, Problem>
    where
        A: Into<Cow<'static, [Acl]>>,
    {
        self.wait(self.zk.set_acl(path, acl, version), OpKind::SetAcl, path)
    }

    /// Blocking reads that leave a one-shot watch. See [`ZooKeeper::watch`].
    ///
    /// The returned watches are [`Pending`](crate::Pending) handles, so they can be waited on
    /// with [`Pending::wait`](crate::Pending::wait).
    pub fn watch(&self) -> SyncWatching<'_> {
        SyncWatching(self)
    }

    /// See [`ZooKeeper::add_auth`].
    pub fn add_auth(&self, credential: Credential) -> Result<(), Problem> {
        match self.zk.add_auth(credential).wait(self.timeout) {
            Some(outcome) => outcome,
            None => Err(Problem::Session {
                code: self.gave_up(),
            }),
        }
    }

    /// See [`ZooKeeper::ensure`].
    pub fn ensure(&self, path: &str) -> Result<(), Problem> {
        let target = ZooKeeper::parse(OpKind::Create, path)?;
        let mut missing = target.ancestors();
        if !target.is_root() {
            missing.push(target);
        }
        for p in missing {
            match self.create(p.as_str(), Vec::new(), Acl::open_unsafe(), Disposition::Persistent) {
                Ok(_) => {}
                Err(ref e) if e.code() == Code::NodeExists => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Block until the session is connected. See [`ZooKeeper::await_connected`].
    pub fn await_connected(&self, timeout: Option<Duration>) -> Result<(), Problem> {
        self.zk
            .cell
            .wait_connected(timeout)
            .map_err(|code| Problem::Session { code })
    }

    /// See [`ZooKeeper::watch_state`]. The stream can be consumed from a blocking thread with
    /// `futures::executor::block_on_stream`.
    pub fn watch_state(&self) -> StateWatch {
        self.zk.watch_state()
    }

    /// See [`ZooKeeper::state`].
    pub fn state(&self) -> SessionState {
        self.zk.state()
    }

    /// See [`ZooKeeper::session`].
    pub fn session(&self) -> Option<SessionCredential> {
        self.zk.session()
    }

    /// See [`ZooKeeper::close`].
    pub fn close(&self) {
        futures::executor::block_on(self.zk.close());
    }
}

/// Blocking reads that leave a one-shot watch on the node they read.
#[derive(Debug)]
pub struct SyncWatching<'a>(&'a SyncZooKeeper);

impl SyncWatching<'_> {
    /// See [`Watching::get`](crate::Watching::get).
    pub fn get(&self, path: &str) -> Result<(Node, NodeWatch), Problem> {
        self.0.wait(self.0.zk.watch().get(path), OpKind::Get, path)
    }

    /// See [`Watching::exists`](crate::Watching::exists).
    pub fn exists(&self, path: &str) -> Result<(Option<Stat>, NodeWatch), Problem> {
        self.0
            .wait(self.0.zk.watch().exists(path), OpKind::Exists, path)
    }

    /// See [`Watching::children`](crate::Watching::children).
    pub fn children(&self, path: &str) -> Result<(Vec<String>, NodeWatch), Problem> {
        self.0
            .wait(self.0.zk.watch().children(path), OpKind::Children, path)
    }
}
