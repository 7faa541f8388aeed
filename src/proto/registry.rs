use super::{dispatcher::Responder, OpCode, Response, Watch, WatchType, ZkError};
use crate::pending::Promise;
use crate::{NodeEvent, StateEvent};
use futures::channel::mpsc;
use slog::{debug, trace, warn};
use std::collections::HashMap;

/// Everything a session is waiting on: replies, node watches and state watchers.
///
/// Only the dispatch flow touches the registry, so it needs no locking of its own.
#[derive(Default)]
pub(super) struct Registry {
    /// What operation are we waiting for a response for?
    reply: HashMap<i32, (OpCode, Responder)>,

    /// Live node watches (path -> watches)
    watchers: HashMap<String, Vec<(Promise<Option<NodeEvent>>, WatchType)>>,

    /// Node watches to make live once their read succeeds (xid -> watch)
    pending_watchers: HashMap<i32, Watch>,

    /// State watchers; these persist until the session ends.
    state_watchers: Vec<mpsc::UnboundedSender<StateEvent>>,
}

impl Registry {
    pub(super) fn insert(
        &mut self,
        xid: i32,
        opcode: OpCode,
        responder: Responder,
        watch: Option<Watch>,
        logger: &slog::Logger,
    ) {
        if let Some(w) = watch {
            trace!(logger, "adding pending watcher"; "xid" => xid, "path" => &w.path, "wtype" => ?w.wtype);
            self.pending_watchers.insert(xid, w);
        }
        if let Some((_, stale)) = self.reply.insert(xid, (opcode, responder)) {
            // xids only repeat after wrapping around; the old request is long gone
            warn!(logger, "xid reused while a request was still pending"; "xid" => xid);
            stale(Err(ZkError::ConnectionLoss as i32));
        }
    }

    pub(super) fn pending(&self) -> usize {
        self.reply.len()
    }

    /// Hand the reply to request `xid` to whoever is waiting for it.
    pub(super) fn complete(&mut self, xid: i32, code: i32, payload: &[u8], logger: &slog::Logger) {
        let (opcode, responder) = match self.reply.remove(&xid) {
            Some(r) => r,
            None => {
                warn!(logger, "dropping reply to unknown request"; "xid" => xid, "code" => code);
                return;
            }
        };

        if let Some(w) = self.pending_watchers.remove(&xid) {
            // normally, watches are *only* added for successful operations
            // the exception to this is if an exists call fails with NoNode
            if code == 0 || (opcode == OpCode::Exists && code == ZkError::NoNode as i32) {
                trace!(logger, "pending watcher turned into real watcher"; "xid" => xid);
                self.watchers
                    .entry(w.path)
                    .or_insert_with(Vec::new)
                    .push((w.promise, w.wtype));
            } else {
                trace!(logger, "pending watcher not turned into real watcher"; "xid" => xid, "code" => code);
                w.promise.resolve(None);
            }
        }

        if code != 0 {
            debug!(logger, "handling service error response"; "xid" => xid, "opcode" => ?opcode, "code" => code);
            responder(Err(code));
            return;
        }

        let mut reader = payload;
        match Response::parse(opcode, &mut reader) {
            Ok(r) => {
                trace!(logger, "handling service response: {:?}", r; "xid" => xid, "opcode" => ?opcode);
                responder(Ok(r));
            }
            Err(e) => {
                warn!(logger, "undecodable reply: {}", e; "xid" => xid, "opcode" => ?opcode);
                responder(Err(ZkError::MarshallingError as i32));
            }
        }
    }

    /// Deliver a node trigger for the node at `path` to every watch it fires, removing them.
    pub(super) fn trigger(&mut self, path: &str, event: NodeEvent, logger: &slog::Logger) {
        let mut remove = false;
        if let Some(watchers) = self.watchers.get_mut(path) {
            trace!(logger, "found potentially waiting watchers"; "path" => path, "n" => watchers.len());

            let mut i = watchers.len();
            while i > 0 {
                i -= 1;
                if watchers[i].1.fired_by(&event) {
                    // this watcher is no longer active
                    let (promise, _) = watchers.swap_remove(i);
                    promise.resolve(Some(event.clone()));
                }
            }
            remove = watchers.is_empty();
        }

        if remove {
            self.watchers.remove(path);
        }
    }

    pub(super) fn add_state_watcher(&mut self, tx: mpsc::UnboundedSender<StateEvent>) {
        self.state_watchers.push(tx);
    }

    pub(super) fn broadcast(&mut self, event: StateEvent) {
        // NOTE: watchers whose stream was dropped are forgotten
        self.state_watchers
            .retain(|tx| tx.unbounded_send(event).is_ok());
    }

    /// Fail every pending request with `code` and invalidate every watch.
    pub(super) fn fail_all(&mut self, code: ZkError, logger: &slog::Logger) {
        debug!(logger, "failing all pending work";
               "code" => ?code,
               "requests" => self.reply.len(),
               "watched_paths" => self.watchers.len()
        );
        for (_, (_, responder)) in self.reply.drain() {
            responder(Err(code as i32));
        }
        // dropped watch promises resolve to None
        self.pending_watchers.clear();
        self.watchers.clear();
        self.state_watchers.clear();
    }
}
