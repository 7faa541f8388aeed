//! An in-memory ensemble that speaks the raw request/event protocol.
//!
//! Requests are decoded from their wire encoding and applied to a single shared tree, so the
//! facades are exercised end to end exactly as they would be against a real transport.

use crate::proto::{
    write_list, BufferReader, MultiHeader, OpCode, ReadFrom, Request, Response, StringReader,
    WatchType, WriteTo, ZkError,
};
use crate::{
    Acl, ConnectRequest, Connector, Disposition, Id, Permission, RawEvent, RawRequest, Stat,
    Transport,
};
use async_trait::async_trait;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use futures::{channel::mpsc, Stream, StreamExt};
use parking_lot::Mutex;
use std::{
    borrow::Cow,
    cmp::Ordering,
    collections::{BTreeMap, HashMap, HashSet},
    convert::TryFrom,
    io, mem,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

#[derive(Clone)]
struct Znode {
    data: Vec<u8>,
    acl: Vec<Acl>,
    stat: Stat,
}

struct Client {
    feed: mpsc::UnboundedSender<RawEvent>,
    /// Which attachment of the session currently owns it
    generation: u64,
    auth: Vec<Id>,
    data_watches: HashSet<String>,
    child_watches: HashSet<String>,
    exist_watches: HashSet<String>,
    paused: bool,
    backlog: Vec<RawRequest>,
    /// Attached through a server that only serves reads
    read_only: bool,
    /// Raw code to answer the next request with, instead of applying it
    fail_next: Option<i32>,
    /// Whether the transport refuses submits
    refusing: bool,
}

impl Client {
    fn new(feed: mpsc::UnboundedSender<RawEvent>, generation: u64) -> Self {
        Client {
            feed,
            generation,
            auth: Vec::new(),
            data_watches: HashSet::new(),
            child_watches: HashSet::new(),
            exist_watches: HashSet::new(),
            paused: false,
            backlog: Vec::new(),
            read_only: false,
            fail_next: None,
            refusing: false,
        }
    }
}

#[repr(i32)]
#[derive(Clone, Copy, Debug)]
enum Change {
    Created = 1,
    Deleted = 2,
    DataChanged = 3,
    ChildrenChanged = 4,
}

struct Tree {
    nodes: BTreeMap<String, Znode>,
    zxid: i64,
    last_session: i64,
    attachments: u64,
    clients: HashMap<i64, Client>,
    /// Changes whose triggers have not been sent yet
    changes: Vec<(Change, String)>,
    /// Only read-only servers are reachable
    read_only: bool,
}

fn parent_of(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    let i = path.rfind('/')?;
    Some(if i == 0 { "/" } else { &path[..i] })
}

fn disposition(mode: i32) -> io::Result<Disposition> {
    Ok(match mode {
        0 => Disposition::Persistent,
        1 => Disposition::Ephemeral,
        2 => Disposition::PersistentSequential,
        3 => Disposition::EphemeralSequential,
        _ => return Err(io::Error::new(io::ErrorKind::InvalidData, "unknown mode")),
    })
}

fn decode(opcode: OpCode, r: &mut &[u8]) -> io::Result<Request> {
    Ok(match opcode {
        OpCode::Create => Request::Create {
            path: r.read_string()?,
            data: Cow::Owned(r.read_buffer()?),
            acl: Cow::Owned(Vec::<Acl>::read_from(r)?),
            mode: disposition(r.read_i32::<BigEndian>()?)?,
        },
        OpCode::Delete => Request::Delete {
            path: r.read_string()?,
            version: r.read_i32::<BigEndian>()?,
        },
        OpCode::Check => Request::Check {
            path: r.read_string()?,
            version: r.read_i32::<BigEndian>()?,
        },
        OpCode::SetData => Request::SetData {
            path: r.read_string()?,
            data: Cow::Owned(r.read_buffer()?),
            version: r.read_i32::<BigEndian>()?,
        },
        OpCode::Exists => Request::Exists {
            path: r.read_string()?,
            watch: r.read_u8()? != 0,
        },
        OpCode::GetData => Request::GetData {
            path: r.read_string()?,
            watch: r.read_u8()? != 0,
        },
        OpCode::GetChildren => Request::GetChildren {
            path: r.read_string()?,
            watch: r.read_u8()? != 0,
        },
        OpCode::GetAcl => Request::GetAcl {
            path: r.read_string()?,
        },
        OpCode::SetAcl => Request::SetAcl {
            path: r.read_string()?,
            acl: Cow::Owned(Vec::<Acl>::read_from(r)?),
            version: r.read_i32::<BigEndian>()?,
        },
        OpCode::Auth => {
            r.read_i32::<BigEndian>()?;
            Request::Auth {
                scheme: r.read_string()?,
                auth: r.read_buffer()?,
            }
        }
        OpCode::Multi => {
            let mut ops = Vec::new();
            loop {
                match MultiHeader::read_from(r)? {
                    MultiHeader::NextOk(opcode) => ops.push(decode(opcode, r)?),
                    MultiHeader::Done => break,
                    MultiHeader::NextErr(_) => {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "error header in request",
                        ))
                    }
                }
            }
            Request::Multi(ops)
        }
    })
}

fn write_stat(stat: &Stat, buf: &mut Vec<u8>) -> io::Result<()> {
    buf.write_i64::<BigEndian>(stat.czxid)?;
    buf.write_i64::<BigEndian>(stat.mzxid)?;
    buf.write_i64::<BigEndian>(stat.ctime)?;
    buf.write_i64::<BigEndian>(stat.mtime)?;
    buf.write_i32::<BigEndian>(stat.version)?;
    buf.write_i32::<BigEndian>(stat.cversion)?;
    buf.write_i32::<BigEndian>(stat.aversion)?;
    buf.write_i64::<BigEndian>(stat.ephemeral_owner)?;
    buf.write_i32::<BigEndian>(stat.data_length)?;
    buf.write_i32::<BigEndian>(stat.num_children)?;
    buf.write_i64::<BigEndian>(stat.pzxid)
}

fn encode(response: &Response, buf: &mut Vec<u8>) -> io::Result<()> {
    match *response {
        Response::Stat(ref stat) => write_stat(stat, buf),
        Response::GetData {
            ref bytes,
            ref stat,
        } => {
            bytes.as_slice().write_to(&mut *buf)?;
            write_stat(stat, buf)
        }
        Response::GetAcl { ref acl, ref stat } => {
            write_list(&mut *buf, acl)?;
            write_stat(stat, buf)
        }
        Response::Empty => Ok(()),
        Response::Strings(ref items) => {
            buf.write_i32::<BigEndian>(items.len() as i32)?;
            for item in items {
                item.as_str().write_to(&mut *buf)?;
            }
            Ok(())
        }
        Response::String(ref s) => s.as_str().write_to(buf),
        Response::Multi(_) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "nested transaction",
        )),
    }
}

impl Tree {
    fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            Znode {
                data: Vec::new(),
                acl: Acl::open_unsafe().to_vec(),
                stat: Stat::default(),
            },
        );
        Tree {
            nodes,
            zxid: 0,
            last_session: 0x100,
            attachments: 0,
            clients: HashMap::new(),
            changes: Vec::new(),
            read_only: false,
        }
    }

    fn next_zxid(&mut self) -> i64 {
        self.zxid += 1;
        self.zxid
    }

    fn send(&self, session: i64, event: RawEvent) {
        if let Some(client) = self.clients.get(&session) {
            let _ = client.feed.unbounded_send(event);
        }
    }

    fn auth_of(&self, session: i64) -> &[Id] {
        self.clients
            .get(&session)
            .map(|c| &c.auth[..])
            .unwrap_or(&[])
    }

    fn permits(&self, session: i64, node: &Znode, perm: Permission) -> bool {
        let auth = self.auth_of(session);
        node.acl.iter().any(|entry| {
            entry.perms.can(perm) && (entry.id == Id::anyone() || auth.contains(&entry.id))
        })
    }

    fn expand_acl(&self, session: i64, acl: Vec<Acl>) -> Result<Vec<Acl>, ZkError> {
        if acl.is_empty() {
            return Err(ZkError::InvalidAcl);
        }
        let auth = self.auth_of(session);
        let mut expanded = Vec::new();
        for entry in acl {
            if entry.id.scheme == "auth" {
                if auth.is_empty() {
                    return Err(ZkError::InvalidAcl);
                }
                expanded.extend(auth.iter().map(|id| Acl::new(id.clone(), entry.perms)));
            } else {
                expanded.push(entry);
            }
        }
        Ok(expanded)
    }

    fn node(&self, path: &str) -> Result<&Znode, ZkError> {
        self.nodes.get(path).ok_or(ZkError::NoNode)
    }

    fn check_version(node: &Znode, version: i32) -> Result<(), ZkError> {
        if version != -1 && version != node.stat.version {
            Err(ZkError::BadVersion)
        } else {
            Ok(())
        }
    }

    fn create(
        &mut self,
        session: i64,
        path: &str,
        data: Vec<u8>,
        acl: Vec<Acl>,
        mode: Disposition,
    ) -> Result<Response, ZkError> {
        let parent_path = parent_of(path).ok_or(ZkError::NodeExists)?.to_string();
        let acl = self.expand_acl(session, acl)?;
        let parent = self.node(&parent_path)?;
        if parent.stat.ephemeral_owner != 0 {
            return Err(ZkError::NoChildrenForEphemerals);
        }
        if !self.permits(session, parent, Permission::CREATE) {
            return Err(ZkError::NoAuth);
        }
        let name = if mode.is_sequential() {
            format!("{}{:010}", path, parent.stat.cversion)
        } else {
            path.to_string()
        };
        if self.nodes.contains_key(&name) {
            return Err(ZkError::NodeExists);
        }

        let zxid = self.next_zxid();
        let stat = Stat {
            czxid: zxid,
            mzxid: zxid,
            pzxid: zxid,
            ctime: zxid,
            mtime: zxid,
            data_length: data.len() as i32,
            ephemeral_owner: if mode.is_ephemeral() { session } else { 0 },
            ..Stat::default()
        };
        self.nodes.insert(name.clone(), Znode { data, acl, stat });
        if let Some(parent) = self.nodes.get_mut(&parent_path) {
            parent.stat.cversion += 1;
            parent.stat.num_children += 1;
            parent.stat.pzxid = zxid;
        }
        self.changes.push((Change::Created, name.clone()));
        self.changes.push((Change::ChildrenChanged, parent_path));
        Ok(Response::String(name))
    }

    fn remove(&mut self, path: &str) {
        if self.nodes.remove(path).is_none() {
            return;
        }
        let zxid = self.next_zxid();
        self.changes.push((Change::Deleted, path.to_string()));
        if let Some(parent_path) = parent_of(path) {
            if let Some(parent) = self.nodes.get_mut(parent_path) {
                parent.stat.cversion += 1;
                parent.stat.num_children -= 1;
                parent.stat.pzxid = zxid;
            }
            self.changes
                .push((Change::ChildrenChanged, parent_path.to_string()));
        }
    }

    fn delete(&mut self, session: i64, path: &str, version: i32) -> Result<Response, ZkError> {
        let parent_path = parent_of(path).ok_or(ZkError::BadArguments)?;
        let node = self.node(path)?;
        Tree::check_version(node, version)?;
        if node.stat.num_children > 0 {
            return Err(ZkError::NotEmpty);
        }
        if !self.permits(session, self.node(parent_path)?, Permission::DELETE) {
            return Err(ZkError::NoAuth);
        }
        self.remove(path);
        Ok(Response::Empty)
    }

    fn set(
        &mut self,
        session: i64,
        path: &str,
        data: Vec<u8>,
        version: i32,
    ) -> Result<Response, ZkError> {
        let node = self.node(path)?;
        Tree::check_version(node, version)?;
        if !self.permits(session, node, Permission::WRITE) {
            return Err(ZkError::NoAuth);
        }
        let zxid = self.next_zxid();
        let node = self.nodes.get_mut(path).ok_or(ZkError::NoNode)?;
        node.stat.version += 1;
        node.stat.mzxid = zxid;
        node.stat.mtime = zxid;
        node.stat.data_length = data.len() as i32;
        node.data = data;
        let stat = node.stat;
        self.changes.push((Change::DataChanged, path.to_string()));
        Ok(Response::Stat(stat))
    }

    fn set_acl(
        &mut self,
        session: i64,
        path: &str,
        acl: Vec<Acl>,
        version: i32,
    ) -> Result<Response, ZkError> {
        let node = self.node(path)?;
        if version != -1 && version != node.stat.aversion {
            return Err(ZkError::BadVersion);
        }
        if !self.permits(session, node, Permission::ADMIN) {
            return Err(ZkError::NoAuth);
        }
        let acl = self.expand_acl(session, acl)?;
        let node = self.nodes.get_mut(path).ok_or(ZkError::NoNode)?;
        node.stat.aversion += 1;
        node.acl = acl;
        Ok(Response::Stat(node.stat))
    }

    fn watch(&mut self, session: i64, path: &str, wtype: WatchType) {
        if let Some(client) = self.clients.get_mut(&session) {
            let watches = match wtype {
                WatchType::Data => &mut client.data_watches,
                WatchType::Child => &mut client.child_watches,
                WatchType::Exist => &mut client.exist_watches,
            };
            watches.insert(path.to_string());
        }
    }

    fn readable(&self, session: i64, path: &str) -> Result<&Znode, ZkError> {
        let node = self.node(path)?;
        if self.permits(session, node, Permission::READ) {
            Ok(node)
        } else {
            Err(ZkError::NoAuth)
        }
    }

    fn auth(&mut self, session: i64, scheme: String, auth: Vec<u8>) -> Result<Response, ZkError> {
        if auth.is_empty() {
            self.send(session, RawEvent::State(4));
            return Err(ZkError::AuthFailed);
        }
        let id = Id::new(scheme, String::from_utf8_lossy(&auth).into_owned());
        if let Some(client) = self.clients.get_mut(&session) {
            client.auth.push(id);
        }
        self.send(session, RawEvent::State(6));
        Ok(Response::Empty)
    }

    fn apply(&mut self, session: i64, request: Request) -> Result<Response, ZkError> {
        match request {
            Request::Create {
                path,
                data,
                acl,
                mode,
            } => self.create(session, &path, data.into_owned(), acl.into_owned(), mode),
            Request::Delete { path, version } => self.delete(session, &path, version),
            Request::SetData {
                path,
                data,
                version,
            } => self.set(session, &path, data.into_owned(), version),
            Request::Check { path, version } => {
                let node = self.node(&path)?;
                Tree::check_version(node, version)?;
                Ok(Response::Stat(node.stat))
            }
            Request::Exists { path, watch } => {
                if watch {
                    self.watch(session, &path, WatchType::Exist);
                }
                Ok(Response::Stat(self.node(&path)?.stat))
            }
            Request::GetData { path, watch } => {
                let node = self.readable(session, &path)?;
                let response = Response::GetData {
                    bytes: node.data.clone(),
                    stat: node.stat,
                };
                if watch {
                    self.watch(session, &path, WatchType::Data);
                }
                Ok(response)
            }
            Request::GetChildren { path, watch } => {
                self.readable(session, &path)?;
                let children = self
                    .nodes
                    .keys()
                    .filter(|k| parent_of(k) == Some(path.as_str()))
                    .filter_map(|k| k.rsplit('/').next())
                    .map(str::to_string)
                    .collect();
                if watch {
                    self.watch(session, &path, WatchType::Child);
                }
                Ok(Response::Strings(children))
            }
            Request::GetAcl { path } => {
                let node = self.node(&path)?;
                Ok(Response::GetAcl {
                    acl: node.acl.clone(),
                    stat: node.stat,
                })
            }
            Request::SetAcl { path, acl, version } => {
                self.set_acl(session, &path, acl.into_owned(), version)
            }
            Request::Auth { scheme, auth } => self.auth(session, scheme, auth),
            Request::Multi(_) => Err(ZkError::BadArguments),
        }
    }

    fn multi(&mut self, session: i64, ops: Vec<Request>) -> (i32, Vec<u8>) {
        let nodes = self.nodes.clone();
        let zxid = self.zxid;
        let changes = self.changes.len();

        let count = ops.len();
        let mut applied = Vec::with_capacity(count);
        let mut failure = None;
        for (i, op) in ops.into_iter().enumerate() {
            let opcode = op.opcode();
            match self.apply(session, op) {
                Ok(response) => applied.push((opcode, response)),
                Err(e) => {
                    failure = Some((i, e));
                    break;
                }
            }
        }

        let mut buf = Vec::new();
        let written = match failure {
            None => applied.iter().try_for_each(|(opcode, response)| {
                MultiHeader::NextOk(*opcode).write_to(&mut buf)?;
                encode(response, &mut buf)
            }),
            Some((failed, e)) => {
                // all or nothing
                self.nodes = nodes;
                self.zxid = zxid;
                self.changes.truncate(changes);
                (0..count).try_for_each(|i| {
                    let err = match i.cmp(&failed) {
                        Ordering::Less => ZkError::Ok,
                        Ordering::Equal => e,
                        Ordering::Greater => ZkError::RuntimeInconsistency,
                    };
                    MultiHeader::NextErr(err).write_to(&mut buf)?;
                    buf.write_i32::<BigEndian>(err as i32)
                })
            }
        };
        match written.and_then(|()| MultiHeader::Done.write_to(&mut buf)) {
            Ok(()) => (0, buf),
            Err(_) => (ZkError::MarshallingError as i32, Vec::new()),
        }
    }

    fn process(&mut self, session: i64, request: RawRequest) {
        let (scripted, read_only) = match self.clients.get_mut(&session) {
            Some(client) => (client.fail_next.take(), client.read_only),
            None => (None, false),
        };
        if let Some(code) = scripted {
            self.send(
                session,
                RawEvent::Reply {
                    xid: request.xid,
                    code,
                    payload: Vec::new(),
                },
            );
            return;
        }
        let (code, payload) = match OpCode::try_from(request.opcode) {
            Ok(OpCode::Create | OpCode::Delete | OpCode::SetData | OpCode::SetAcl | OpCode::Multi)
                if read_only =>
            {
                (ZkError::NotReadOnly as i32, Vec::new())
            }
            Ok(opcode) => match decode(opcode, &mut &request.payload[..]) {
                Ok(Request::Multi(ops)) => self.multi(session, ops),
                Ok(r) => match self.apply(session, r) {
                    Ok(response) => {
                        let mut buf = Vec::new();
                        match encode(&response, &mut buf) {
                            Ok(()) => (0, buf),
                            Err(_) => (ZkError::MarshallingError as i32, Vec::new()),
                        }
                    }
                    Err(e) => (e as i32, Vec::new()),
                },
                Err(_) => (ZkError::MarshallingError as i32, Vec::new()),
            },
            Err(_) => (ZkError::Unimplemented as i32, Vec::new()),
        };
        // triggers go out ahead of the reply that caused them
        self.flush();
        self.send(
            session,
            RawEvent::Reply {
                xid: request.xid,
                code,
                payload,
            },
        );
    }

    fn flush(&mut self) {
        for (change, path) in mem::take(&mut self.changes) {
            let mut payload = Vec::new();
            payload.write_i32::<BigEndian>(change as i32).unwrap();
            payload.write_i32::<BigEndian>(3).unwrap();
            path.as_str().write_to(&mut payload).unwrap();

            for client in self.clients.values_mut() {
                // one-shot: a fired watch is forgotten
                let fired = match change {
                    Change::Created => client.exist_watches.remove(&path),
                    Change::DataChanged => {
                        client.data_watches.remove(&path) | client.exist_watches.remove(&path)
                    }
                    Change::ChildrenChanged => client.child_watches.remove(&path),
                    Change::Deleted => {
                        client.data_watches.remove(&path)
                            | client.exist_watches.remove(&path)
                            | client.child_watches.remove(&path)
                    }
                };
                if fired {
                    let _ = client
                        .feed
                        .unbounded_send(RawEvent::Trigger(payload.clone()));
                }
            }
        }
    }

    fn end_session(&mut self, session: i64) {
        self.clients.remove(&session);
        let owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.stat.ephemeral_owner == session)
            .map(|(path, _)| path.clone())
            .collect();
        for path in owned {
            self.remove(&path);
        }
        self.flush();
    }
}

/// A shared in-memory namespace that any number of sessions can connect to.
#[derive(Clone)]
pub(crate) struct MemoryEnsemble {
    tree: Arc<Mutex<Tree>>,
}

impl MemoryEnsemble {
    pub(crate) fn new() -> Self {
        MemoryEnsemble {
            tree: Arc::new(Mutex::new(Tree::new())),
        }
    }

    fn attach(&self, request: ConnectRequest) -> MemoryTransport {
        let (tx, rx) = mpsc::unbounded();
        let mut tree = self.tree.lock();
        let session = match request.session {
            Some(ref session) if tree.clients.contains_key(&session.id) => session.id,
            Some(ref session) => {
                let _ = tx.unbounded_send(RawEvent::State(-112));
                return MemoryTransport {
                    session: session.id,
                    generation: 0,
                    tree: self.tree.clone(),
                    events: rx,
                    closed: true,
                };
            }
            None => {
                tree.last_session += 1;
                tree.last_session
            }
        };

        let read_only = tree.read_only && request.read_only;
        let _ = tx.unbounded_send(RawEvent::Handshake {
            session_id: session,
            password: b"hunter2".to_vec(),
            timeout: request.session_timeout.as_millis() as i32,
            read_only,
        });
        let _ = tx.unbounded_send(RawEvent::State(if read_only { 5 } else { 3 }));
        tree.attachments += 1;
        let generation = tree.attachments;
        let client = tree
            .clients
            .entry(session)
            .or_insert_with(|| Client::new(tx.clone(), generation));
        // a previous attachment's feed ends
        client.feed = tx;
        client.generation = generation;
        client.read_only = read_only;

        MemoryTransport {
            session,
            generation,
            tree: self.tree.clone(),
            events: rx,
            closed: false,
        }
    }

    /// Report a raw connection state to `session`.
    pub(crate) fn set_state(&self, session: i64, state: i32) {
        self.tree.lock().send(session, RawEvent::State(state));
    }

    /// Put `event` on the feed of `session` as is.
    pub(crate) fn send_raw(&self, session: i64, event: RawEvent) {
        self.tree.lock().send(session, event);
    }

    /// Serve sessions that accept it from a read-only server from now on.
    pub(crate) fn set_read_only(&self, read_only: bool) {
        self.tree.lock().read_only = read_only;
    }

    /// Answer the next request of `session` with the raw `code`, without applying it.
    pub(crate) fn fail_next(&self, session: i64, code: i32) {
        if let Some(client) = self.tree.lock().clients.get_mut(&session) {
            client.fail_next = Some(code);
        }
    }

    /// Make the transport of `session` refuse (or accept again) submitted requests.
    pub(crate) fn refuse(&self, session: i64, refusing: bool) {
        if let Some(client) = self.tree.lock().clients.get_mut(&session) {
            client.refusing = refusing;
        }
    }

    /// Expire `session`, removing its ephemeral nodes.
    pub(crate) fn expire(&self, session: i64) {
        let mut tree = self.tree.lock();
        tree.send(session, RawEvent::State(-112));
        tree.end_session(session);
    }

    /// Hold back the requests of `session` until [`MemoryEnsemble::resume`].
    pub(crate) fn pause(&self, session: i64) {
        if let Some(client) = self.tree.lock().clients.get_mut(&session) {
            client.paused = true;
        }
    }

    pub(crate) fn resume(&self, session: i64) {
        let mut tree = self.tree.lock();
        let backlog = match tree.clients.get_mut(&session) {
            Some(client) => {
                client.paused = false;
                mem::take(&mut client.backlog)
            }
            None => return,
        };
        for request in backlog {
            tree.process(session, request);
        }
    }

    pub(crate) fn contains(&self, path: &str) -> bool {
        self.tree.lock().nodes.contains_key(path)
    }

    /// The number of live sessions.
    pub(crate) fn sessions(&self) -> usize {
        self.tree.lock().clients.len()
    }
}

#[async_trait]
impl Connector for MemoryEnsemble {
    type Transport = MemoryTransport;

    async fn connect(&self, request: ConnectRequest) -> Result<MemoryTransport, failure::Error> {
        Ok(self.attach(request))
    }
}

pub(crate) struct MemoryTransport {
    session: i64,
    generation: u64,
    tree: Arc<Mutex<Tree>>,
    events: mpsc::UnboundedReceiver<RawEvent>,
    closed: bool,
}

impl Stream for MemoryTransport {
    type Item = RawEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<RawEvent>> {
        self.events.poll_next_unpin(cx)
    }
}

impl Transport for MemoryTransport {
    fn submit(&mut self, request: RawRequest) -> Result<(), failure::Error> {
        if self.closed {
            return Err(failure::err_msg("transport is closed"));
        }
        let mut tree = self.tree.lock();
        let client = match tree.clients.get_mut(&self.session) {
            Some(client) if client.generation == self.generation => client,
            _ => return Err(failure::err_msg("session is gone")),
        };
        if client.refusing {
            return Err(failure::err_msg("connection lost"));
        }
        if client.paused {
            client.backlog.push(request);
        } else {
            tree.process(self.session, request);
        }
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let mut tree = self.tree.lock();
            let current = tree
                .clients
                .get(&self.session)
                .map_or(false, |c| c.generation == self.generation);
            if current {
                tree.end_session(self.session);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(xid: i32, r: Request) -> RawRequest {
        let mut payload = Vec::new();
        r.write_to(&mut payload).unwrap();
        RawRequest {
            xid,
            opcode: r.opcode() as i32,
            payload,
        }
    }

    #[test]
    fn failed_transaction_leaves_no_trace() {
        let ensemble = MemoryEnsemble::new();
        let mut transport = ensemble.attach(ConnectRequest {
            session_timeout: std::time::Duration::from_secs(10),
            read_only: false,
            session: None,
        });
        transport
            .submit(request(
                1,
                Request::Multi(vec![
                    Request::Create {
                        path: "/x".to_string(),
                        data: Cow::Borrowed(&b""[..]),
                        acl: Cow::Borrowed(Acl::open_unsafe()),
                        mode: Disposition::Persistent,
                    },
                    Request::SetData {
                        path: "/x".to_string(),
                        data: Cow::Borrowed(&b"1"[..]),
                        version: 3,
                    },
                    Request::Check {
                        path: "/x".to_string(),
                        version: -1,
                    },
                ]),
            ))
            .unwrap();
        assert!(!ensemble.contains("/x"));

        let events: Vec<_> = futures::executor::block_on_stream(transport).take(3).collect();
        assert!(matches!(events[0], RawEvent::Handshake { .. }));
        assert_eq!(events[1], RawEvent::State(3));
        match events[2] {
            RawEvent::Reply {
                xid: 1,
                code: 0,
                ref payload,
            } => {
                let r = Response::parse(OpCode::Multi, &mut &payload[..]).unwrap();
                assert_eq!(
                    r,
                    Response::Multi(vec![
                        Err(ZkError::Ok),
                        Err(ZkError::BadVersion),
                        Err(ZkError::RuntimeInconsistency),
                    ])
                );
            }
            ref other => panic!("unexpected event {:?}", other),
        }
    }
}
