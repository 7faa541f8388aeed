use super::request::WriteTo;
use super::{registry::Registry, RawEvent, RawRequest, Request, Response, Transport, Watch, ZkError};
use crate::session::{SessionCell, SessionCredential};
use crate::types::{KeeperState, WatchedEventType};
use crate::{NodeEvent, Path, StateEvent};
use byteorder::{BigEndian, ReadBytesExt};
use futures::{
    channel::{mpsc, oneshot},
    StreamExt,
};
use pin_project::pin_project;
use slog::{debug, error, info, trace, warn};
use std::{
    convert::TryFrom,
    future::Future,
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

/// Receives the raw outcome of a request on the dispatch flow: the decoded response, or the raw
/// failure code.
pub(crate) type Responder = Box<dyn FnOnce(Result<Response, i32>) + Send>;

pub(crate) enum Command {
    Submit {
        request: Request,
        responder: Responder,
        watch: Option<Watch>,
    },
    WatchState(mpsc::UnboundedSender<StateEvent>),
    Close(oneshot::Sender<()>),
}

/// The entry point for submitting work to a session's [`Dispatcher`].
#[derive(Clone, Debug)]
pub(crate) struct Enqueuer(mpsc::UnboundedSender<Command>);

impl Enqueuer {
    /// Queue a command. Hands the command back if the dispatch flow has already exited.
    pub(crate) fn enqueue(&self, command: Command) -> Result<(), Command> {
        self.0
            .unbounded_send(command)
            .map_err(mpsc::TrySendError::into_inner)
    }
}

/// The single dispatch flow of a session.
///
/// Requests are submitted to the transport in the order they were enqueued, and everything the
/// transport reports (replies, triggers, state transitions) is handled in feed order. No two
/// callbacks of the same session ever run concurrently.
#[pin_project]
pub(crate) struct Dispatcher<T> {
    #[pin]
    transport: T,
    inner: Inner,
}

struct Inner {
    registry: Registry,

    /// Incoming commands
    rx: mpsc::UnboundedReceiver<Command>,

    cell: Arc<SessionCell>,

    /// Namespace root all paths are resolved under
    root: Path,

    /// Next xid to issue
    xid: i32,

    logger: slog::Logger,

    exiting: bool,
}

impl<T> Dispatcher<T>
where
    T: Transport,
{
    pub(crate) fn new(
        transport: T,
        cell: Arc<SessionCell>,
        root: Path,
        state_watcher: mpsc::UnboundedSender<StateEvent>,
        logger: slog::Logger,
    ) -> (Self, Enqueuer) {
        let (tx, rx) = mpsc::unbounded();
        let mut registry = Registry::default();
        registry.add_state_watcher(state_watcher);
        let dispatcher = Dispatcher {
            transport,
            inner: Inner {
                registry,
                rx,
                cell,
                root,
                xid: 1,
                logger,
                exiting: false,
            },
        };
        (dispatcher, Enqueuer(tx))
    }
}

impl Inner {
    fn next_xid(&mut self) -> i32 {
        let xid = self.xid;
        // negative xids are reserved by the service
        self.xid = self.xid.checked_add(1).unwrap_or(1);
        xid
    }

    fn poll_enqueue<T: Transport>(&mut self, cx: &mut Context, mut transport: Pin<&mut T>) {
        while !self.exiting {
            match self.rx.poll_next_unpin(cx) {
                Poll::Ready(Some(Command::Submit {
                    request,
                    responder,
                    watch,
                })) => self.submit(transport.as_mut(), request, responder, watch),
                Poll::Ready(Some(Command::WatchState(tx))) => {
                    debug!(self.logger, "adding state watcher");
                    self.registry.add_state_watcher(tx);
                }
                Poll::Ready(Some(Command::Close(ack))) => {
                    info!(self.logger, "closing session");
                    self.cell.close();
                    self.shutdown(transport.as_mut(), ZkError::Closing);
                    let _ = ack.send(());
                }
                Poll::Ready(None) => {
                    // every handle is gone; nobody can submit or close anymore
                    info!(self.logger, "all session handles dropped; closing session");
                    self.cell.close();
                    self.shutdown(transport.as_mut(), ZkError::Closing);
                }
                Poll::Pending => break,
            }
        }
    }

    fn submit<T: Transport>(
        &mut self,
        mut transport: Pin<&mut T>,
        request: Request,
        responder: Responder,
        watch: Option<Watch>,
    ) {
        let xid = self.next_xid();
        let opcode = request.opcode();
        let mut payload = Vec::new();
        if let Err(e) = request.write_to(&mut payload) {
            error!(self.logger, "failed to encode request: {}", e; "xid" => xid);
            responder(Err(ZkError::MarshallingError as i32));
            return;
        }
        debug!(self.logger, "submitting request {:?}", request; "xid" => xid);

        self.registry
            .insert(xid, opcode, responder, watch, &self.logger);
        let raw = RawRequest {
            xid,
            opcode: opcode as i32,
            payload,
        };
        if let Err(e) = transport.submit(raw) {
            warn!(self.logger, "transport refused request: {}", e; "xid" => xid);
            self.registry
                .complete(xid, ZkError::ConnectionLoss as i32, &[], &self.logger);
        }
    }

    fn poll_feed<T: Transport>(&mut self, cx: &mut Context, mut transport: Pin<&mut T>) {
        while !self.exiting {
            match transport.as_mut().poll_next(cx) {
                Poll::Ready(Some(event)) => self.handle(transport.as_mut(), event),
                Poll::Ready(None) => {
                    error!(self.logger, "transport feed ended unexpectedly");
                    self.cell.close();
                    self.shutdown(transport.as_mut(), ZkError::Closing);
                }
                Poll::Pending => break,
            }
        }
    }

    fn handle<T: Transport>(&mut self, transport: Pin<&mut T>, event: RawEvent) {
        match event {
            RawEvent::Handshake {
                session_id,
                password,
                timeout,
                read_only,
            } => {
                info!(self.logger, "session established";
                      "session_id" => session_id,
                      "timeout" => timeout,
                      "read_only" => read_only
                );
                self.cell.establish(
                    SessionCredential {
                        id: session_id,
                        password,
                    },
                    Duration::from_millis(timeout.max(0) as u64),
                    read_only,
                );
            }
            RawEvent::State(code) => self.transition(transport, code),
            RawEvent::Reply { xid, code, payload } => {
                trace!(self.logger, "got reply"; "xid" => xid, "code" => code);
                self.registry.complete(xid, code, &payload, &self.logger);
            }
            RawEvent::Trigger(payload) => match read_trigger(&payload) {
                Ok((WatchedEventType::None, state, _)) => {
                    // session events can arrive dressed up as triggers
                    self.transition(transport, state);
                }
                Ok((event_type, _, path)) => self.trigger(event_type, path),
                Err(e) => warn!(self.logger, "undecodable watch trigger: {}", e),
            },
        }
    }

    fn transition<T: Transport>(&mut self, transport: Pin<&mut T>, code: i32) {
        let state = match KeeperState::try_from(code) {
            Ok(state) => state,
            Err(code) => {
                warn!(self.logger, "ignoring unknown connection state"; "state" => code);
                return;
            }
        };
        if let Some(event) = self.cell.apply(state) {
            info!(self.logger, "session state changed"; "event" => ?event, "state" => ?self.cell.state());
            self.registry.broadcast(event);
            if event == StateEvent::Expired {
                self.shutdown(transport, ZkError::SessionExpired);
            }
        }
    }

    fn trigger(&mut self, event_type: WatchedEventType, path: String) {
        let relative = match self.root.strip(&path) {
            Some(p) => p,
            None => {
                warn!(self.logger, "trigger for path outside the namespace root"; "path" => path);
                return;
            }
        };
        if let Some(event) = NodeEvent::new(event_type, relative) {
            trace!(self.logger, "got watch trigger {:?}", event; "path" => &path);
            self.registry.trigger(&path, event, &self.logger);
        }
    }

    /// Fail everything still pending with `code`, release the transport and stop.
    fn shutdown<T: Transport>(&mut self, mut transport: Pin<&mut T>, code: ZkError) {
        self.exiting = true;
        self.registry.fail_all(code, &self.logger);

        // anything that raced into the queue gets the same answer
        self.rx.close();
        while let Ok(command) = self.rx.try_recv() {
            match command {
                Command::Submit { responder, .. } => responder(Err(code as i32)),
                Command::WatchState(_) => {}
                Command::Close(ack) => {
                    let _ = ack.send(());
                }
            }
        }

        transport.close();
        debug!(self.logger, "dispatcher done");
    }
}

fn read_trigger(mut buf: &[u8]) -> io::Result<(WatchedEventType, i32, String)> {
    use super::response::StringReader;
    let wtype = buf.read_i32::<BigEndian>()?;
    let state = buf.read_i32::<BigEndian>()?;
    let path = buf.read_string()?;
    let wtype = WatchedEventType::try_from(wtype).map_err(|code| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown trigger type {}", code),
        )
    })?;
    Ok((wtype, state, path))
}

impl<T> Future for Dispatcher<T>
where
    T: Transport,
{
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let mut this = self.project();
        trace!(this.inner.logger, "dispatcher polled"; "pending" => this.inner.registry.pending());

        this.inner.poll_enqueue(cx, this.transport.as_mut());
        this.inner.poll_feed(cx, this.transport.as_mut());

        if this.inner.exiting {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}
