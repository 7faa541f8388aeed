//! Single-resolution handles for values produced by the dispatch flow.

use parking_lot::Mutex;
use std::{
    fmt,
    future::Future,
    mem,
    pin::Pin,
    sync::{mpsc, Arc},
    task::{Context, Poll, Waker},
    time::Duration,
};

type Callback<T> = Box<dyn FnOnce(T) + Send>;

enum Slot<T> {
    Waiting {
        waker: Option<Waker>,
        then: Option<Callback<T>>,
    },
    Ready(T),
    /// Delivered, or cancelled by the caller.
    Done,
}

fn deliver<T>(slot: &Mutex<Slot<T>>, value: T) {
    let mut guard = slot.lock();
    match mem::replace(&mut *guard, Slot::Done) {
        Slot::Waiting {
            then: Some(then), ..
        } => {
            drop(guard);
            then(value);
        }
        Slot::Waiting { waker, then: None } => {
            *guard = Slot::Ready(value);
            drop(guard);
            if let Some(waker) = waker {
                waker.wake();
            }
        }
        // first resolution wins
        Slot::Ready(first) => *guard = Slot::Ready(first),
        Slot::Done => {}
    }
}

/// The resolving half of a [`Pending`].
///
/// A promise that is dropped without being resolved resolves its `Pending` with the fallback
/// value it was created with, so a handle never waits forever on a request the dispatch flow has
/// given up on.
pub(crate) struct Promise<T> {
    slot: Arc<Mutex<Slot<T>>>,
    fallback: Option<T>,
}

impl<T> Promise<T> {
    pub(crate) fn new(fallback: T) -> (Promise<T>, Pending<T>) {
        let slot = Arc::new(Mutex::new(Slot::Waiting {
            waker: None,
            then: None,
        }));
        (
            Promise {
                slot: slot.clone(),
                fallback: Some(fallback),
            },
            Pending { slot },
        )
    }

    pub(crate) fn resolve(mut self, value: T) {
        self.fallback = None;
        deliver(&self.slot, value);
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(fallback) = self.fallback.take() {
            deliver(&self.slot, fallback);
        }
    }
}

/// A deferred value that resolves exactly once.
///
/// `Pending` is a `Future`, so it can simply be `.await`ed. It also supports attaching a
/// continuation with [`Pending::on_complete`], which runs on the session's dispatch flow when the
/// value arrives, and blocking on the value from a thread outside the async runtime with
/// [`Pending::wait`].
///
/// Cancelling a `Pending` never recalls the underlying request; it only suppresses delivery.
#[must_use = "a Pending does nothing unless awaited or given a continuation"]
pub struct Pending<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Pending<T> {
    /// A handle that is already resolved.
    pub(crate) fn ready(value: T) -> Self {
        Pending {
            slot: Arc::new(Mutex::new(Slot::Ready(value))),
        }
    }

    /// Whether the value has arrived and has not been taken yet.
    pub fn is_resolved(&self) -> bool {
        matches!(*self.slot.lock(), Slot::Ready(_))
    }

    /// Stop caring about the value. It is dropped when it arrives.
    pub fn cancel(self) {
        *self.slot.lock() = Slot::Done;
    }

    /// Deliver the value to `f` instead of to this handle.
    ///
    /// If the value has already arrived, `f` runs immediately on the calling thread. Otherwise it
    /// runs on the dispatch flow, and should return quickly. The returned [`Continuation`] can be
    /// used to suppress the call if it has not happened yet.
    pub fn on_complete<F>(self, f: F) -> Continuation<T>
    where
        F: FnOnce(T) + Send + 'static,
    {
        let mut guard = self.slot.lock();
        match mem::replace(&mut *guard, Slot::Done) {
            Slot::Ready(value) => {
                drop(guard);
                f(value);
            }
            Slot::Waiting { .. } => {
                *guard = Slot::Waiting {
                    waker: None,
                    then: Some(Box::new(f)),
                };
            }
            Slot::Done => {}
        }
        Continuation {
            slot: self.slot.clone(),
        }
    }

    /// Block the current thread until the value arrives or `timeout` passes.
    ///
    /// Returns `None` on timeout, in which case the value is discarded whenever it does arrive.
    /// This must not be called from a thread that drives the session's async runtime.
    pub fn wait(self, timeout: Option<Duration>) -> Option<T>
    where
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let continuation = self.on_complete(move |value| {
            // the waiter may have timed out already
            let _ = tx.send(value);
        });
        match timeout {
            Some(timeout) => match rx.recv_timeout(timeout) {
                Ok(value) => Some(value),
                Err(_) => {
                    continuation.cancel();
                    None
                }
            },
            None => rx.recv().ok(),
        }
    }
}

impl<T> Future for Pending<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut guard = self.slot.lock();
        match mem::replace(&mut *guard, Slot::Done) {
            Slot::Ready(value) => Poll::Ready(value),
            Slot::Waiting { then, .. } => {
                *guard = Slot::Waiting {
                    waker: Some(cx.waker().clone()),
                    then,
                };
                Poll::Pending
            }
            Slot::Done => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match *self.slot.lock() {
            Slot::Waiting { .. } => "waiting",
            Slot::Ready(_) => "ready",
            Slot::Done => "done",
        };
        f.debug_struct("Pending").field("state", &state).finish()
    }
}

/// A continuation attached with [`Pending::on_complete`].
pub struct Continuation<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Continuation<T> {
    /// Suppress the continuation if it has not run yet.
    pub fn cancel(self) {
        let mut guard = self.slot.lock();
        if let Slot::Waiting { .. } = *guard {
            *guard = Slot::Done;
        }
    }
}
