//! Pending-call bookkeeping: promises keyed by correlation id.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{mpsc, Arc};
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::CallError;
use crate::id::CallId;
use crate::wire::results::RemoteMethodCallResults;

/// How a pending call ends: results from the executing side (possibly
/// carrying a fault), or a local failure such as a timeout.
pub type CallOutcome = Result<RemoteMethodCallResults, CallError>;

enum Waiter {
    Async(oneshot::Sender<CallOutcome>),
    Blocking(mpsc::Sender<CallOutcome>),
}

impl Waiter {
    fn send(self, outcome: CallOutcome) {
        match self {
            Waiter::Async(tx) => {
                let _ = tx.send(outcome);
            }
            Waiter::Blocking(tx) => {
                let _ = tx.send(outcome);
            }
        }
    }
}

struct Entry {
    waiter: Waiter,
    /// Whether the call left this node. Only forwarded calls die with
    /// the hub; locally dispatched ones complete on their own.
    forwarded: bool,
}

/// Calls awaiting completion, shared between a router and its waiters.
///
/// Completion is idempotent. Result delivery, timeout and disconnect can
/// race; whichever arrives first takes the entry and the rest find
/// nothing left to complete.
#[derive(Clone, Default)]
pub(crate) struct PendingCalls {
    inner: Arc<Mutex<HashMap<CallId, Entry>>>,
}

impl PendingCalls {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers `id` with an async waiter.
    pub(crate) fn register(&self, id: CallId) -> ResultFuture {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().insert(
            id.clone(),
            Entry {
                waiter: Waiter::Async(tx),
                forwarded: false,
            },
        );
        ResultFuture {
            id,
            rx,
            pending: self.clone(),
        }
    }

    /// Registers `id` with a waiter that parks a plain thread.
    pub(crate) fn register_blocking(&self, id: CallId) -> BlockingReply {
        let (tx, rx) = mpsc::channel();
        self.inner.lock().insert(
            id.clone(),
            Entry {
                waiter: Waiter::Blocking(tx),
                forwarded: false,
            },
        );
        BlockingReply {
            id,
            rx,
            pending: self.clone(),
        }
    }

    /// Marks `id` as forwarded into the mesh. A no-op when the call
    /// already completed.
    pub(crate) fn mark_forwarded(&self, id: &CallId) {
        if let Some(entry) = self.inner.lock().get_mut(id) {
            entry.forwarded = true;
        }
    }

    /// Completes `id` if it is still pending. Returns `false` when the
    /// call already completed, was abandoned, or never existed here.
    pub(crate) fn complete(&self, id: &CallId, outcome: CallOutcome) -> bool {
        let entry = self.inner.lock().remove(id);
        match entry {
            Some(entry) => {
                entry.waiter.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Removes `id` without completing it.
    pub(crate) fn forget(&self, id: &CallId) {
        self.inner.lock().remove(id);
    }

    /// Fails every call that was forwarded into the mesh with a fresh
    /// error from `error`. Calls still dispatching locally keep waiting.
    pub(crate) fn fail_forwarded(&self, error: impl Fn() -> CallError) {
        let drained: Vec<Waiter> = {
            let mut map = self.inner.lock();
            let forwarded: Vec<CallId> = map
                .iter()
                .filter(|(_, entry)| entry.forwarded)
                .map(|(id, _)| id.clone())
                .collect();
            forwarded
                .iter()
                .filter_map(|id| map.remove(id))
                .map(|entry| entry.waiter)
                .collect()
        };
        for waiter in drained {
            waiter.send(Err(error()));
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

/// Completion of one outstanding call, for async callers.
///
/// Dropping the future abandons the call: a result that arrives later is
/// discarded with a log line on the router, not delivered anywhere.
pub struct ResultFuture {
    id: CallId,
    rx: oneshot::Receiver<CallOutcome>,
    pending: PendingCalls,
}

impl ResultFuture {
    /// Correlation id of the call this future completes.
    pub fn call_id(&self) -> &CallId {
        &self.id
    }
}

impl Future for ResultFuture {
    type Output = CallOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(outcome) => outcome,
            Err(_) => Err(CallError::Dropped),
        })
    }
}

impl Drop for ResultFuture {
    fn drop(&mut self) {
        self.pending.forget(&self.id);
    }
}

/// Completion of one outstanding call, for callers parked on a thread.
pub(crate) struct BlockingReply {
    id: CallId,
    rx: mpsc::Receiver<CallOutcome>,
    pending: PendingCalls,
}

impl BlockingReply {
    /// Parks the thread until the call completes. The router's timeout
    /// timer bounds the wait.
    pub(crate) fn recv(self) -> CallOutcome {
        match self.rx.recv() {
            Ok(outcome) => outcome,
            Err(_) => Err(CallError::Dropped),
        }
    }
}

impl Drop for BlockingReply {
    fn drop(&mut self) {
        self.pending.forget(&self.id);
    }
}
