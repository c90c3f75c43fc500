//! Outstanding calls and their completion handles.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;

use tinyrpc_common::protocol::Seq;
use tinyrpc_common::{Codec, Result, RpcError};

/// Raw outcome of a call: the encoded reply or the failure.
pub(crate) type Outcome = Result<Vec<u8>>;
pub(crate) type Completion = oneshot::Sender<Outcome>;

struct RegistryState {
    next_seq: Seq,
    pending: HashMap<Seq, Completion>,
    /// Set by the user closing the client.
    closing: bool,
    /// Set when the connection is gone.
    shutdown: bool,
}

/// Table of calls awaiting a response on one connection.
///
/// Whoever removes a call's entry owns its completion, so a call is
/// completed at most once no matter which of the receive loop, a deadline
/// or a teardown gets to it first.
pub(crate) struct CallRegistry {
    state: Mutex<RegistryState>,
}

impl CallRegistry {
    pub(crate) fn new() -> Self {
        CallRegistry {
            state: Mutex::new(RegistryState {
                next_seq: 1,
                pending: HashMap::new(),
                closing: false,
                shutdown: false,
            }),
        }
    }

    /// Assigns the next sequence number and records the call.
    pub(crate) fn register(&self) -> Result<(Seq, oneshot::Receiver<Outcome>)> {
        let mut state = self.state.lock();
        if state.closing || state.shutdown {
            return Err(RpcError::Closing);
        }
        let seq = state.next_seq;
        state.next_seq += 1;

        let (tx, rx) = oneshot::channel();
        state.pending.insert(seq, tx);
        Ok((seq, rx))
    }

    pub(crate) fn remove(&self, seq: Seq) -> Option<Completion> {
        self.state.lock().pending.remove(&seq)
    }

    /// Marks the registry closing; fails if it already was.
    pub(crate) fn mark_closing(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closing {
            return Err(RpcError::Closing);
        }
        state.closing = true;
        Ok(())
    }

    pub(crate) fn is_closing(&self) -> bool {
        let state = self.state.lock();
        state.closing || state.shutdown
    }

    /// Fails every outstanding call with a connection error.
    pub(crate) fn terminate(&self, reason: &str) -> usize {
        let pending: Vec<Completion> = {
            let mut state = self.state.lock();
            state.shutdown = true;
            state.pending.drain().map(|(_, tx)| tx).collect()
        };

        let count = pending.len();
        for tx in pending {
            let _ = tx.send(Err(RpcError::Connection(reason.to_string())));
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().pending.len()
    }
}

/// An in-flight call, resolving to the decoded reply.
///
/// Dropping a `Call` before it resolves abandons it: its entry is removed
/// and a late response is discarded.
#[must_use = "a call does nothing useful unless awaited"]
pub struct Call<R> {
    seq: Seq,
    service_method: String,
    codec: Codec,
    rx: oneshot::Receiver<Outcome>,
    registry: Weak<CallRegistry>,
    finished: bool,
    _reply: PhantomData<fn() -> R>,
}

impl<R> Call<R> {
    pub(crate) fn pending(
        seq: Seq,
        service_method: &str,
        codec: Codec,
        rx: oneshot::Receiver<Outcome>,
        registry: &Arc<CallRegistry>,
    ) -> Self {
        Call {
            seq,
            service_method: service_method.to_string(),
            codec,
            rx,
            registry: Arc::downgrade(registry),
            finished: false,
            _reply: PhantomData,
        }
    }

    /// A call that never reached the wire.
    pub(crate) fn failed(service_method: &str, codec: Codec, error: RpcError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(error));
        Call {
            seq: 0,
            service_method: service_method.to_string(),
            codec,
            rx,
            registry: Weak::new(),
            finished: false,
            _reply: PhantomData,
        }
    }

    /// Sequence number on the wire; 0 for a call that was never sent.
    pub fn seq(&self) -> Seq {
        self.seq
    }

    pub fn service_method(&self) -> &str {
        &self.service_method
    }
}

impl<R: DeserializeOwned> Future for Call<R> {
    type Output = Result<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let outcome = match Pin::new(&mut this.rx).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(outcome) => outcome,
        };
        this.finished = true;

        let result = match outcome {
            Ok(Ok(body)) => this.codec.decode(&body),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RpcError::Connection("call abandoned".to_string())),
        };
        Poll::Ready(result)
    }
}

impl<R> Drop for Call<R> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.seq);
        }
    }
}
