//! Request/response correlation.
//!
//! Every outbound request gets a `Pending` entry keyed by its integer id,
//! holding the completion channel and, when the caller asked for progress,
//! the progress sink indexed by its token. Removal from the table is the
//! single atomic resolution point: whichever of response, timeout, local
//! cancel, or peer cancel removes the entry first wins, and everything else
//! becomes a no-op. Progress sinks die with the entry, so late progress is
//! ignored by construction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::messages::{JsonRpcError, ProgressToken, RequestId};

/// Callback receiving `(progress, total)` updates for one request.
pub type ProgressSink = Arc<dyn Fn(f64, Option<f64>) + Send + Sync>;

/// Terminal outcome delivered to a request's awaiter.
#[derive(Debug)]
pub(crate) enum Completion {
    /// The peer answered with a result
    Result(Value),
    /// The peer answered with an error object
    RpcError(JsonRpcError),
    /// The request was cancelled, locally or by the peer
    Cancelled(Option<String>),
}

struct Pending {
    completion: oneshot::Sender<Completion>,
    progress: Option<ProgressSink>,
    token: Option<String>,
}

struct Inner {
    pending: HashMap<i64, Pending>,
    tokens: HashMap<String, i64>,
}

/// The per-engine pending-request table.
pub(crate) struct Correlator {
    inner: Mutex<Inner>,
}

impl Correlator {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                pending: HashMap::new(),
                tokens: HashMap::new(),
            }),
        }
    }

    /// Insert a pending entry and hand back the completion receiver.
    pub(crate) fn register(
        &self,
        id: i64,
        progress: Option<(String, ProgressSink)>,
    ) -> oneshot::Receiver<Completion> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().expect("correlator poisoned");
        let (token, sink) = match progress {
            Some((token, sink)) => {
                inner.tokens.insert(token.clone(), id);
                (Some(token), Some(sink))
            }
            None => (None, None),
        };
        inner.pending.insert(
            id,
            Pending {
                completion: tx,
                progress: sink,
                token,
            },
        );
        rx
    }

    /// Resolve a pending entry with the peer's response.
    ///
    /// Responses carrying unknown or non-integer ids are tolerated and
    /// dropped silently; returns whether an entry was resolved.
    pub(crate) fn complete(&self, id: &RequestId, outcome: Result<Value, JsonRpcError>) -> bool {
        let Some(id) = id.as_number() else {
            debug!(%id, "dropping response with non-integer id");
            return false;
        };
        match self.take(id) {
            Some(pending) => {
                let completion = match outcome {
                    Ok(value) => Completion::Result(value),
                    Err(err) => Completion::RpcError(err),
                };
                let _ = pending.completion.send(completion);
                true
            }
            None => {
                debug!(id, "dropping response for unknown request id");
                false
            }
        }
    }

    /// Resolve a pending entry as cancelled.
    pub(crate) fn cancel(&self, id: i64, reason: Option<String>) -> bool {
        match self.take(id) {
            Some(pending) => {
                let _ = pending.completion.send(Completion::Cancelled(reason));
                true
            }
            None => false,
        }
    }

    /// Drop a pending entry without delivering anything (timeout path: the
    /// awaiter already knows).
    pub(crate) fn remove(&self, id: i64) -> bool {
        self.take(id).is_some()
    }

    /// Route a progress update to the sink registered under `token`.
    ///
    /// Returns whether a live sink was invoked.
    pub(crate) fn handle_progress(
        &self,
        token: &ProgressToken,
        progress: f64,
        total: Option<f64>,
    ) -> bool {
        let sink = {
            let inner = self.inner.lock().expect("correlator poisoned");
            inner
                .tokens
                .get(&token.to_string())
                .and_then(|id| inner.pending.get(id))
                .and_then(|pending| pending.progress.clone())
        };
        match sink {
            Some(sink) => {
                sink(progress, total);
                true
            }
            None => false,
        }
    }

    /// Number of outstanding requests.
    pub(crate) fn pending_count(&self) -> usize {
        self.inner.lock().expect("correlator poisoned").pending.len()
    }

    fn take(&self, id: i64) -> Option<Pending> {
        let mut inner = self.inner.lock().expect("correlator poisoned");
        let pending = inner.pending.remove(&id)?;
        if let Some(token) = &pending.token {
            inner.tokens.remove(token);
        }
        Some(pending)
    }
}
