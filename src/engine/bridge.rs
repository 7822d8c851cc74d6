//! Bridge: call a worker's endpoint as if it were a local async function.
//!
//! Each call gets a correlation id and a oneshot waiter. A dispatcher task
//! reads the worker's responses and hands each one to the waiter registered
//! under its id. When the worker's response channel closes, the dispatcher
//! marks the bridge closed and drops every waiter, so pending calls reject
//! with `Disconnected` instead of hanging.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use super::protocol::{Inbound, RemoteError, Request, RequestId, Response};
use super::worker::Worker;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("worker '{0}' already has a bridge connected")]
    AlreadyConnected(String),
    #[error("worker '{0}' terminated before responding")]
    Disconnected(String),
    #[error("failed to encode arguments for '{method}': {source}")]
    Encode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode result of '{method}': {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

type Waiter = oneshot::Sender<Result<Value, RemoteError>>;

#[derive(Default)]
struct Pending {
    closed: bool,
    waiters: HashMap<RequestId, Waiter>,
}

type PendingMap = Arc<Mutex<Pending>>;

pub struct Bridge {
    worker: String,
    requests: mpsc::UnboundedSender<Inbound>,
    next_id: AtomicU64,
    pending: PendingMap,
    dispatcher: JoinHandle<()>,
}

impl Bridge {
    /// Bind to `worker`. Each worker accepts exactly one bridge.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(worker: &mut Worker) -> Result<Bridge, BridgeError> {
        let name = worker.name().to_string();
        let port = worker
            .take_port()
            .ok_or_else(|| BridgeError::AlreadyConnected(name.clone()))?;

        let pending = PendingMap::default();
        let dispatcher = tokio::spawn(dispatch_responses(
            name.clone(),
            port.responses,
            Arc::clone(&pending),
        ));
        tracing::debug!(worker = %name, "bridge connected");

        Ok(Bridge {
            worker: name,
            requests: port.requests,
            next_id: AtomicU64::new(1),
            pending,
            dispatcher,
        })
    }

    pub fn worker_name(&self) -> &str {
        &self.worker
    }

    /// Invoke `method` on the worker and wait for its answer.
    pub async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, BridgeError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)
            .map_err(|source| BridgeError::Encode { method: method.to_string(), source })?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err(BridgeError::Disconnected(self.worker.clone()));
            }
            let request = Request { id, method: method.to_string(), params };
            if self.requests.send(Inbound::Call(request)).is_err() {
                return Err(BridgeError::Disconnected(self.worker.clone()));
            }
            pending.waiters.insert(id, tx);
        }
        tracing::debug!(worker = %self.worker, id, method, "call sent");

        let value = match rx.await {
            Ok(outcome) => outcome?,
            Err(_) => return Err(BridgeError::Disconnected(self.worker.clone())),
        };
        serde_json::from_value(value)
            .map_err(|source| BridgeError::Decode { method: method.to_string(), source })
    }

    /// Number of calls still waiting for a response.
    pub async fn pending_calls(&self) -> usize {
        self.pending.lock().await.waiters.len()
    }

    /// Whether the worker behind this bridge is gone.
    pub async fn is_closed(&self) -> bool {
        self.pending.lock().await.closed
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

async fn dispatch_responses(
    worker: String,
    mut responses: mpsc::UnboundedReceiver<Response>,
    pending: PendingMap,
) {
    while let Some(response) = responses.recv().await {
        route_response(&worker, &pending, response).await;
    }

    let mut pending = pending.lock().await;
    pending.closed = true;
    let orphaned = pending.waiters.len();
    pending.waiters.clear();
    if orphaned > 0 {
        tracing::warn!(worker = %worker, orphaned, "worker exited with calls in flight");
    } else {
        tracing::debug!(worker = %worker, "worker exited");
    }
}

async fn route_response(worker: &str, pending: &Mutex<Pending>, response: Response) {
    let waiter = pending.lock().await.waiters.remove(&response.id);
    match waiter {
        Some(tx) => {
            if tx.send(response.outcome).is_err() {
                tracing::debug!(worker, id = response.id, "caller stopped waiting");
            }
        }
        None => tracing::warn!(worker, id = response.id, "response for unknown call"),
    }
}
