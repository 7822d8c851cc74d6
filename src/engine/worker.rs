//! Background execution context: a named OS thread running an endpoint's
//! message loop.
//!
//! The worker shares nothing with its caller except the two channels of its
//! `Port`. Its loop handles one request at a time, in arrival order, and
//! exits on `terminate`, when every request sender is gone, or when the
//! endpoint panics. In all three cases the response channel closes, which is
//! how a connected bridge learns the worker is gone.

use std::thread::JoinHandle;

use tokio::sync::mpsc;

use crate::{WorkerError, WorkerResult};

use super::endpoint::Endpoint;
use super::protocol::{Inbound, Response};

/// The caller's side of a worker's channels. Taken once, by the bridge.
pub struct Port {
    pub(crate) requests: mpsc::UnboundedSender<Inbound>,
    pub(crate) responses: mpsc::UnboundedReceiver<Response>,
}

pub struct Worker {
    name: String,
    control: mpsc::UnboundedSender<Inbound>,
    port: Option<Port>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    /// Start a worker thread named `name` serving `endpoint`.
    pub fn spawn<E: Endpoint>(name: impl Into<String>, endpoint: E) -> WorkerResult<Worker> {
        let name = name.into();
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();

        let loop_name = name.clone();
        let thread = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_loop(&loop_name, endpoint, request_rx, response_tx))
            .map_err(|e| WorkerError::Message(format!("failed to spawn worker '{name}': {e}")))?;

        tracing::debug!(worker = %name, "worker started");
        Ok(Worker {
            name,
            control: request_tx.clone(),
            port: Some(Port { requests: request_tx, responses: response_rx }),
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn take_port(&mut self) -> Option<Port> {
        self.port.take()
    }

    /// Whether the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Ask the loop to stop once the requests queued before this one are done.
    pub fn terminate(&self) {
        if self.control.send(Inbound::Terminate).is_ok() {
            tracing::debug!(worker = %self.name, "worker termination requested");
        }
    }

    /// Terminate and wait for the thread. Blocks while a request is running.
    pub fn join(mut self) -> WorkerResult<()> {
        self.terminate();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| WorkerError::Message(format!("worker '{}' panicked", self.name))),
            None => Ok(()),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.terminate();
        }
    }
}

fn run_loop<E: Endpoint>(
    name: &str,
    mut endpoint: E,
    mut requests: mpsc::UnboundedReceiver<Inbound>,
    responses: mpsc::UnboundedSender<Response>,
) {
    while let Some(message) = requests.blocking_recv() {
        let request = match message {
            Inbound::Call(request) => request,
            Inbound::Terminate => break,
        };
        tracing::debug!(worker = name, id = request.id, method = %request.method, "request received");
        let outcome = endpoint.dispatch(&request.method, request.params);
        if responses.send(Response { id: request.id, outcome }).is_err() {
            tracing::debug!(worker = name, "bridge gone, stopping");
            break;
        }
    }
    tracing::debug!(worker = name, "worker loop exited");
}
