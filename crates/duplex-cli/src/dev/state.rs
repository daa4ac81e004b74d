//! Shared state for the development server.
//!
//! Tracks the connected SSE clients and the last frontend result, so a
//! browser that connects after a failed rebuild still sees the failure. Also
//! owns the HTTP client used to reach the backend.

use axum::body::Body;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::DevEvent;

const CLIENT_BUFFER: usize = 100;

pub type ClientRegistry = RwLock<HashMap<usize, mpsc::Sender<String>>>;

pub struct DevServerState {
    clients: ClientRegistry,
    next_client_id: RwLock<usize>,
    last: RwLock<Option<DevEvent>>,
    out_dir: PathBuf,
    upstream: SocketAddr,
    client: Client<HttpConnector, Body>,
}

pub type SharedState = Arc<DevServerState>;

impl DevServerState {
    pub fn new(out_dir: impl Into<PathBuf>, upstream: SocketAddr) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            next_client_id: RwLock::new(0),
            last: RwLock::new(None),
            out_dir: out_dir.into(),
            upstream,
            client: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn upstream(&self) -> SocketAddr {
        self.upstream
    }

    pub(crate) fn http_client(&self) -> &Client<HttpConnector, Body> {
        &self.client
    }

    /// Register a client. If the last rebuild failed, the failure is queued
    /// for it right away; replaying a success would reload a fresh page.
    pub fn register_client(&self) -> (usize, mpsc::Receiver<String>) {
        let id = {
            let mut next_id = self.next_client_id.write();
            let id = *next_id;
            *next_id += 1;
            id
        };

        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        // Held until the client is registered so a concurrent publish is
        // either replayed here or broadcast to it, never lost.
        let last = self.last.read();
        if let Some(event @ DevEvent::Failed { .. }) = last.as_ref() {
            let _ = tx.try_send(encode(event));
        }
        self.clients.write().insert(id, tx);
        (id, rx)
    }

    pub fn unregister_client(&self, id: usize) {
        self.clients.write().remove(&id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    pub fn last_event(&self) -> Option<DevEvent> {
        self.last.read().clone()
    }

    /// Remember a rebuild result and push it to every client.
    pub fn publish(&self, event: DevEvent) {
        let mut last = self.last.write();
        self.broadcast(&event);
        *last = Some(event);
    }

    /// Push `event` without blocking; clients that are gone are dropped and
    /// clients with a full buffer miss this event.
    pub fn broadcast(&self, event: &DevEvent) {
        let data = encode(event);
        let clients: Vec<_> = self
            .clients
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        for (id, tx) in clients {
            match tx.try_send(data.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!(client = id, "reload client is not keeping up, event dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => self.unregister_client(id),
            }
        }
    }
}

fn encode(event: &DevEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string())
}
