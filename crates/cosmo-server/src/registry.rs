//! Open client connections of one node.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::Utf8Bytes;
use cosmo_core::Planet;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::errors::DeliveryError;

/// Server-assigned connection identifier.
///
/// Clients have no identity of their own until they announce a username in an
/// envelope, and that identity is never bound to the connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(pub String);

impl Default for ClientId {
    fn default() -> Self {
        Self(format!("client_{}", Uuid::now_v7()))
    }
}

impl ClientId {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connected WebSocket client.
///
/// Frames are handed to the connection's writer task through a bounded queue,
/// so delivering never waits on the socket.
pub struct ClientConnection {
    pub id: ClientId,
    tx: mpsc::Sender<Utf8Bytes>,
    open: AtomicBool,
    last_seen: Mutex<Instant>,
    dropped: AtomicU64,
    closed: CancellationToken,
}

impl ClientConnection {
    pub fn new(id: ClientId, tx: mpsc::Sender<Utf8Bytes>) -> Self {
        Self {
            id,
            tx,
            open: AtomicBool::new(true),
            last_seen: Mutex::new(Instant::now()),
            dropped: AtomicU64::new(0),
            closed: CancellationToken::new(),
        }
    }

    /// Queue a text frame for this client.
    pub fn send(&self, frame: Utf8Bytes) -> Result<(), DeliveryError> {
        if !self.is_open() {
            return Err(DeliveryError::Closed);
        }
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(DeliveryError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(DeliveryError::Closed)
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    /// Transition to `Closed`. Wakes the connection's socket loops.
    pub fn close(&self) {
        self.open.store(false, Ordering::Relaxed);
        self.closed.cancel();
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Record inbound traffic (any frame, including pongs).
    pub fn record_activity(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    pub fn is_alive(&self, timeout: Duration) -> bool {
        self.last_seen.lock().elapsed() < timeout
    }

    /// Frames that could not be queued for this client.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Registry of one node's open connections.
///
/// Written by the owning node's socket handlers, read by any fanout, including
/// those triggered by the other node or by the HTTP bridge.
pub struct ConnectionRegistry {
    planet: Planet,
    clients: DashMap<ClientId, Arc<ClientConnection>>,
    fanout: Mutex<()>,
    max_send_queue: usize,
}

impl ConnectionRegistry {
    pub fn new(planet: Planet, max_send_queue: usize) -> Self {
        Self {
            planet,
            clients: DashMap::new(),
            fanout: Mutex::new(()),
            max_send_queue: max_send_queue.max(1),
        }
    }

    pub fn planet(&self) -> Planet {
        self.planet
    }

    /// Create a connection with its outgoing queue and add it.
    pub fn register(&self) -> (Arc<ClientConnection>, mpsc::Receiver<Utf8Bytes>) {
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let conn = Arc::new(ClientConnection::new(ClientId::new(), tx));
        self.add(Arc::clone(&conn));
        (conn, rx)
    }

    pub fn add(&self, connection: Arc<ClientConnection>) {
        let _ = self.clients.insert(connection.id.clone(), connection);
    }

    /// Remove a connection. Returns `false` if it was not registered.
    pub fn remove(&self, id: &ClientId) -> bool {
        self.clients.remove(id).is_some()
    }

    /// Copy of the current connection set.
    pub fn snapshot(&self) -> Vec<Arc<ClientConnection>> {
        self.clients.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    pub fn contains(&self, id: &ClientId) -> bool {
        self.clients.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Serializes fanouts into this registry so every client sees frames in
    /// the order they reached the registry.
    pub(crate) fn lock_fanout(&self) -> MutexGuard<'_, ()> {
        self.fanout.lock()
    }

    /// Close and remove clients that have been silent longer than `timeout`.
    pub fn cleanup_dead_clients(&self, timeout: Duration) -> usize {
        let dead: Vec<Arc<ClientConnection>> = self
            .clients
            .iter()
            .filter(|entry| !entry.value().is_alive(timeout))
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for conn in &dead {
            conn.close();
            let _ = self.remove(&conn.id);
            tracing::info!(node = %self.planet, client_id = %conn.id, "cleaned up dead client");
        }
        dead.len()
    }
}

/// Periodically sweep a registry for silent clients.
pub fn start_cleanup_task(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = registry.cleanup_dead_clients(timeout);
                    if removed > 0 {
                        tracing::info!(node = %registry.planet(), removed, "dead client cleanup");
                    }
                }
                () = cancel.cancelled() => break,
            }
        }
    })
}
