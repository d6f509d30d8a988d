//! WebSocket endpoint of one node and the per-connection read/write loops.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use cosmo_core::Planet;
use futures::{SinkExt, StreamExt};
use metrics::counter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::metrics::{WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};
use crate::registry::ClientConnection;
use crate::relay::Relay;

const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// State shared by every connection of one node.
#[derive(Clone)]
pub struct NodeState {
    pub planet: Planet,
    pub relay: Arc<Relay>,
    pub heartbeat_interval: Duration,
    pub cancel: CancellationToken,
}

/// Router for a node listener. Clients connect to the root path.
pub fn node_router(state: NodeState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<NodeState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Run one connection from `Open` to `Closed`.
async fn handle_socket(socket: WebSocket, state: NodeState) {
    let registry = Arc::clone(state.relay.registry(state.planet));
    let (conn, rx) = registry.register();
    counter!(WS_CONNECTIONS_TOTAL, "node" => state.planet.as_str()).increment(1);
    tracing::info!(node = %state.planet, client_id = %conn.id, clients = registry.len(), "client connected");

    let (ws_tx, ws_rx) = socket.split();
    let mut writer = tokio::spawn(write_loop(
        ws_tx,
        rx,
        Arc::clone(&conn),
        state.heartbeat_interval,
    ));
    let mut reader = tokio::spawn(read_loop(ws_rx, Arc::clone(&conn), state.clone()));

    let writer_done = tokio::select! {
        _ = &mut writer => true,
        _ = &mut reader => false,
        () = conn.closed() => false,
        () = state.cancel.cancelled() => false,
    };

    conn.close();
    let _ = registry.remove(&conn.id);
    reader.abort();
    // The writer sends a close frame once it observes the closed connection.
    if !writer_done && tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
    counter!(WS_DISCONNECTIONS_TOTAL, "node" => state.planet.as_str()).increment(1);
    tracing::info!(node = %state.planet, client_id = %conn.id, "client disconnected");
}

/// Forward queued frames to the socket and ping periodically.
async fn write_loop(
    mut ws_tx: futures::stream::SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<Utf8Bytes>,
    conn: Arc<ClientConnection>,
    heartbeat_interval: Duration,
) {
    let mut ping_interval = tokio::time::interval(heartbeat_interval);
    ping_interval.tick().await;

    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                if ws_tx.send(WsMessage::Text(frame)).await.is_err() {
                    break;
                }
            }
            _ = ping_interval.tick() => {
                if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                tracing::trace!(client_id = %conn.id, "sent ping");
            }
            () = conn.closed() => {
                let _ = ws_tx.send(WsMessage::Close(None)).await;
                break;
            }
        }
    }
    conn.close();
}

/// Dispatch text frames in arrival order until the socket closes or errors.
async fn read_loop(
    mut ws_rx: futures::stream::SplitStream<WebSocket>,
    conn: Arc<ClientConnection>,
    state: NodeState,
) {
    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(node = %state.planet, client_id = %conn.id, error = %e, "socket error");
                break;
            }
        };
        conn.record_activity();
        match msg {
            WsMessage::Text(text) => {
                let _ = state.relay.dispatch(state.planet, text.as_str());
            }
            WsMessage::Binary(bytes) => {
                tracing::warn!(node = %state.planet, client_id = %conn.id, len = bytes.len(), "ignoring binary frame");
            }
            WsMessage::Close(_) => break,
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
        }
    }
    conn.close();
}
