//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::errors::ServerError;

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Returns the handle used to render `/metrics`. Call once at startup.
pub fn install_recorder() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// A handle that is not installed globally. Metrics recorded through the
/// `metrics` macros will not show up in it.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// WebSocket connections opened (counter, labels: node).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket connections closed (counter, labels: node).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Inbound text frames (counter, labels: node, outcome).
pub const FRAMES_TOTAL: &str = "ws_frames_total";
/// Fanouts performed (counter, labels: node).
pub const BROADCASTS_TOTAL: &str = "broadcasts_total";
/// Frames that could not be queued for a client (counter, labels: node).
pub const BROADCAST_DROPS_TOTAL: &str = "broadcast_drops_total";
/// Messages handed to the transport layer (counter).
pub const FORWARDS_TOTAL: &str = "transport_forwards_total";
/// Transport-layer failures (counter, labels: kind).
pub const FORWARD_FAILURES_TOTAL: &str = "transport_forward_failures_total";
/// Transport-layer callbacks (counter, labels: status).
pub const RECEIVES_TOTAL: &str = "transport_receives_total";
