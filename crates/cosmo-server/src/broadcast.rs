//! Fan-out of one frame to every open connection of a registry.

use axum::extract::ws::Utf8Bytes;
use cosmo_core::Envelope;
use metrics::counter;
use tracing::{debug, warn};

use crate::metrics::{BROADCASTS_TOTAL, BROADCAST_DROPS_TOTAL};
use crate::registry::ConnectionRegistry;

/// What a single fanout achieved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Open connections in the snapshot.
    pub recipients: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Serialize `envelope` once and deliver it to every open connection.
pub fn broadcast(registry: &ConnectionRegistry, envelope: &Envelope) -> FanoutReport {
    match serde_json::to_string(envelope) {
        Ok(json) => broadcast_frame(registry, &Utf8Bytes::from(json)),
        Err(e) => {
            warn!(node = %registry.planet(), error = %e, "failed to serialize envelope");
            FanoutReport::default()
        }
    }
}

/// Deliver an already-serialized frame to every open connection.
///
/// A failing client is logged and skipped; nothing is retried and the
/// remaining clients still receive the frame.
pub fn broadcast_frame(registry: &ConnectionRegistry, frame: &Utf8Bytes) -> FanoutReport {
    let node = registry.planet().as_str();
    let _order = registry.lock_fanout();
    let mut report = FanoutReport::default();

    for conn in registry.snapshot() {
        if !conn.is_open() {
            continue;
        }
        report.recipients += 1;
        match conn.send(frame.clone()) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                report.failed += 1;
                counter!(BROADCAST_DROPS_TOTAL, "node" => node).increment(1);
                warn!(node, client_id = %conn.id, error = %e, drops = conn.drop_count(), "failed to deliver frame");
            }
        }
    }

    counter!(BROADCASTS_TOTAL, "node" => node).increment(1);
    debug!(
        node,
        recipients = report.recipients,
        delivered = report.delivered,
        "broadcast frame"
    );
    report
}
