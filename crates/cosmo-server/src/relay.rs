//! Per-node dispatch of inbound envelopes.
//!
//! | Node  | event        | Action |
//! |-------|--------------|--------|
//! | Earth | `connection` | fan out to Earth |
//! | Earth | `message`    | hand to the outbound bridge, nothing local |
//! | Mars  | `connection` | fan out to Mars, then Earth |
//! | Mars  | `message`    | dropped, Mars cannot send chat |

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use cosmo_core::{Envelope, EventKind, Planet};
use metrics::counter;
use tracing::{debug, info, warn};

use crate::broadcast::{broadcast_frame, FanoutReport};
use crate::metrics::FRAMES_TOTAL;
use crate::outbound::OutboundBridge;
use crate::registry::ConnectionRegistry;

/// What happened to one inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Re-broadcast verbatim to the listed registries, in order.
    Broadcast(Vec<(Planet, FanoutReport)>),
    /// Queued for the transport layer.
    Forwarded,
    /// Parsed but not handled (Mars chat, Earth chat without text, full queue).
    Dropped,
    /// Not a valid envelope.
    Malformed,
}

/// Both nodes' registries plus the outbound bridge.
pub struct Relay {
    earth: Arc<ConnectionRegistry>,
    mars: Arc<ConnectionRegistry>,
    outbound: OutboundBridge,
}

impl Relay {
    pub fn new(
        earth: Arc<ConnectionRegistry>,
        mars: Arc<ConnectionRegistry>,
        outbound: OutboundBridge,
    ) -> Self {
        Self {
            earth,
            mars,
            outbound,
        }
    }

    pub fn registry(&self, planet: Planet) -> &Arc<ConnectionRegistry> {
        match planet {
            Planet::Earth => &self.earth,
            Planet::Mars => &self.mars,
        }
    }

    /// Handle one text frame received by `node`.
    ///
    /// Presence frames are re-broadcast byte for byte; the parsed envelope is
    /// only used for routing.
    pub fn dispatch(&self, node: Planet, raw: &str) -> DispatchOutcome {
        let envelope = match Envelope::from_json(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                counter!(FRAMES_TOTAL, "node" => node.as_str(), "outcome" => "malformed").increment(1);
                warn!(node = %node, error = %e, "ignoring malformed frame");
                return DispatchOutcome::Malformed;
            }
        };
        debug!(node = %node, event = envelope.event.as_str(), username = %envelope.username, id = envelope.id, "frame received");

        let outcome = match (node, envelope.event) {
            (Planet::Earth, EventKind::Connection) => {
                let frame = Utf8Bytes::from(raw);
                DispatchOutcome::Broadcast(vec![(Planet::Earth, broadcast_frame(&self.earth, &frame))])
            }
            (Planet::Mars, EventKind::Connection) => {
                let frame = Utf8Bytes::from(raw);
                DispatchOutcome::Broadcast(vec![
                    (Planet::Mars, broadcast_frame(&self.mars, &frame)),
                    (Planet::Earth, broadcast_frame(&self.earth, &frame)),
                ])
            }
            (Planet::Earth, EventKind::Message) => match self.outbound.forward(&envelope) {
                Ok(()) => {
                    info!(username = %envelope.username, id = envelope.id, "message queued for transport layer");
                    DispatchOutcome::Forwarded
                }
                Err(e) => {
                    warn!(username = %envelope.username, id = envelope.id, error = %e, "message not forwarded");
                    DispatchOutcome::Dropped
                }
            },
            (Planet::Mars, EventKind::Message) => {
                debug!(username = %envelope.username, id = envelope.id, "mars cannot send messages, dropping");
                DispatchOutcome::Dropped
            }
        };

        let label = match &outcome {
            DispatchOutcome::Broadcast(_) => "broadcast",
            DispatchOutcome::Forwarded => "forwarded",
            DispatchOutcome::Dropped => "dropped",
            DispatchOutcome::Malformed => "malformed",
        };
        counter!(FRAMES_TOTAL, "node" => node.as_str(), "outcome" => label).increment(1);
        outcome
    }
}
