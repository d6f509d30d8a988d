//! # cosmo-server
//!
//! The relay between the Earth and Mars chat nodes.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `registry` | Open connections per node |
//! | `broadcast` | Fan-out of one frame to every connection of a registry |
//! | `relay` | Per-node dispatch of inbound envelopes |
//! | `node` | WebSocket endpoint and per-connection read/write loops |
//! | `outbound` | Earth messages → transport layer (worker task) |
//! | `inbound` | Transport-layer callback → both registries |
//! | `http` | HTTP router: `/receive`, `/health`, `/metrics`, API docs |
//! | `server` | Binds the three listeners and owns background tasks |
//!
//! ## Data Flow
//!
//! client → `node` → `relay` → `broadcast` (presence) or `outbound` (chat).
//! Transport layer → `inbound` → `broadcast` to Earth and Mars.

#![deny(unsafe_code)]

pub mod broadcast;
pub mod docs;
pub mod errors;
pub mod health;
pub mod http;
pub mod inbound;
pub mod metrics;
pub mod node;
pub mod outbound;
pub mod registry;
pub mod relay;
pub mod server;

pub use errors::{DeliveryError, ReceiveError, ServerError, TransportError};
pub use outbound::{ForwardRequest, HttpTransport, OutboundBridge, RelayTransport};
pub use registry::{ClientConnection, ClientId, ConnectionRegistry};
pub use relay::{DispatchOutcome, Relay};
pub use server::{start, start_with_transport, ServerHandle};
