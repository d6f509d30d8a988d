//! # cosmo-core
//!
//! Wire types shared by the relay nodes and the HTTP bridge.
//!
//! - [`Envelope`]: the JSON unit exchanged over the node sockets and rebuilt
//!   from transport-layer callbacks
//! - [`Planet`]: the two fixed node identities
//! - [`send_time`]: conversion between envelope ids and ISO-8601 send times

pub mod envelope;
pub mod planet;
pub mod send_time;

pub use envelope::{Envelope, EventKind};
pub use planet::Planet;
pub use send_time::{parse_send_time, to_send_time, SendTimeError};
