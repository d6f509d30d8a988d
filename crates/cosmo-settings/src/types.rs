//! Relay settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Configuration for the relay process.
///
/// Serialized in camelCase so that files use the same keys as the rest of the
/// wire protocol (`earthPort`, `transportLayerUrl`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Address all three listeners bind to.
    pub host: String,
    /// WebSocket port for the Earth node.
    pub earth_port: u16,
    /// WebSocket port for the Mars node.
    pub mars_port: u16,
    /// HTTP port for `/receive`, `/health`, `/metrics` and the API docs.
    pub http_port: u16,
    /// Transport-layer endpoint that receives Earth messages.
    pub transport_layer_url: String,
    /// Upper bound on a single transport-layer call.
    pub transport_timeout_ms: u64,
    /// Per-client outgoing frame queue length.
    pub max_send_queue: usize,
    /// Interval between WebSocket pings.
    pub heartbeat_interval_secs: u64,
    /// A client silent for this long is dropped.
    pub client_timeout_secs: u64,
    /// Tell Earth clients when the transport layer rejects a message.
    pub notify_on_relay_failure: bool,
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones.
    pub log_json: bool,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            earth_port: 8005,
            mars_port: 8010,
            http_port: 3001,
            transport_layer_url: "http://127.0.0.1:8080/send".into(),
            transport_timeout_ms: 10_000,
            max_send_queue: 256,
            heartbeat_interval_secs: 30,
            client_timeout_secs: 90,
            notify_on_relay_failure: false,
            log_level: "info".into(),
            log_json: false,
        }
    }
}

impl RelaySettings {
    pub fn transport_timeout(&self) -> Duration {
        Duration::from_millis(self.transport_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }

    /// Reject combinations the server cannot start with.
    ///
    /// Port 0 asks the OS for a free port and may repeat.
    pub fn validate(&self) -> Result<()> {
        let ports = [
            ("earthPort", self.earth_port),
            ("marsPort", self.mars_port),
            ("httpPort", self.http_port),
        ];
        for (i, (name_a, a)) in ports.iter().enumerate() {
            for (name_b, b) in &ports[i + 1..] {
                if *a != 0 && a == b {
                    return Err(SettingsError::InvalidValue(format!(
                        "{name_a} and {name_b} are both {a}"
                    )));
                }
            }
        }
        if self.transport_layer_url.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "transportLayerUrl is empty".into(),
            ));
        }
        if self.transport_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "transportTimeoutMs must be positive".into(),
            ));
        }
        if self.max_send_queue == 0 {
            return Err(SettingsError::InvalidValue(
                "maxSendQueue must be positive".into(),
            ));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "heartbeatIntervalSecs must be positive".into(),
            ));
        }
        if self.client_timeout_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "clientTimeoutSecs must be positive".into(),
            ));
        }
        // Clients that only answer pings must outlive one sweep interval.
        if self.client_timeout_secs < self.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(format!(
                "clientTimeoutSecs ({}) is shorter than heartbeatIntervalSecs ({})",
                self.client_timeout_secs, self.heartbeat_interval_secs
            )));
        }
        Ok(())
    }
}
