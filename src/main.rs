//! # cosmochat
//!
//! Relay binary: loads settings, starts the Earth and Mars nodes plus the
//! HTTP listener, and runs until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use cosmo_server::metrics::install_recorder;
use cosmo_server::server::DEFAULT_SHUTDOWN_TIMEOUT;
use cosmo_settings::{load_settings, RejectedOverride, RelaySettings};
use cosmo_telemetry::{init_telemetry, TelemetryConfig};

/// CosmoChat interplanetary relay.
#[derive(Parser, Debug)]
#[command(name = "cosmochat", about = "CosmoChat Earth/Mars relay")]
struct Cli {
    /// Settings file (JSON). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Earth node WebSocket port.
    #[arg(long)]
    earth_port: Option<u16>,

    /// Mars node WebSocket port.
    #[arg(long)]
    mars_port: Option<u16>,

    /// HTTP port for `/receive`.
    #[arg(long)]
    http_port: Option<u16>,

    /// Transport-layer endpoint for Earth messages.
    #[arg(long)]
    transport_url: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    /// Command-line flags take precedence over file and environment.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(port) = self.earth_port {
            settings.earth_port = port;
        }
        if let Some(port) = self.mars_port {
            settings.mars_port = port;
        }
        if let Some(port) = self.http_port {
            settings.http_port = port;
        }
        if let Some(url) = &self.transport_url {
            settings.transport_layer_url.clone_from(url);
        }
        if self.log_json {
            settings.log_json = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut settings, rejected) =
        load_settings(cli.config.as_deref()).context("failed to load settings")?;
    cli.apply(&mut settings);

    // The log level and format come from the settings, so overrides ignored
    // while loading are reported only once the subscriber is installed.
    if !init_telemetry(&TelemetryConfig::from_level_name(
        &settings.log_level,
        settings.log_json,
    )) {
        tracing::warn!("a tracing subscriber was already installed, keeping it");
    }
    for RejectedOverride { key, value } in &rejected {
        tracing::warn!(key, value = %value, "invalid env override, ignoring");
    }
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?cli.config,
        "starting cosmochat"
    );
    settings.validate().context("invalid settings")?;

    let metrics = install_recorder()?;
    let handle = cosmo_server::start(&settings, metrics)
        .await
        .context("failed to start relay")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutdown signal received");

    handle.shutdown(Some(DEFAULT_SHUTDOWN_TIMEOUT)).await;
    Ok(())
}
