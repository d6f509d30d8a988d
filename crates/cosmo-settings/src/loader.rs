//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::RelaySettings;

/// An environment override whose value did not parse or was out of range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectedOverride {
    pub key: &'static str,
    pub value: String,
}

/// Load settings from an optional file, then apply `COSMO_*` environment overrides.
///
/// Settings are usually loaded before logging is set up, so ignored overrides
/// are returned for the caller to report instead of being logged here.
pub fn load_settings(path: Option<&Path>) -> Result<(RelaySettings, Vec<RejectedOverride>)> {
    let mut settings = match path {
        Some(path) => load_settings_from_path(path)?,
        None => RelaySettings::default(),
    };
    let rejected = apply_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok((settings, rejected))
}

/// Load settings from a specific file, deep-merged over the defaults.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides from a key lookup (normally the process environment).
///
/// Values that fail to parse or fall out of range leave the setting untouched
/// and are returned.
pub fn apply_overrides(
    settings: &mut RelaySettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<RejectedOverride> {
    let read = |key: &str| lookup(key).filter(|v| !v.is_empty());
    let mut rejected = Vec::new();

    if let Some(v) = read("COSMO_HOST") {
        settings.host = v;
    }
    if let Some(v) = read("COSMO_EARTH_PORT")
        .and_then(|v| checked(&mut rejected, "COSMO_EARTH_PORT", v, parse_port))
    {
        settings.earth_port = v;
    }
    if let Some(v) = read("COSMO_MARS_PORT")
        .and_then(|v| checked(&mut rejected, "COSMO_MARS_PORT", v, parse_port))
    {
        settings.mars_port = v;
    }
    if let Some(v) = read("COSMO_HTTP_PORT")
        .and_then(|v| checked(&mut rejected, "COSMO_HTTP_PORT", v, parse_port))
    {
        settings.http_port = v;
    }
    if let Some(v) = read("COSMO_TRANSPORT_URL") {
        settings.transport_layer_url = v;
    }
    if let Some(v) = read("COSMO_TRANSPORT_TIMEOUT_MS")
        .and_then(|v| checked(&mut rejected, "COSMO_TRANSPORT_TIMEOUT_MS", v, |s| parse_u64_range(s, 100, 600_000)))
    {
        settings.transport_timeout_ms = v;
    }
    if let Some(v) = read("COSMO_MAX_SEND_QUEUE")
        .and_then(|v| checked(&mut rejected, "COSMO_MAX_SEND_QUEUE", v, |s| parse_usize_range(s, 1, 65_536)))
    {
        settings.max_send_queue = v;
    }
    if let Some(v) = read("COSMO_HEARTBEAT_INTERVAL_SECS")
        .and_then(|v| checked(&mut rejected, "COSMO_HEARTBEAT_INTERVAL_SECS", v, |s| parse_u64_range(s, 1, 3600)))
    {
        settings.heartbeat_interval_secs = v;
    }
    if let Some(v) = read("COSMO_CLIENT_TIMEOUT_SECS")
        .and_then(|v| checked(&mut rejected, "COSMO_CLIENT_TIMEOUT_SECS", v, |s| parse_u64_range(s, 1, 86_400)))
    {
        settings.client_timeout_secs = v;
    }
    if let Some(v) = read("COSMO_NOTIFY_ON_RELAY_FAILURE")
        .and_then(|v| checked(&mut rejected, "COSMO_NOTIFY_ON_RELAY_FAILURE", v, parse_bool))
    {
        settings.notify_on_relay_failure = v;
    }
    if let Some(v) = read("COSMO_LOG_LEVEL") {
        settings.log_level = v;
    }
    if let Some(v) = read("COSMO_LOG_JSON")
        .and_then(|v| checked(&mut rejected, "COSMO_LOG_JSON", v, parse_bool))
    {
        settings.log_json = v;
    }
    rejected
}

fn checked<T>(
    rejected: &mut Vec<RejectedOverride>,
    key: &'static str,
    val: String,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let result = parse(&val);
    if result.is_none() {
        rejected.push(RejectedOverride { key, value: val });
    }
    result
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a TCP port. `0` is allowed and means "any free port".
pub fn parse_port(val: &str) -> Option<u16> {
    val.trim().parse().ok()
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
