//! # cosmo-settings
//!
//! Relay configuration loaded from layered sources (lowest priority first):
//! 1. **Compiled defaults** — [`RelaySettings::default()`]
//! 2. **JSON file** — deep-merged over the defaults when present
//! 3. **Environment variables** — `COSMO_*` overrides
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_overrides, deep_merge, load_settings, load_settings_from_path, RejectedOverride,
};
pub use types::RelaySettings;
