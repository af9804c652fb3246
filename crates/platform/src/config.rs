//! Application configuration and constants
//!
//! Central naming values used across the workspace. Board identity strings
//! shown on the virtual drive default to these rather than hardcoding values.

/// The application name
pub const APP_NAME: &str = "Modem UF2 Kit";

/// Application version (synchronized with Cargo.toml)
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// NVS namespace exposed through CONFIG.INI unless the board overrides it
pub const DEFAULT_NVS_NAMESPACE: &str = "uf2_nvs";

