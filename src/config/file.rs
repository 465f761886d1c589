//! TOML configuration file loading
//!
//! Supports `~/.config/lantern/config.toml` as a persistent config source.
//! All fields are optional — the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct LanternConfigFile {
    /// Assistant stream configuration
    #[serde(default)]
    pub assistant: AssistantFileConfig,

    /// Remote event-store configuration
    #[serde(default)]
    pub store: StoreFileConfig,

    /// GPIO pin assignments
    #[serde(default)]
    pub gpio: GpioFileConfig,
}

/// Assistant-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct AssistantFileConfig {
    /// Assistant service endpoint URL
    pub endpoint: Option<String>,
}

/// Event-store configuration
#[derive(Debug, Default, Deserialize)]
pub struct StoreFileConfig {
    /// Store base URL
    pub base_url: Option<String>,

    /// Auth token appended to store requests
    pub auth_token: Option<String>,

    /// Reference path for activation records
    pub activate_path: Option<String>,

    /// Reference path for the default release interval
    pub release_interval_path: Option<String>,
}

/// GPIO pin configuration
#[derive(Debug, Default, Deserialize)]
pub struct GpioFileConfig {
    pub button_pin: Option<u32>,
    pub led_pin: Option<u32>,
    pub relay_pin: Option<u32>,
    pub button_active_low: Option<bool>,
    pub debounce_ms: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `LanternConfigFile::default()` if the file doesn't exist or can't
/// be parsed.
#[must_use]
pub fn load_config_file() -> LanternConfigFile {
    let Some(path) = config_file_path() else {
        return LanternConfigFile::default();
    };

    if !path.exists() {
        return LanternConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                LanternConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            LanternConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/lantern/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("lantern").join("config.toml"))
}
