//! Configuration management for the Lantern device daemon

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Default assistant service endpoint
const DEFAULT_ENDPOINT: &str = "https://embeddedassistant.googleapis.com";

/// Default reference path for activation records
const DEFAULT_ACTIVATE_PATH: &str = "activate";

/// Default reference path for the shared release interval
const DEFAULT_RELEASE_INTERVAL_PATH: &str = "releaseInterval";

/// Default trigger debounce in milliseconds
const DEFAULT_DEBOUNCE_MS: u64 = 20;

/// Lantern device configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Assistant stream configuration
    pub assistant: AssistantConfig,

    /// Remote event-store configuration
    pub store: StoreConfig,

    /// GPIO pin assignments
    pub gpio: GpioConfig,

    /// Path to data directory (preferences, logs)
    pub data_dir: PathBuf,
}

/// Assistant stream configuration
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Assistant service endpoint URL
    pub endpoint: String,
}

/// Remote event-store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Store base URL; empty disables the relay controller
    pub base_url: String,

    /// Optional auth token appended to store requests
    pub auth_token: Option<String>,

    /// Reference path holding the activation record collection
    pub activate_path: String,

    /// Reference path holding the default release interval scalar
    pub release_interval_path: String,
}

/// GPIO pin assignments
#[derive(Debug, Clone)]
pub struct GpioConfig {
    /// Push-to-talk button pin (BCM numbering)
    pub button_pin: u32,

    /// Heartbeat LED pin
    pub led_pin: u32,

    /// Relay output pin
    pub relay_pin: u32,

    /// Button is wired active-low (pressed when the level reads low)
    pub button_active_low: bool,

    /// Trigger debounce interval in milliseconds
    pub debounce_ms: u64,
}

impl GpioConfig {
    /// Debounce interval as a [`Duration`]
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            assistant: AssistantConfig {
                endpoint: DEFAULT_ENDPOINT.to_string(),
            },
            store: StoreConfig {
                base_url: String::new(),
                auth_token: None,
                activate_path: DEFAULT_ACTIVATE_PATH.to_string(),
                release_interval_path: DEFAULT_RELEASE_INTERVAL_PATH.to_string(),
            },
            gpio: GpioConfig {
                button_pin: 23,
                led_pin: 25,
                relay_pin: 17,
                button_active_low: true,
                debounce_ms: DEFAULT_DEBOUNCE_MS,
            },
            data_dir: default_data_dir(),
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the TOML file, then environment
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a required value ends up empty
    pub fn load() -> Result<Self> {
        let mut config = Self::default();
        config.apply_file(&file::load_config_file());
        config.apply_env();

        if config.assistant.endpoint.is_empty() {
            return Err(Error::Config(
                "assistant endpoint must not be empty".to_string(),
            ));
        }

        Ok(config)
    }

    /// Overlay values from the config file
    fn apply_file(&mut self, overlay: &file::LanternConfigFile) {
        if let Some(endpoint) = &overlay.assistant.endpoint {
            self.assistant.endpoint.clone_from(endpoint);
        }
        if let Some(base_url) = &overlay.store.base_url {
            self.store.base_url.clone_from(base_url);
        }
        if let Some(token) = &overlay.store.auth_token {
            self.store.auth_token = Some(token.clone());
        }
        if let Some(path) = &overlay.store.activate_path {
            self.store.activate_path.clone_from(path);
        }
        if let Some(path) = &overlay.store.release_interval_path {
            self.store.release_interval_path.clone_from(path);
        }
        if let Some(pin) = overlay.gpio.button_pin {
            self.gpio.button_pin = pin;
        }
        if let Some(pin) = overlay.gpio.led_pin {
            self.gpio.led_pin = pin;
        }
        if let Some(pin) = overlay.gpio.relay_pin {
            self.gpio.relay_pin = pin;
        }
        if let Some(active_low) = overlay.gpio.button_active_low {
            self.gpio.button_active_low = active_low;
        }
        if let Some(debounce) = overlay.gpio.debounce_ms {
            self.gpio.debounce_ms = debounce;
        }
    }

    /// Overlay values from environment variables
    fn apply_env(&mut self) {
        if let Ok(endpoint) = std::env::var("LANTERN_ASSISTANT_ENDPOINT") {
            self.assistant.endpoint = endpoint;
        }
        if let Ok(url) = std::env::var("LANTERN_STORE_URL") {
            self.store.base_url = url;
        }
        if let Ok(token) = std::env::var("LANTERN_STORE_AUTH") {
            self.store.auth_token = Some(token);
        }
        if let Ok(dir) = std::env::var("LANTERN_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
    }
}

/// Default data directory: `~/.lantern`
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("/tmp/.lantern"),
        |dirs| dirs.home_dir().join(".lantern"),
    )
}
