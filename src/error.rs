//! Error types for the Lantern device daemon

use thiserror::Error;

/// Result type alias for Lantern operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Lantern device daemon
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or read error
    #[error("audio error: {0}")]
    Audio(String),

    /// Conversation stream could not be established
    #[error("connection error: {0}")]
    Connection(String),

    /// Mid-stream failure on an established conversation stream
    #[error("stream error: {0}")]
    Stream(String),

    /// GPIO peripheral error (button, LED, relay)
    #[error("gpio error: {0}")]
    Gpio(String),

    /// Remote event-store error (subscription or record deletion)
    #[error("store error: {0}")]
    Store(String),

    /// Preference persistence error
    #[error("preference error: {0}")]
    Prefs(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
