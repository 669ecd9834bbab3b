//! Core error types for worktimer-core.
//!
//! Only construction and file I/O can fail. Schedule math, recovery and the
//! timer reducer are total functions and never return these errors.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for worktimer-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML decoding errors
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML encoding errors
    #[error("TOML encode error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The data directory could not be determined or created.
    #[error("Data directory unavailable: {0}")]
    DataDirUnavailable(String),

    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Hour or minute outside 0..=23 / 0..=59
    #[error("Invalid local time {hour:02}:{minute:02}")]
    InvalidLocalTime { hour: u32, minute: u32 },

    /// Text that is not of the form HH:MM
    #[error("Cannot parse '{0}' as HH:MM")]
    MalformedLocalTime(String),

    /// Weekday number outside the accepted numbering
    #[error("Invalid weekday number {0}")]
    InvalidWeekday(u32),

    /// Weekday name that is not recognized
    #[error("Unknown weekday '{0}'")]
    UnknownWeekday(String),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
