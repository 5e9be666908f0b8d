//! Error types for the AdaptiveRefresh daemon.
//!
//! This module defines custom error enums for each component of the daemon,
//! providing descriptive error messages with context information.

use thiserror::Error;

/// Errors related to the touch input source.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Failed to open input device '{path}': {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to register input device for readiness notification: {0}")]
    ReadinessFailed(#[source] std::io::Error),

    #[error("Partial input read of {len} bytes (record size {record_size})")]
    PartialRead { len: usize, record_size: usize },

    #[error("Input device reported end of stream")]
    EndOfStream,

    #[error("Failed to read input device: {0}")]
    ReadFailed(#[from] std::io::Error),
}

/// Errors related to display control operations.
#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("display command '{0}' not found in PATH")]
    CommandNotFound(String),

    #[error("display command failed with exit code {exit_code:?}: {stderr}")]
    CommandFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Requested refresh rate {0}Hz is not a usable rate")]
    InvalidRate(f32),

    #[error("Failed to execute command: {0}")]
    ExecutionFailed(#[from] std::io::Error),
}

/// Errors related to configuration management.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration '{path}': {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Top-level daemon errors.
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Runtime error: {0}")]
    Runtime(String),
}
