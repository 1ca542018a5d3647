//! Error types for component_log
//!
//! This module defines all error types used throughout the crate. Most of them
//! never reach the caller: configuration loading failures are recovered inside
//! the resolver and initialization failures degrade to a no-op logger.

use thiserror::Error;

/// Main error type for component_log operations
#[derive(Error, Debug)]
pub enum ComponentLogError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Configuration file not found
    #[error("Configuration file not found: {0}")]
    ConfigFileMissing(String),

    /// Invalid log level
    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    /// 当前运行环境无法构建任何输出
    #[error("Unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    /// TOML parsing errors
    #[error("TOML parsing error: {source}")]
    TomlError {
        #[from]
        source: toml::de::Error,
    },

    /// Tracing subscriber errors
    #[error("Tracing error: {0}")]
    TracingError(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for component_log operations
pub type Result<T> = std::result::Result<T, ComponentLogError>;

impl ComponentLogError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a new tracing error
    pub fn tracing<S: Into<String>>(msg: S) -> Self {
        Self::TracingError(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::InternalError(msg.into())
    }

    /// Check if this error is recoverable
    ///
    /// 可恢复的错误意味着保留之前的配置继续运行。
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::ConfigError(_)
            | Self::ConfigFileMissing(_)
            | Self::InvalidLogLevel(_)
            | Self::IoError { .. }
            | Self::SerializationError { .. }
            | Self::TomlError { .. } => true,
            Self::UnsupportedEnvironment(_)
            | Self::TracingError(_)
            | Self::InternalError(_) => false,
        }
    }

    /// Get the error category for logging purposes
    pub fn category(&self) -> &'static str {
        match self {
            Self::ConfigError(_) | Self::ConfigFileMissing(_) | Self::InvalidLogLevel(_) => {
                "config"
            }
            Self::UnsupportedEnvironment(_) => "initialization",
            Self::IoError { .. } => "io",
            Self::SerializationError { .. } => "serialization",
            Self::TomlError { .. } => "toml",
            Self::TracingError(_) => "tracing",
            Self::InternalError(_) => "internal",
        }
    }
}
