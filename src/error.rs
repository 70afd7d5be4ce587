//! Structured error types for configuration operations.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Resolution errors
    MissingKey,
    NestingTooDeep,
    InvalidValue,

    // Source errors
    UnreadableSource,
    MalformedSource,
    UnsupportedFormat,
    InvalidSource,
}

/// Errors raised by the configuration core.
///
/// Polling failures have no variant here; the file watcher logs them and
/// tries again on the next tick.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more placeholders referenced keys with no value and no default.
    #[error("missing required configuration key(s): {}", keys.join(", "))]
    MissingKey { keys: Vec<String> },

    /// Placeholder expansion recursed past the nesting limit.
    #[error("placeholder nesting deeper than {limit} levels while expanding '{key}'")]
    NestingTooDeep { key: String, limit: usize },

    /// A declared file source could not be read.
    #[error("configuration source {} is not readable: {source}", path.display())]
    UnreadableSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A source file failed to parse.
    #[error("configuration source '{source_name}' is malformed: {message}")]
    MalformedSource {
        source_name: String,
        message: String,
    },

    /// The file extension does not map to a known format.
    #[error("unsupported configuration format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    /// A source failed a registration precondition.
    #[error("invalid configuration source: {reason}")]
    InvalidSource { reason: String },

    /// A typed accessor could not convert the resolved value.
    #[error("configuration key '{key}' has value '{value}', expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },
}

impl ConfigError {
    /// Stable code for this error kind.
    pub fn code(&self) -> ErrorCode {
        match self {
            ConfigError::MissingKey { .. } => ErrorCode::MissingKey,
            ConfigError::NestingTooDeep { .. } => ErrorCode::NestingTooDeep,
            ConfigError::UnreadableSource { .. } => ErrorCode::UnreadableSource,
            ConfigError::MalformedSource { .. } => ErrorCode::MalformedSource,
            ConfigError::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            ConfigError::InvalidSource { .. } => ErrorCode::InvalidSource,
            ConfigError::InvalidValue { .. } => ErrorCode::InvalidValue,
        }
    }

    // Convenience constructors

    pub fn missing(keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::MissingKey {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn malformed(source_name: impl Into<String>, message: impl ToString) -> Self {
        Self::MalformedSource {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_source(reason: impl Into<String>) -> Self {
        Self::InvalidSource {
            reason: reason.into(),
        }
    }

    pub fn invalid_value(key: &str, value: &str, expected: &'static str) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected,
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
