//! Error types for the system registry.

use std::fmt;

/// Failure reported by a probe.
///
/// Probe errors are opaque to the engine: the message is recorded in the
/// system's error buffer and logged, nothing more.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProbeError {
    message: String,
}

impl ProbeError {
    /// Create a probe error from anything printable.
    pub fn new(message: impl fmt::Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    /// The recorded message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ProbeError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ProbeError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Errors surfaced to callers of the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("system [{name}] is not registered")]
    NotFound { name: String },

    #[error("invalid system configuration: {0}")]
    Config(String),

    /// A reported error re-raised by an [`ErrorSink`](crate::ErrorSink)
    /// that has no handler attached.
    #[error("reported error: {0}")]
    Probe(#[from] ProbeError),

    #[error("no Tokio runtime available to schedule probes")]
    NoRuntime,
}

impl RegistryError {
    pub fn not_found(name: impl Into<String>) -> Self {
        RegistryError::NotFound { name: name.into() }
    }

    pub fn config(msg: impl fmt::Display) -> Self {
        RegistryError::Config(msg.to_string())
    }

    /// True for the [`RegistryError::NotFound`] variant.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound { .. })
    }
}

/// A specialized Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
