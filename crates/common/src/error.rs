//! Service-level error type for systemcheck binaries.

use std::fmt;

/// A specialized Result type for systemcheck services.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while wiring and running a systemcheck service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Server error: {0}")]
    Server(String),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new registry error.
    pub fn registry(msg: impl fmt::Display) -> Self {
        Error::Registry(msg.to_string())
    }

    /// Create a new server error.
    pub fn server(msg: impl fmt::Display) -> Self {
        Error::Server(msg.to_string())
    }
}
