//! Error types for kiosk-server
//!
//! Structured error handling across server configuration, startup, network
//! binding, database lifecycle, and resource naming.

use thiserror::Error;

/// Main error type for the embedded server harness
#[derive(Error, Debug)]
pub enum ServerError {
    /// Misconfiguration or illegal lifecycle transition during startup
    #[error("Startup error: {message}")]
    Startup {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// A listener could not be bound to its address/port
    #[error("Bind error: {address}: {message}")]
    Bind {
        address: String,
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Embedded database open/shutdown failure
    #[error("Database error: {0}")]
    Database(#[from] localdb::DbError),

    /// Resource registration or lookup failure
    #[error("Naming error: {message}")]
    Naming { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Create a startup error
    pub fn startup(message: impl Into<String>) -> Self {
        Self::Startup {
            message: message.into(),
            source: None,
        }
    }

    /// Create a startup error with source
    pub fn startup_with_source(message: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Startup {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a bind error
    pub fn bind(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Bind {
            address: address.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a bind error with source
    pub fn bind_with_source(
        address: impl Into<String>,
        message: impl Into<String>,
        source: anyhow::Error,
    ) -> Self {
        Self::Bind {
            address: address.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a naming error
    pub fn naming(message: impl Into<String>) -> Self {
        Self::Naming {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type alias for server operations
pub type ServerResult<T> = Result<T, ServerError>;
