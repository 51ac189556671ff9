//! Error types for the port-forwarding reconciler
//!
//! This module defines all error types used throughout the crate.
//! Rule store implementations produce the `List`, `Create`, `Delete` and
//! `MalformedRecord` kinds; the reconciler hands them back unchanged.

use thiserror::Error;

/// Result type alias for port-forwarding operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the port-forwarding system
#[derive(Error, Debug)]
pub enum Error {
    /// The scoped list round-trip failed; nothing was changed
    #[error("Failed to list rules: {0}")]
    List(String),

    /// A create call failed; earlier items of the batch stay applied
    #[error("Failed to create rule {name}: {message}")]
    Create {
        /// Fully qualified rule name
        name: String,
        /// Error message
        message: String,
    },

    /// A delete call failed; earlier items of the batch stay applied
    #[error("Failed to delete rule {name}: {message}")]
    Delete {
        /// Fully qualified rule name
        name: String,
        /// Error message
        message: String,
    },

    /// A router-reported rule could not be parsed into an address
    #[error("Malformed rule record: {0}")]
    MalformedRecord(String),

    /// Addresses of one batch do not share a single scope
    #[error("Addresses in one batch must share a scope: {first} != {other}")]
    MixedScope {
        /// Scope of the first address
        first: String,
        /// First scope that differs
        other: String,
    },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Service store-related errors
    #[error("Service store error: {0}")]
    ServiceStore(String),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a list failure
    pub fn list(msg: impl Into<String>) -> Self {
        Self::List(msg.into())
    }

    /// Create a create failure for the named rule
    pub fn create(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Create {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a delete failure for the named rule
    pub fn delete(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Delete {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a malformed record error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRecord(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a service store error
    pub fn service_store(msg: impl Into<String>) -> Self {
        Self::ServiceStore(msg.into())
    }

    /// Whether nothing was mutated before this error surfaced
    ///
    /// Only list failures and input validation errors guarantee that the
    /// router was left untouched by the failing call.
    pub fn is_before_mutation(&self) -> bool {
        matches!(
            self,
            Self::List(_) | Self::MalformedRecord(_) | Self::MixedScope { .. } | Self::InvalidInput(_)
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
