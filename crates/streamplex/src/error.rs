//! Error types for streamplex operations

use std::time::Duration;
use streamplex_domain::{CollectionKind, ProduceError};

/// Result type alias for streamplex operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for streamplex operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A producer failed before emitting its first item
    #[error("Producer setup failed: {0}")]
    Setup(ProduceError),

    /// The setup phase did not resolve before the deadline
    #[error("Producer setup timed out after {0:?}")]
    SetupTimeout(Duration),

    /// A producer failed after output had already started
    #[error("Producer failed mid-stream: {0}")]
    MidStream(ProduceError),

    /// An item of the wrong kind showed up inside a collection
    #[error("Collection kind mismatch: expected {expected} item, got {found} item")]
    KindMismatch {
        /// Kind chosen by the first item
        expected: CollectionKind,
        /// Kind of the offending item
        found: CollectionKind,
    },

    /// A value could not be encoded as JSON
    #[error("Serialization failed: {0}")]
    Serialize(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Writing to the response sink failed
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True for errors raised before any byte could have been written
    pub fn is_setup(&self) -> bool {
        matches!(self, Error::Setup(_) | Error::SetupTimeout(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialize(err.to_string())
    }
}
