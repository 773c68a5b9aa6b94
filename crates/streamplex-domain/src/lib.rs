//! Streamplex Domain Layer - Item Model
//!
//! This crate contains the runtime-independent types that flow through
//! streamplex queues: the [`Item`] sum type, the [`CollectionKind`] a
//! collection renders as, and the [`ProduceError`] a producer terminates with.
//!
//! ## Architecture
//!
//! - **Item**: one unit on a queue (plain value, keyed value, empty-collection
//!   sentinel, or error). Exactly one variant is active; consumers match
//!   exhaustively.
//! - **CollectionKind**: array or object, decided by the first item of a queue.
//! - **ProduceError**: terminal failure of a producer, carried in-band as
//!   [`Item::Error`].
//!
//! No async runtime is required here; the `streamplex` crate builds the
//! multiplexer and encoder on top of these types.

#![warn(missing_docs)]

pub mod item;

pub use item::{CollectionKind, Item};

/// Result type for producer operations
pub type ProduceResult<T = ()> = Result<T, ProduceError>;

/// Terminal failure of a producer
///
/// A producer either finishes cleanly or returns one of these. The runtime
/// appends it to the producer's queue as [`Item::Error`], after every item the
/// producer managed to emit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ProduceError {
    /// The data source (query, cursor, connection) failed
    #[error("Source error: {0}")]
    Source(String),

    /// A value could not be converted to JSON
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// The consuming side of the queue is gone (cancelled or dropped)
    #[error("Sink closed")]
    SinkClosed,

    /// Any other producer failure
    #[error("{0}")]
    Other(String),
}

impl ProduceError {
    /// Create a data source error
    pub fn source(message: impl Into<String>) -> Self {
        Self::Source(message.into())
    }

    /// Create a generic producer error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// True when the error only reports that nobody is listening anymore
    pub fn is_sink_closed(&self) -> bool {
        matches!(self, Self::SinkClosed)
    }
}

impl From<serde_json::Error> for ProduceError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialize(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_produce_error_creation() {
        let err = ProduceError::source("no such table: place");
        assert!(matches!(err, ProduceError::Source(_)));
        assert_eq!(err.to_string(), "Source error: no such table: place");

        let err = ProduceError::other("boom");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_sink_closed_detection() {
        assert!(ProduceError::SinkClosed.is_sink_closed());
        assert!(!ProduceError::source("x").is_sink_closed());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ProduceError = json_err.into();
        assert!(matches!(err, ProduceError::Serialize(_)));
    }

    #[test]
    fn test_produce_result_default_unit() {
        let ok: ProduceResult = Ok(());
        assert!(ok.is_ok());
    }
}
