//! # Streamplex
//!
//! Concurrent producer multiplexing and incremental JSON encoding.
//!
//! Producers push [`Item`]s into bounded queues. [`multiplex`] fans several
//! producers into one queue and only hands it out once every producer has
//! started cleanly; [`encode_collection`] turns a queue into a JSON array or
//! object as items arrive; [`Document`] stitches literals, values and
//! collections into one response without buffering it.
//!
//! ```no_run
//! use streamplex::prelude::*;
//!
//! # async fn run() -> streamplex::Result<()> {
//! let config = StreamingConfig::default();
//! let queue = multiplex(
//!     &config,
//!     [
//!         producer(|sink| async move { sink.send_keyed("a", &1).await }),
//!         producer(|sink| async move { sink.send_keyed("b", &2).await }),
//!     ],
//! )
//! .await?;
//!
//! let mut out = Vec::new();
//! assemble_document(&mut out, [Element::from("{\"n\":"), queue.into(), "}".into()]).await?;
//! # Ok(())
//! # }
//! ```

#![warn(rust_2018_idioms)]

pub mod config;
pub mod document;
pub mod encoder;
pub mod error;
#[cfg(feature = "http-server")]
pub mod http;
pub mod mux;
pub mod producer;
pub mod queue;
pub mod store;

pub use config::{ServerConfig, StreamingConfig};
pub use document::{Document, Element, PreparedDocument, assemble_document};
pub use encoder::{encode_collection, encode_dictionary, encode_list};
pub use error::{Error, Result};
pub use mux::{multiplex, multiplex_with_cancel, uniplex, uniplex_with_cancel};
pub use producer::{BoxProducer, Producer, producer, spawn};
pub use queue::{ItemQueue, ItemSink, channel};
pub use streamplex_domain::{CollectionKind, Item, ProduceError, ProduceResult};
pub use tokio_util::sync::CancellationToken;

/// Common imports
pub mod prelude {
    pub use crate::{
        CollectionKind, Document, Element, Error, Item, ItemQueue, ItemSink, ProduceError,
        ProduceResult, Producer, Result, StreamingConfig, assemble_document, encode_collection,
        multiplex, producer, uniplex,
    };
}
