//! Document assembly
//!
//! A document is an ordered list of [`Element`]s: literal byte fragments,
//! single JSON values, and collections backed by an [`ItemQueue`]. Assembly
//! runs in two passes:
//!
//! 1. [`Document::prepare`] takes the first item of every collection, in
//!    element order, without writing anything. An error item aborts the whole
//!    document.
//! 2. [`PreparedDocument::write_to`] writes the elements in order, rendering
//!    each collection from its stored first item plus the rest of its queue.
//!
//! The first pass is what keeps a failing upstream producer from ever putting
//! a partial document on the wire.

use crate::{
    encoder::encode_collection,
    error::{Error, Result},
    queue::ItemQueue,
};
use bytes::Bytes;
use serde_json::Value as JsonValue;
use streamplex_domain::{CollectionKind, Item};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// One piece of a document
#[derive(Debug)]
pub enum Element {
    /// Copied to the output verbatim
    Literal(Bytes),

    /// Encoded as a JSON array or object by the collection encoder; a queue
    /// that closes without items renders as `[]`
    Collection(ItemQueue),

    /// Like [`Element::Collection`], but a queue that closes without items
    /// renders as `{}`
    KeyedCollection(ItemQueue),

    /// Encoded as a single JSON value
    Value(JsonValue),
}

impl Element {
    /// Literal fragment
    pub fn literal(bytes: impl Into<Bytes>) -> Self {
        Element::Literal(bytes.into())
    }

    /// Collection fed by `queue`
    pub fn collection(queue: ItemQueue) -> Self {
        Element::Collection(queue)
    }

    /// Collection expected to hold keyed items
    pub fn keyed_collection(queue: ItemQueue) -> Self {
        Element::KeyedCollection(queue)
    }

    /// Single value
    pub fn value(value: impl Into<JsonValue>) -> Self {
        Element::Value(value.into())
    }
}

impl From<&'static str> for Element {
    fn from(literal: &'static str) -> Self {
        Element::Literal(Bytes::from_static(literal.as_bytes()))
    }
}

impl From<ItemQueue> for Element {
    fn from(queue: ItemQueue) -> Self {
        Element::Collection(queue)
    }
}

/// An ordered list of elements waiting to be assembled
#[derive(Debug, Default)]
pub struct Document {
    elements: Vec<Element>,
}

impl Document {
    /// Document made of `elements`
    pub fn new(elements: impl IntoIterator<Item = Element>) -> Self {
        Self {
            elements: elements.into_iter().collect(),
        }
    }

    /// `{"<field>":<collection>}`
    pub fn wrapped(field: &str, queue: ItemQueue) -> Self {
        let mut prefix = Vec::with_capacity(field.len() + 4);
        prefix.push(b'{');
        // serializing a str can't fail
        let _ = serde_json::to_writer(&mut prefix, field);
        prefix.push(b':');

        Self::new([
            Element::literal(prefix),
            Element::collection(queue),
            Element::from("}"),
        ])
    }

    /// Append an element
    pub fn push(mut self, element: impl Into<Element>) -> Self {
        self.elements.push(element.into());
        self
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True when the document has no elements
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Pass 1: peek the first item of every collection
    ///
    /// Fails with [`Error::Setup`] as soon as a collection starts with an error
    /// item. Nothing is written in either case.
    pub async fn prepare(mut self) -> Result<PreparedDocument> {
        // slot i holds the first item of element i
        let mut heads: Vec<Option<Item>> = Vec::with_capacity(self.elements.len());

        for (index, element) in self.elements.iter_mut().enumerate() {
            let head = match element {
                Element::Collection(queue) | Element::KeyedCollection(queue) => {
                    match queue.recv().await {
                        Some(Item::Error(err)) => {
                            debug!(element = index, error = %err, "document aborted before output");
                            return Err(Error::Setup(err));
                        }
                        head => head,
                    }
                }
                Element::Literal(_) | Element::Value(_) => None,
            };
            heads.push(head);
        }

        Ok(PreparedDocument {
            elements: self.elements,
            heads,
        })
    }
}

/// A document whose collections have all produced their first item
///
/// Every collection is known to start well, so writing can begin; errors from
/// here on are mid-stream errors.
#[derive(Debug)]
pub struct PreparedDocument {
    elements: Vec<Element>,
    heads: Vec<Option<Item>>,
}

impl PreparedDocument {
    /// Pass 2: write every element in order, returning the bytes written
    pub async fn write_to<W>(self, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut written = 0u64;

        for (element, head) in self.elements.into_iter().zip(self.heads) {
            match element {
                Element::Literal(bytes) => {
                    sink.write_all(&bytes).await?;
                    written += bytes.len() as u64;
                }
                Element::Value(value) => {
                    let bytes = serde_json::to_vec(&value)?;
                    sink.write_all(&bytes).await?;
                    written += bytes.len() as u64;
                }
                Element::Collection(queue) => {
                    written += write_collection(sink, head, queue, CollectionKind::Array).await?;
                }
                Element::KeyedCollection(queue) => {
                    written += write_collection(sink, head, queue, CollectionKind::Object).await?;
                }
            }
        }

        sink.flush().await?;
        Ok(written)
    }
}

/// Render one collection element from its stored first item
async fn write_collection<W>(
    sink: &mut W,
    head: Option<Item>,
    mut queue: ItemQueue,
    default_kind: CollectionKind,
) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    match head {
        Some(first) => encode_collection(sink, first, &mut queue).await,
        None => {
            let empty = default_kind.empty();
            sink.write_all(empty).await?;
            Ok(empty.len() as u64)
        }
    }
}

/// Assemble `elements` into `sink`: [`Document::prepare`] followed by
/// [`PreparedDocument::write_to`]
pub async fn assemble_document<W>(
    sink: &mut W,
    elements: impl IntoIterator<Item = Element>,
) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    Document::new(elements).prepare().await?.write_to(sink).await
}
