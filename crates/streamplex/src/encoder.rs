//! Incremental JSON collection encoder
//!
//! Turns a first item plus the rest of its queue into a JSON array or object,
//! writing each element as soon as it arrives. The first item alone decides
//! the framing:
//!
//! | first item        | output                         |
//! |-------------------|--------------------------------|
//! | `EmptyList`       | `[]` (rest of the queue ignored) |
//! | `EmptyDictionary` | `{}` (rest of the queue ignored) |
//! | `Keyed`           | `{"k1":v1,"k2":v2,...}`        |
//! | `Value`           | `[v1,v2,...]`                  |
//!
//! No whitespace is emitted. On any failure the encoder stops where it is:
//! the prefix already written stays as it is, the closing delimiter is not
//! written, the remaining queue is abandoned, and the error is returned.

use crate::{
    error::{Error, Result},
    queue::ItemQueue,
};
use serde_json::Value as JsonValue;
use streamplex_domain::{CollectionKind, Item};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{trace, warn};

/// Encode `first` followed by the rest of `rest` as one collection
///
/// Returns the number of bytes written.
pub async fn encode_collection<W>(sink: &mut W, first: Item, rest: &mut ItemQueue) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut encoder = CollectionEncoder::new(sink);

    match first {
        Item::EmptyList => encoder.write_raw(CollectionKind::Array.empty()).await?,
        Item::EmptyDictionary => encoder.write_raw(CollectionKind::Object.empty()).await?,
        Item::Error(err) => return Err(Error::Setup(err)),
        Item::Keyed { key, value } => {
            encoder.write_raw(b"{").await?;
            encoder.write_entry(&key, &value).await?;
            encoder.append_items(CollectionKind::Object, rest).await?;
            encoder.write_raw(b"}").await?;
        }
        Item::Value(value) => {
            encoder.write_raw(b"[").await?;
            encoder.write_value(&value).await?;
            encoder.append_items(CollectionKind::Array, rest).await?;
            encoder.write_raw(b"]").await?;
        }
    }

    Ok(encoder.written)
}

/// Encode a whole queue as a JSON array, whatever its items look like
///
/// An empty queue becomes `[]`. Keyed items are rejected.
pub async fn encode_list<W>(sink: &mut W, queue: ItemQueue) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    encode_as(sink, CollectionKind::Array, queue).await
}

/// Encode a whole queue as a JSON object; an empty queue becomes `{}`
pub async fn encode_dictionary<W>(sink: &mut W, queue: ItemQueue) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    encode_as(sink, CollectionKind::Object, queue).await
}

async fn encode_as<W>(sink: &mut W, kind: CollectionKind, mut queue: ItemQueue) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut encoder = CollectionEncoder::new(sink);
    encoder.write_raw(kind.open()).await?;

    let mut first = true;
    while let Some(item) = queue.recv().await {
        if item.is_sentinel() {
            continue;
        }
        if !first {
            encoder.write_raw(b",").await?;
        }
        encoder.write_item(kind, item).await?;
        first = false;
    }

    encoder.write_raw(kind.close()).await?;
    Ok(encoder.written)
}

/// Writes collection elements to a sink, reusing one scratch buffer
struct CollectionEncoder<'a, W: ?Sized> {
    sink: &'a mut W,
    scratch: Vec<u8>,
    written: u64,
}

impl<'a, W> CollectionEncoder<'a, W>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    fn new(sink: &'a mut W) -> Self {
        Self {
            sink,
            scratch: Vec::with_capacity(256),
            written: 0,
        }
    }

    async fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.sink.write_all(bytes).await?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    async fn write_value(&mut self, value: &JsonValue) -> Result<()> {
        self.scratch.clear();
        serde_json::to_writer(&mut self.scratch, value)?;
        self.flush_scratch().await
    }

    async fn write_entry(&mut self, key: &str, value: &JsonValue) -> Result<()> {
        self.scratch.clear();
        serde_json::to_writer(&mut self.scratch, key)?;
        self.scratch.push(b':');
        serde_json::to_writer(&mut self.scratch, value)?;
        self.flush_scratch().await
    }

    async fn flush_scratch(&mut self) -> Result<()> {
        self.sink.write_all(&self.scratch).await?;
        self.written += self.scratch.len() as u64;
        Ok(())
    }

    /// Write one non-sentinel item inside a collection of `kind`
    async fn write_item(&mut self, kind: CollectionKind, item: Item) -> Result<()> {
        match (kind, item) {
            (CollectionKind::Array, Item::Value(value)) => self.write_value(&value).await,
            (CollectionKind::Object, Item::Keyed { key, value }) => {
                self.write_entry(&key, &value).await
            }
            (_, Item::Error(err)) => {
                warn!(error = %err, "collection aborted by producer error");
                Err(Error::MidStream(err))
            }
            (expected, item) => {
                let found = item.collection_kind().unwrap_or(expected);
                warn!(%expected, %found, "collection kind mismatch");
                Err(Error::KindMismatch { expected, found })
            }
        }
    }

    /// Comma-prefix every remaining item of `rest`
    ///
    /// Sentinels after the first item carry no data and are skipped.
    async fn append_items(&mut self, kind: CollectionKind, rest: &mut ItemQueue) -> Result<()> {
        while let Some(item) = rest.recv().await {
            if item.is_sentinel() {
                trace!("skipping sentinel inside non-empty collection");
                continue;
            }
            if item.is_error() {
                return self.write_item(kind, item).await;
            }
            self.write_raw(b",").await?;
            self.write_item(kind, item).await?;
        }
        Ok(())
    }
}
