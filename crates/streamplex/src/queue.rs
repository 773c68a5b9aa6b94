//! Item queues
//!
//! A queue is a bounded tokio channel of [`Item`]s. Producers write through an
//! [`ItemSink`]; consumers read from an [`ItemQueue`]. Once every sink is gone
//! the queue reports end-of-sequence, and it never reopens.

use futures::Stream;
use serde::Serialize;
use std::{
    pin::Pin,
    task::{Context, Poll},
};
use streamplex_domain::{CollectionKind, Item, ProduceError, ProduceResult};
use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;

/// Create a connected sink/queue pair with the given capacity (at least one)
pub fn channel(capacity: usize) -> (ItemSink, ItemQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ItemSink::new(tx), ItemQueue::new(rx))
}

/// Write half handed to a producer
///
/// Not `Clone`: a producer owns exactly one sink, and dropping it is how the
/// queue learns the producer is done.
#[derive(Debug)]
pub struct ItemSink {
    tx: mpsc::Sender<Item>,
}

impl ItemSink {
    pub(crate) fn new(tx: mpsc::Sender<Item>) -> Self {
        Self { tx }
    }

    /// Push one item, waiting for capacity
    ///
    /// Fails with [`ProduceError::SinkClosed`] once the consumer is gone, so
    /// producers that propagate with `?` stop as soon as their output is
    /// discarded.
    pub async fn send(&self, item: Item) -> ProduceResult {
        self.tx
            .send(item)
            .await
            .map_err(|_| ProduceError::SinkClosed)
    }

    /// Serialize and push a plain value
    pub async fn send_value<T>(&self, value: &T) -> ProduceResult
    where
        T: Serialize + ?Sized,
    {
        self.send(Item::from_serialize(value)?).await
    }

    /// Serialize and push a keyed value
    pub async fn send_keyed<T>(&self, key: impl Into<String>, value: &T) -> ProduceResult
    where
        T: Serialize + ?Sized,
    {
        self.send(Item::keyed_from_serialize(key, value)?).await
    }

    /// Push the empty-collection sentinel for `kind`
    pub async fn send_empty(&self, kind: CollectionKind) -> ProduceResult {
        self.send(Item::empty(kind)).await
    }

    /// True once the consumer has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Read half of a queue
///
/// When the queue was produced by the multiplexer it also owns the guard of
/// the shared cancellation token: dropping the queue cancels every task still
/// feeding it.
#[derive(Debug)]
pub struct ItemQueue {
    rx: mpsc::Receiver<Item>,
    _cancel: Option<DropGuard>,
}

impl ItemQueue {
    pub(crate) fn new(rx: mpsc::Receiver<Item>) -> Self {
        Self { rx, _cancel: None }
    }

    pub(crate) fn with_guard(rx: mpsc::Receiver<Item>, guard: DropGuard) -> Self {
        Self {
            rx,
            _cancel: Some(guard),
        }
    }

    /// Queue that is already closed and holds nothing
    pub fn closed() -> Self {
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        Self::new(rx)
    }

    /// Closed queue pre-filled with `items`
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Self {
        let items: Vec<Item> = items.into_iter().collect();
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            // capacity equals the item count
            let sent = tx.try_send(item);
            debug_assert!(sent.is_ok());
        }
        Self::new(rx)
    }

    /// Next item, or `None` once the queue is closed and drained
    pub async fn recv(&mut self) -> Option<Item> {
        self.rx.recv().await
    }

    /// Drain everything that is left
    pub async fn collect_items(mut self) -> Vec<Item> {
        let mut items = Vec::new();
        while let Some(item) = self.rx.recv().await {
            items.push(item);
        }
        items
    }
}

impl Stream for ItemQueue {
    type Item = Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_closed_queue_is_empty() {
        let mut queue = ItemQueue::closed();
        assert_eq!(queue.recv().await, None);
    }

    #[tokio::test]
    async fn test_from_items_preserves_order() {
        let queue = ItemQueue::from_items([Item::value(1), Item::value(2), Item::value(3)]);
        let items = queue.collect_items().await;
        assert_eq!(items, vec![Item::value(1), Item::value(2), Item::value(3)]);
    }

    #[tokio::test]
    async fn test_from_items_empty() {
        let queue = ItemQueue::from_items(Vec::new());
        assert!(queue.collect_items().await.is_empty());
    }

    #[tokio::test]
    async fn test_sink_helpers() {
        let (sink, queue) = channel(8);
        sink.send_value(&json!({"name": "Bar"})).await.unwrap();
        sink.send_keyed("7", &42).await.unwrap();
        sink.send_empty(CollectionKind::Object).await.unwrap();
        drop(sink);

        let items: Vec<Item> = queue.collect().await;
        assert_eq!(
            items,
            vec![
                Item::value(json!({"name": "Bar"})),
                Item::keyed("7", 42),
                Item::EmptyDictionary,
            ]
        );
    }

    #[tokio::test]
    async fn test_send_after_consumer_dropped() {
        let (sink, queue) = channel(1);
        assert!(!sink.is_closed());
        drop(queue);

        assert!(sink.is_closed());
        assert_eq!(sink.send(Item::value(1)).await, Err(ProduceError::SinkClosed));
    }

    #[tokio::test]
    async fn test_send_value_serialization_failure() {
        let (sink, _queue) = channel(1);
        let mut map = std::collections::HashMap::new();
        map.insert(vec![1u8], 1);

        let result = sink.send_value(&map).await;
        assert!(matches!(result, Err(ProduceError::Serialize(_))));
    }

    #[test]
    fn test_recv_waits_for_send() {
        use tokio_test::{assert_pending, assert_ready, assert_ready_ok, task};

        let (sink, mut queue) = channel(1);
        let mut recv = task::spawn(queue.recv());
        assert_pending!(recv.poll());

        let mut send = task::spawn(sink.send(Item::value(1)));
        assert_ready_ok!(send.poll());

        assert!(recv.is_woken());
        assert_eq!(assert_ready!(recv.poll()), Some(Item::value(1)));
    }

    #[tokio::test]
    async fn test_zero_capacity_is_promoted() {
        let (sink, mut queue) = channel(0);
        sink.send(Item::EmptyList).await.unwrap();
        assert_eq!(queue.recv().await, Some(Item::EmptyList));
    }
}
