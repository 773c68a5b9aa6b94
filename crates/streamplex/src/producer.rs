//! Producer contract
//!
//! A producer is a one-shot unit of work that pushes items onto an
//! [`ItemSink`] and finishes with success or a [`ProduceError`]. Any
//! `FnOnce(ItemSink) -> impl Future<Output = ProduceResult>` is a producer;
//! [`BoxProducer`] erases the type so heterogeneous producers can be
//! multiplexed together.

use crate::queue::{ItemQueue, ItemSink};
use futures::future::BoxFuture;
use std::future::Future;
use streamplex_domain::{Item, ProduceResult};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// A data source that writes items to a sink
///
/// Implementations must not write after returning. Data store handles are
/// captured explicitly (e.g. an `Arc` of a pool), never reached through
/// global state.
pub trait Producer: Send + 'static {
    /// Run to completion, writing every item to `sink`
    fn produce(self, sink: ItemSink) -> impl Future<Output = ProduceResult> + Send;
}

impl<F, Fut> Producer for F
where
    F: FnOnce(ItemSink) -> Fut + Send + 'static,
    Fut: Future<Output = ProduceResult> + Send + 'static,
{
    fn produce(self, sink: ItemSink) -> impl Future<Output = ProduceResult> + Send {
        self(sink)
    }
}

type ProduceFn = Box<dyn FnOnce(ItemSink) -> BoxFuture<'static, ProduceResult> + Send>;

/// Type-erased producer
pub struct BoxProducer(ProduceFn);

impl BoxProducer {
    /// Erase the type of any producer
    pub fn new<P: Producer>(producer: P) -> Self {
        Self(Box::new(
            move |sink: ItemSink| -> BoxFuture<'static, ProduceResult> {
                Box::pin(producer.produce(sink))
            },
        ))
    }
}

impl std::fmt::Debug for BoxProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxProducer").finish_non_exhaustive()
    }
}

impl Producer for BoxProducer {
    fn produce(self, sink: ItemSink) -> impl Future<Output = ProduceResult> + Send {
        (self.0)(sink)
    }
}

/// Box a closure producer; the closure argument type is inferred
pub fn producer<F, Fut>(f: F) -> BoxProducer
where
    F: FnOnce(ItemSink) -> Fut + Send + 'static,
    Fut: Future<Output = ProduceResult> + Send + 'static,
{
    BoxProducer::new(f)
}

/// Run a producer against `tx`, appending its terminal error as an item
///
/// The error goes through the same channel as the items, so it is always
/// observed after everything the producer emitted. `tx` is dropped on return,
/// which closes the queue.
pub(crate) async fn drive<P: Producer>(producer: P, tx: mpsc::Sender<Item>) {
    let sink = ItemSink::new(tx.clone());
    match producer.produce(sink).await {
        Ok(()) => trace!("producer finished"),
        Err(err) if err.is_sink_closed() => {
            debug!("producer stopped: consumer went away");
        }
        Err(err) => {
            debug!(error = %err, "producer failed");
            if tx.send(Item::Error(err)).await.is_err() {
                trace!("producer error dropped: consumer went away");
            }
        }
    }
}

/// Start a producer on its own task and return its queue
///
/// There is no setup phase here: a failure shows up as an [`Item::Error`] in
/// the queue, and the document assembler turns an error in first position into
/// an aborted document.
pub fn spawn(producer: impl Producer, capacity: usize) -> ItemQueue {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(drive(producer, tx));
    ItemQueue::new(rx)
}
