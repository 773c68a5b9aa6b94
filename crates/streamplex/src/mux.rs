//! Producer fan-in with an all-or-nothing setup phase
//!
//! [`multiplex`] starts every producer on its own task, waits until each one
//! has either emitted its first item or failed, and only then hands out the
//! shared output queue. If any producer fails first, everything is cancelled
//! and the caller gets the error instead of a queue, so no response byte has
//! been written yet and a clean error document can still be sent.
//!
//! [`uniplex`] is the single-producer version.
//!
//! Ordering: items of one producer keep their order; items of different
//! producers interleave arbitrarily.
//!
//! Error policy after setup: a producer that fails after its first item has
//! its error forwarded to the output queue as a terminal [`Item::Error`]. The
//! consumer (normally the collection encoder) reports it instead of silently
//! losing the rest of that producer's data.
//!
//! Empty-collection sentinels do not survive fan-in as such. Relays drop them,
//! and only when no producer forwarded any data does the last relay to finish
//! emit a single sentinel (the kind seen first), so the output queue starts
//! with a sentinel only if it holds nothing else.

use crate::{
    config::StreamingConfig,
    error::{Error, Result},
    producer::{self, Producer},
    queue::ItemQueue,
};
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use streamplex_domain::{Item, ProduceError};
use tokio::{
    sync::mpsc,
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Outcome of one producer's setup step
type SetupOutcome = std::result::Result<(), ProduceError>;

/// State shared by the relays of one [`multiplex`] call
#[derive(Debug)]
struct FanIn {
    active: AtomicUsize,
    data_seen: AtomicBool,
    sentinel: Mutex<Option<Item>>,
}

impl FanIn {
    fn new(producers: usize) -> Self {
        Self {
            active: AtomicUsize::new(producers),
            data_seen: AtomicBool::new(false),
            sentinel: Mutex::new(None),
        }
    }

    /// Decide whether `item` goes to the shared queue now
    ///
    /// Sentinels are held back; the first one is remembered.
    fn admit(&self, index: usize, item: Item) -> Option<Item> {
        if item.is_sentinel() {
            trace!(producer = index, "holding back empty-collection sentinel");
            self.sentinel.lock().get_or_insert(item);
            return None;
        }
        self.data_seen.store(true, Ordering::Release);
        Some(item)
    }

    /// Called once per coordinator that reached the relay phase or closed
    /// cleanly; the last one emits the held-back sentinel if nothing else
    /// was forwarded
    async fn finish(&self, index: usize, out: &mpsc::Sender<Item>) {
        if self.active.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        if self.data_seen.load(Ordering::Acquire) {
            return;
        }
        let sentinel = self.sentinel.lock().take();
        if let Some(sentinel) = sentinel {
            trace!(producer = index, "all producers empty, emitting sentinel");
            let _ = out.send(sentinel).await;
        }
    }
}

/// Fan in `producers` into one queue
///
/// Returns once every producer has emitted its first item (or closed without
/// emitting anything). The first setup failure cancels all producers and is
/// returned instead of the queue. The setup phase is bounded by
/// [`StreamingConfig::setup_timeout`].
pub async fn multiplex<I, P>(config: &StreamingConfig, producers: I) -> Result<ItemQueue>
where
    I: IntoIterator<Item = P>,
    P: Producer,
{
    multiplex_with_cancel(config, producers, CancellationToken::new()).await
}

/// [`multiplex`] with an external cancellation token
///
/// Cancelling `cancel` during setup aborts with
/// `Error::Setup(ProduceError::SinkClosed)`; cancelling it later stops all
/// relaying and closes the output queue early.
pub async fn multiplex_with_cancel<I, P>(
    config: &StreamingConfig,
    producers: I,
    cancel: CancellationToken,
) -> Result<ItemQueue>
where
    I: IntoIterator<Item = P>,
    P: Producer,
{
    let capacity = config.channel_capacity();
    let cancel = cancel.child_token();
    let producers: Vec<P> = producers.into_iter().collect();
    let count = producers.len();

    let (out_tx, out_rx) = mpsc::channel(capacity);
    // one slot per producer, so coordinators never block on reporting
    let (setup_tx, mut setup_rx) = mpsc::channel::<SetupOutcome>(count.max(1));
    let fan_in = Arc::new(FanIn::new(count));

    for (index, producer) in producers.into_iter().enumerate() {
        let (item_tx, item_rx) = mpsc::channel(capacity);
        tokio::spawn(producer::drive(producer, item_tx));
        tokio::spawn(coordinate(
            index,
            item_rx,
            out_tx.clone(),
            setup_tx.clone(),
            Arc::clone(&fan_in),
            cancel.clone(),
        ));
    }
    // The output queue closes when the last coordinator drops its sender.
    drop(out_tx);
    drop(setup_tx);

    let deadline = config.setup_timeout.map(|timeout| (Instant::now() + timeout, timeout));

    for _ in 0..count {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("multiplex cancelled during setup");
                return Err(Error::Setup(ProduceError::SinkClosed));
            }
            _ = expire(deadline) => {
                cancel.cancel();
                let timeout = deadline.map(|(_, timeout)| timeout).unwrap_or_default();
                warn!(?timeout, producers = count, "multiplex setup timed out");
                return Err(Error::SetupTimeout(timeout));
            }
            outcome = setup_rx.recv() => outcome,
        };

        match outcome {
            Some(Ok(())) => {}
            Some(Err(err)) => {
                cancel.cancel();
                warn!(error = %err, producers = count, "multiplex setup failed");
                return Err(Error::Setup(err));
            }
            None => {
                // every coordinator is gone without reporting: only cancellation does that
                cancel.cancel();
                return Err(Error::Setup(ProduceError::SinkClosed));
            }
        }
    }

    debug!(producers = count, "multiplex setup complete");
    Ok(ItemQueue::with_guard(out_rx, cancel.drop_guard()))
}

/// Single-producer version of [`multiplex`]
///
/// Reads the producer's first emission before returning:
/// - failure before any item: the error is returned, no queue
/// - clean close with no items: an already closed, empty queue
/// - an item: a relay task re-emits it on a fresh queue followed by the rest
pub async fn uniplex<P: Producer>(config: &StreamingConfig, producer: P) -> Result<ItemQueue> {
    uniplex_with_cancel(config, producer, CancellationToken::new()).await
}

/// [`uniplex`] with an external cancellation token
pub async fn uniplex_with_cancel<P: Producer>(
    config: &StreamingConfig,
    producer: P,
    cancel: CancellationToken,
) -> Result<ItemQueue> {
    let capacity = config.channel_capacity();
    let cancel = cancel.child_token();

    // A queue can't be peeked and put back without losing order, hence the
    // inner queue plus a relay into a fresh outer one.
    let (inner_tx, mut inner) = mpsc::channel(capacity);
    tokio::spawn(producer::drive(producer, inner_tx));

    let deadline = config.setup_timeout.map(|timeout| (Instant::now() + timeout, timeout));
    let first = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!("uniplex cancelled during setup");
            return Err(Error::Setup(ProduceError::SinkClosed));
        }
        _ = expire(deadline) => {
            let timeout = deadline.map(|(_, timeout)| timeout).unwrap_or_default();
            warn!(?timeout, "uniplex setup timed out");
            return Err(Error::SetupTimeout(timeout));
        }
        first = inner.recv() => first,
    };

    match first {
        Some(Item::Error(err)) => {
            warn!(error = %err, "uniplex setup failed");
            Err(Error::Setup(err))
        }
        None => {
            debug!("uniplex producer closed without items");
            Ok(ItemQueue::closed())
        }
        Some(item) => {
            let (outer_tx, outer_rx) = mpsc::channel(capacity);
            let relay_cancel = cancel.clone();
            tokio::spawn(async move {
                relay(0, item, inner, &outer_tx, None, relay_cancel).await;
            });
            Ok(ItemQueue::with_guard(outer_rx, cancel.drop_guard()))
        }
    }
}

/// Per-producer state machine: race cancellation against the first emission,
/// report the setup outcome, then relay
async fn coordinate(
    index: usize,
    mut items: mpsc::Receiver<Item>,
    out: mpsc::Sender<Item>,
    setup: mpsc::Sender<SetupOutcome>,
    fan_in: Arc<FanIn>,
    cancel: CancellationToken,
) {
    let first = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            trace!(producer = index, "cancelled before first item");
            return;
        }
        first = items.recv() => first,
    };

    match first {
        Some(Item::Error(err)) => {
            debug!(producer = index, error = %err, "producer failed during setup");
            let _ = setup.send(Err(err)).await;
        }
        None => {
            debug!(producer = index, "producer closed without items");
            let _ = setup.send(Ok(())).await;
            drop(setup);
            fan_in.finish(index, &out).await;
        }
        Some(item) => {
            debug!(producer = index, "producer set up");
            let _ = setup.send(Ok(())).await;
            drop(setup);
            relay(index, item, items, &out, Some(fan_in.as_ref()), cancel).await;
            fan_in.finish(index, &out).await;
        }
    }
}

/// Copy `first` and then everything from `items` to `out`, in order
///
/// Stops on cancellation, when `out` is gone, after forwarding an error item,
/// or when `items` closes. With a `fan_in`, sentinels are handed to it instead
/// of being forwarded.
async fn relay(
    index: usize,
    first: Item,
    mut items: mpsc::Receiver<Item>,
    out: &mpsc::Sender<Item>,
    fan_in: Option<&FanIn>,
    cancel: CancellationToken,
) {
    let mut next = Some(first);

    while let Some(item) = next {
        if cancel.is_cancelled() {
            trace!(producer = index, "relay cancelled");
            return;
        }

        let forward = match fan_in {
            Some(fan_in) => fan_in.admit(index, item),
            None => Some(item),
        };

        if let Some(item) = forward {
            let terminal = item.is_error();
            if terminal {
                warn!(producer = index, "producer failed mid-stream, forwarding error item");
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                sent = out.send(item) => {
                    if sent.is_err() {
                        trace!(producer = index, "output queue dropped");
                        return;
                    }
                }
            }

            if terminal {
                return;
            }
        }

        next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            item = items.recv() => item,
        };
    }

    trace!(producer = index, "producer drained");
}

/// Resolve at the deadline, or never when there is none
async fn expire(deadline: Option<(Instant, Duration)>) {
    match deadline {
        Some((at, _)) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
