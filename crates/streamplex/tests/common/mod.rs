//! Common test utilities
//!
//! Reusable producers and fixtures shared by the integration test files

#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;
use streamplex::{
    BoxProducer, Element, Item, ProduceError, Result, StreamingConfig, assemble_document,
    producer, store::MemoryStore,
};

/// Small buffers so producers and relays actually contend
pub fn test_config() -> StreamingConfig {
    StreamingConfig::default()
        .with_buffer_size(2)
        .with_setup_timeout(Some(Duration::from_secs(5)))
}

/// Emits `count` keyed items `"<tag>-<i>" => i`, yielding between sends
pub fn counting_producer(tag: &str, count: usize) -> BoxProducer {
    let tag = tag.to_string();
    producer(move |sink| async move {
        for i in 0..count {
            sink.send(Item::keyed(format!("{tag}-{i}"), i)).await?;
            tokio::task::yield_now().await;
        }
        Ok(())
    })
}

/// Emits `count` plain items `[tag, i]`
pub fn plain_producer(tag: &'static str, count: usize) -> BoxProducer {
    producer(move |sink| async move {
        for i in 0..count {
            sink.send(Item::value(serde_json::json!([tag, i]))).await?;
        }
        Ok(())
    })
}

/// Fails before emitting anything
pub fn failing_producer(message: &'static str) -> BoxProducer {
    producer(move |_sink| async move { Err(ProduceError::source(message)) })
}

/// Emits `before` items, then fails
pub fn late_failing_producer(before: usize, message: &'static str) -> BoxProducer {
    producer(move |sink| async move {
        for i in 0..before {
            sink.send(Item::value(i)).await?;
        }
        Err(ProduceError::source(message))
    })
}

/// Keeps sending until its sink closes, counting the sends that went through
pub fn endless_producer(sent: Arc<AtomicUsize>) -> BoxProducer {
    producer(move |sink| async move {
        while sink.send(Item::value(1)).await.is_ok() {
            sent.fetch_add(1, Ordering::SeqCst);
        }
        Err(ProduceError::SinkClosed)
    })
}

/// Never emits and never finishes
pub fn hung_producer() -> BoxProducer {
    producer(|_sink| async move {
        std::future::pending::<()>().await;
        Ok(())
    })
}

/// Store with a handful of places
pub fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_place("Schouskjelleren", 59.9175, 10.7598, 25);
    store.insert_place("Grünerløkka Brygghus", 59.9236, 10.7580, 30);
    store.insert_place("Brewdog Camden", 51.5392, -0.1426, 15);
    store.insert_place("Brewdog Sydney", -33.8688, 151.2093, 20);
    store
}

/// Assemble `elements` into a string
pub async fn render(elements: impl IntoIterator<Item = Element>) -> (Result<u64>, String) {
    let mut out = Vec::new();
    let result = assemble_document(&mut out, elements).await;
    (result, String::from_utf8(out).expect("output is UTF-8"))
}
