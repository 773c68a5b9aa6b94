//! Streamplex benchmarking helpers
//!
//! Synthetic producers with a known shape, shared by the criterion benches.

use streamplex::{BoxProducer, Item, producer};

/// A row that looks like what the place endpoints stream
pub fn sample_row(i: usize) -> serde_json::Value {
    serde_json::json!({
        "Id": i,
        "Name": format!("Place {i}"),
        "Lat": 59.9 + (i % 100) as f64 / 1000.0,
        "Long": 10.7 + (i % 50) as f64 / 1000.0,
        "Radius": 25,
    })
}

/// Producer emitting `rows` plain sample rows
pub fn row_producer(rows: usize) -> BoxProducer {
    producer(move |sink| async move {
        for i in 0..rows {
            sink.send(Item::value(sample_row(i))).await?;
        }
        Ok(())
    })
}

/// Producer emitting `rows` sample rows keyed by `<shard>:<i>`
pub fn keyed_producer(shard: usize, rows: usize) -> BoxProducer {
    producer(move |sink| async move {
        for i in 0..rows {
            sink.send(Item::keyed(format!("{shard}:{i}"), sample_row(i))).await?;
        }
        Ok(())
    })
}

/// `producers` keyed producers of `rows` rows each
pub fn keyed_producers(producers: usize, rows: usize) -> Vec<BoxProducer> {
    (0..producers)
        .map(|shard| keyed_producer(shard, rows))
        .collect()
}
