//! In-memory place store
//!
//! Stand-in for the relational store behind the meetup API. Handlers hold it
//! as an explicitly passed `Arc<MemoryStore>` and producers capture a clone of
//! that handle; there is no global connection. Each query snapshots its
//! matching rows under a short read lock and then streams them to the sink, so
//! no lock is held across an await point.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use streamplex_domain::ProduceResult;

use crate::queue::ItemSink;

/// A meeting place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Place {
    pub id: i64,
    pub name: String,
    pub lat: f64,
    pub long: f64,
    pub radius: i32,
}

/// Autocomplete suggestion for a place name search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub value: String,
    pub data: i64,
}

/// Latitude/longitude bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle {
    pub min_lat: f64,
    pub min_long: f64,
    pub max_lat: f64,
    pub max_long: f64,
}

impl Rectangle {
    /// The whole globe
    pub const WORLD: Rectangle = Rectangle {
        min_lat: -90.0,
        min_long: -180.0,
        max_lat: 90.0,
        max_long: 180.0,
    };

    /// Strict containment, matching `lat > ? AND lat < ?` style queries
    pub fn contains(&self, lat: f64, long: f64) -> bool {
        lat > self.min_lat && lat < self.max_lat && long > self.min_long && long < self.max_long
    }
}

/// Thread-safe in-memory place table
#[derive(Debug)]
pub struct MemoryStore {
    places: RwLock<Vec<Place>>,
    next_id: AtomicI64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            places: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Insert a place and return its id
    pub fn insert_place(&self, name: impl Into<String>, lat: f64, long: f64, radius: i32) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.places.write().push(Place {
            id,
            name: name.into(),
            lat,
            long,
            radius,
        });
        id
    }

    pub fn place(&self, id: i64) -> Option<Place> {
        self.places.read().iter().find(|p| p.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.places.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.read().is_empty()
    }

    /// Stream every place inside `bounds` as plain items, in id order
    pub async fn stream_places(&self, bounds: Rectangle, sink: &ItemSink) -> ProduceResult {
        let rows: Vec<Place> = self
            .places
            .read()
            .iter()
            .filter(|p| bounds.contains(p.lat, p.long))
            .cloned()
            .collect();

        for place in &rows {
            sink.send_value(place).await?;
        }
        Ok(())
    }

    /// Stream places of one shard as items keyed by id
    ///
    /// Shard `k` of `n` holds the places with `id % n == k`.
    pub async fn stream_place_shard(
        &self,
        shard: usize,
        shards: usize,
        sink: &ItemSink,
    ) -> ProduceResult {
        let shards = shards.max(1) as i64;
        let shard = shard as i64;
        let rows: Vec<Place> = self
            .places
            .read()
            .iter()
            .filter(|p| p.id.rem_euclid(shards) == shard)
            .cloned()
            .collect();

        for place in &rows {
            sink.send_keyed(place.id.to_string(), place).await?;
        }
        Ok(())
    }

    /// Stream name suggestions for places whose name contains `query`
    /// (case-insensitive, like `name LIKE %query%`)
    pub async fn stream_suggestions(&self, query: &str, sink: &ItemSink) -> ProduceResult {
        let needle = query.to_lowercase();
        let rows: Vec<Suggestion> = self
            .places
            .read()
            .iter()
            .filter(|p| p.name.to_lowercase().contains(&needle))
            .map(|p| Suggestion {
                value: p.name.clone(),
                data: p.id,
            })
            .collect();

        for suggestion in &rows {
            sink.send_value(suggestion).await?;
        }
        Ok(())
    }
}
