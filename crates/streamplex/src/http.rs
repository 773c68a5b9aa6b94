//! Axum adapter for streamed JSON documents
//!
//! Handlers run the setup phase (multiplex/uniplex plus [`Document::prepare`])
//! before returning, so every setup failure still becomes a proper error
//! status. Only a [`PreparedDocument`] is turned into a `200` response, and it
//! is then written into the body chunk by chunk.

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use serde::Deserialize;
use std::{io, sync::Arc};
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::{
    config::StreamingConfig,
    document::{Document, Element, PreparedDocument},
    error::{Error, Result as StreamResult},
    mux::{multiplex, uniplex},
    producer::{BoxProducer, producer},
    queue::ItemSink,
    store::{MemoryStore, Place, Rectangle},
};

/// Default number of shard producers behind `/api/placemap`
pub const DEFAULT_MAP_SHARDS: usize = 4;

/// Upper bound for the `shards` parameter
pub const MAX_MAP_SHARDS: usize = 16;

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    store: Arc<MemoryStore>,
    config: Arc<StreamingConfig>,
}

impl AppState {
    pub fn new(store: Arc<MemoryStore>, config: StreamingConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }
}

/// Build the API router
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/places", get(places))
        .route("/api/place/{id}", get(place))
        .route("/api/placesearch", get(place_search))
        .route("/api/placemap", get(place_map))
        .route("/api/health", get(health))
        .layer(TraceLayer::new_for_http())
}

/// Optional bounding box; either all four corners or none
#[derive(Debug, Default, Deserialize)]
pub struct BoundsParams {
    pub minlat: Option<f64>,
    pub minlong: Option<f64>,
    pub maxlat: Option<f64>,
    pub maxlong: Option<f64>,
}

impl BoundsParams {
    /// Resolve to a rectangle, defaulting to the whole globe
    pub fn rectangle(&self) -> Result<Rectangle, HttpError> {
        match (self.minlat, self.minlong, self.maxlat, self.maxlong) {
            (None, None, None, None) => Ok(Rectangle::WORLD),
            (Some(min_lat), Some(min_long), Some(max_lat), Some(max_long)) => {
                if min_lat > max_lat || min_long > max_long {
                    return Err(HttpError::InvalidParameter(
                        "bounds: minimum exceeds maximum".to_string(),
                    ));
                }
                Ok(Rectangle {
                    min_lat,
                    min_long,
                    max_lat,
                    max_long,
                })
            }
            _ => Err(HttpError::InvalidParameter(
                "bounds: minlat, minlong, maxlat and maxlong go together".to_string(),
            )),
        }
    }
}

/// Query of `/api/placesearch`
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
}

/// Query of `/api/placemap`
#[derive(Debug, Default, Deserialize)]
pub struct MapParams {
    pub shards: Option<usize>,
}

impl MapParams {
    pub fn shard_count(&self) -> usize {
        self.shards
            .unwrap_or(DEFAULT_MAP_SHARDS)
            .clamp(1, MAX_MAP_SHARDS)
    }
}

/// List of places inside the requested bounds
async fn places(
    State(state): State<AppState>,
    Query(params): Query<BoundsParams>,
) -> Result<StreamingJson, HttpError> {
    let bounds = params.rectangle()?;
    let store = Arc::clone(&state.store);

    let queue = uniplex(&state.config, move |sink: ItemSink| async move {
        store.stream_places(bounds, &sink).await
    })
    .await?;

    let document = Document::new([Element::collection(queue)]).prepare().await?;
    Ok(StreamingJson::new(document, state.config.body_buffer_size))
}

/// One place by id
async fn place(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Place>, HttpError> {
    state
        .store
        .place(id)
        .map(Json)
        .ok_or(HttpError::NotFound(id))
}

/// `{"suggestions":[...]}` for places whose name contains `query`
async fn place_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<StreamingJson, HttpError> {
    let query = params.query.ok_or(HttpError::MissingParameter("query"))?;
    let store = Arc::clone(&state.store);

    let queue = uniplex(&state.config, move |sink: ItemSink| async move {
        store.stream_suggestions(&query, &sink).await
    })
    .await?;

    let document = Document::wrapped("suggestions", queue).prepare().await?;
    Ok(StreamingJson::new(document, state.config.body_buffer_size))
}

/// Every place keyed by id, gathered from several shard producers at once
async fn place_map(
    State(state): State<AppState>,
    Query(params): Query<MapParams>,
) -> Result<StreamingJson, HttpError> {
    let shards = params.shard_count();
    debug!(shards, "placemap request");

    let producers: Vec<BoxProducer> = (0..shards)
        .map(|shard| {
            let store = Arc::clone(&state.store);
            producer(move |sink| async move {
                store.stream_place_shard(shard, shards, &sink).await
            })
        })
        .collect();

    let queue = multiplex(&state.config, producers).await?;
    let document = Document::new([Element::keyed_collection(queue)])
        .prepare()
        .await?;
    Ok(StreamingJson::new(document, state.config.body_buffer_size))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Streaming `application/json` response
///
/// The document is written by a separate task into an in-memory pipe whose
/// read half backs the body. A write failure ends the body with an error, so
/// the client sees a truncated transfer.
#[derive(Debug)]
pub struct StreamingJson {
    document: PreparedDocument,
    buffer_size: usize,
}

impl StreamingJson {
    pub fn new(document: PreparedDocument, buffer_size: usize) -> Self {
        Self {
            document,
            buffer_size,
        }
    }
}

impl IntoResponse for StreamingJson {
    fn into_response(self) -> Response {
        let Self {
            document,
            buffer_size,
        } = self;
        let (mut writer, reader) = tokio::io::duplex(buffer_size.max(1));
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(async move {
            let result = document.write_to(&mut writer).await;
            // EOF for the reader before the outcome is published
            drop(writer);
            match &result {
                Ok(written) => debug!(bytes = written, "streaming response complete"),
                Err(err) => warn!(error = %err, "streaming response aborted"),
            }
            let _ = done_tx.send(result);
        });

        let body = Body::from_stream(ReaderStream::new(reader).chain(completion(done_rx)));

        ([(header::CONTENT_TYPE, "application/json")], body).into_response()
    }
}

/// Trailing body stream: nothing on success, one error otherwise
///
/// A writer task that vanished without reporting counts as a failure too.
fn completion(
    done: oneshot::Receiver<StreamResult<u64>>,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    stream::once(done).filter_map(|outcome| async move {
        match outcome {
            Ok(Ok(_)) => None,
            Ok(Err(err)) => Some(Err(io::Error::other(err))),
            Err(_) => Some(Err(io::Error::other("response writer stopped"))),
        }
    })
}

/// Errors surfaced by the HTTP handlers
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error(transparent)]
    Stream(#[from] Error),

    #[error("Missing query parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid query parameter: {0}")]
    InvalidParameter(String),

    #[error("Place not found: {0}")]
    NotFound(i64),
}

impl HttpError {
    pub fn status(&self) -> StatusCode {
        match self {
            HttpError::Stream(Error::SetupTimeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            HttpError::Stream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HttpError::MissingParameter(_) | HttpError::InvalidParameter(_) => {
                StatusCode::BAD_REQUEST
            }
            HttpError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(%status, error = %self, "request failed");
        }

        let body = Json(serde_json::json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
