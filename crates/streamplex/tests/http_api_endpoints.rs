//! Integration tests for the HTTP endpoints
//!
//! Drives the router end-to-end using tower::ServiceExt::oneshot

#![cfg(feature = "http-server")]

mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::Value as JsonValue;
use std::{sync::Arc, time::Duration};
use streamplex::{
    StreamingConfig,
    http::{AppState, api_router},
    store::MemoryStore,
};
use tower::ServiceExt;

fn app_with(store: MemoryStore, config: StreamingConfig) -> Router {
    api_router().with_state(AppState::new(Arc::new(store), config))
}

fn app() -> Router {
    app_with(common::seeded_store(), common::test_config())
}

async fn get(app: Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, body.to_vec())
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, JsonValue) {
    let (status, _, body) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

// ===== /api/places =====

#[tokio::test]
async fn test_places_streams_all() {
    let (status, content_type, body) = get(app(), "/api/places").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/json"));

    let json: JsonValue = serde_json::from_slice(&body).unwrap();
    let places = json.as_array().unwrap();
    assert_eq!(places.len(), 4);
    assert_eq!(places[0]["Name"], "Schouskjelleren");
    assert!(places[0].get("Radius").is_some());
}

#[tokio::test]
async fn test_places_in_bounds() {
    let (status, json) = get_json(
        app(),
        "/api/places?minlat=50&minlong=-1&maxlat=60&maxlong=11",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["Name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["Schouskjelleren", "Grünerløkka Brygghus", "Brewdog Camden"]
    );
}

#[tokio::test]
async fn test_places_empty_store() {
    let app = app_with(MemoryStore::new(), common::test_config());
    let (status, _, body) = get(app, "/api/places").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"[]");
}

#[tokio::test]
async fn test_places_partial_bounds_rejected() {
    let (status, json) = get_json(app(), "/api/places?minlat=50").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("bounds"));
}

// ===== /api/place/{id} =====

#[tokio::test]
async fn test_place_by_id() {
    let (status, json) = get_json(app(), "/api/place/3").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["Id"], 3);
    assert_eq!(json["Name"], "Brewdog Camden");
}

#[tokio::test]
async fn test_place_not_found() {
    let (status, json) = get_json(app(), "/api/place/99").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json.get("error").is_some());
}

// ===== /api/placesearch =====

#[tokio::test]
async fn test_place_search_wraps_suggestions() {
    let (status, _, body) = get(app(), "/api/placesearch?query=brewdog").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        String::from_utf8(body).unwrap(),
        r#"{"suggestions":[{"value":"Brewdog Camden","data":3},{"value":"Brewdog Sydney","data":4}]}"#
    );
}

#[tokio::test]
async fn test_place_search_no_match() {
    let (status, _, body) = get(app(), "/api/placesearch?query=zzz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, br#"{"suggestions":[]}"#);
}

#[tokio::test]
async fn test_place_search_missing_query() {
    let (status, content_type, body) = get(app(), "/api/placesearch").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(content_type.as_deref(), Some("application/json"));
    let json: JsonValue = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "Missing query parameter: query");
}

// ===== /api/placemap =====

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_place_map_merges_shards() {
    let (status, json) = get_json(app(), "/api/placemap?shards=3").await;

    assert_eq!(status, StatusCode::OK);
    let map = json.as_object().unwrap();
    assert_eq!(map.len(), 4);
    for id in ["1", "2", "3", "4"] {
        assert_eq!(map[id]["Id"].to_string(), id);
    }
}

#[tokio::test]
async fn test_place_map_empty_store() {
    let app = app_with(MemoryStore::new(), common::test_config());
    let (status, _, body) = get(app, "/api/placemap").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"{}");
}

#[tokio::test]
async fn test_place_map_single_shard_keeps_order() {
    let (_, _, body) = get(app(), "/api/placemap?shards=1").await;
    let body = String::from_utf8(body).unwrap();

    let positions: Vec<usize> = ["\"1\":", "\"2\":", "\"3\":", "\"4\":"]
        .iter()
        .map(|key| body.find(key).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

// ===== /api/health =====

#[tokio::test]
async fn test_health() {
    let (status, json) = get_json(app(), "/api/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert!(json["version"].is_string());
}

// ===== Configuration =====

#[tokio::test]
async fn test_tiny_body_buffer_still_streams_everything() {
    let config = common::test_config()
        .with_buffer_size(0)
        .with_body_buffer_size(1)
        .with_setup_timeout(Some(Duration::from_secs(5)));
    let app = app_with(common::seeded_store(), config);

    let (status, json) = get_json(app, "/api/places").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 4);
}
