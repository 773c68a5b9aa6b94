//! Demo HTTP server streaming place data as JSON
//!
//! Usage: `streamplex-demo [config.json]` (defaults to `env.json`; a missing
//! file means defaults). `STREAMPLEX_BIND`, `STREAMPLEX_BUFFER_SIZE` and
//! `STREAMPLEX_SETUP_TIMEOUT_MS` override the file.

use std::sync::Arc;
use streamplex::{
    ServerConfig,
    http::{AppState, api_router},
    store::MemoryStore,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "env.json";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("streamplex=debug,tower_http=info")),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = ServerConfig::load(&path)?;

    let store = Arc::new(seed_store());
    info!(places = store.len(), "store seeded");

    let app = api_router().with_state(AppState::new(store, config.streaming.clone()));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "streamplex demo listening");
    info!("try GET /api/places, /api/placesearch?query=brew, /api/placemap");

    axum::serve(listener, app).await?;
    Ok(())
}

fn seed_store() -> MemoryStore {
    let store = MemoryStore::new();
    for (name, lat, long, radius) in [
        ("Schouskjelleren Mikrobryggeri", 59.9175, 10.7598, 25),
        ("Grünerløkka Brygghus", 59.9236, 10.7580, 30),
        ("Crowbar & Bryggeri", 59.9153, 10.7506, 20),
        ("Brewdog Camden", 51.5392, -0.1426, 15),
        ("Kulminator", 51.2138, 4.4051, 10),
        ("Mikkeller Bar Viktoriagade", 55.6716, 12.5569, 15),
        ("Brewdog Sydney", -33.8688, 151.2093, 20),
    ] {
        store.insert_place(name, lat, long, radius);
    }
    store
}
