//! HTTP server and request router.
//!
//! The router dispatches the replication-relevant surface:
//!
//! | Method | Endpoint | Description |
//! |--------|----------|-------------|
//! | POST | /replicate | Start a replication pass (outcome via push channel) |
//! | GET | /export.geojson | Streamed bbox-scoped feature export |
//! | PUT/POST | /import.shp | Bulk import, 200 with `errors` array |
//! | GET | /sync_targets | Mounted replication targets |
//! | GET | /ws | Push channel (WebSocket) |
//! | * | (other) | 404 |
//!
//! Each request is handled without blocking the accept loop: the long
//! transfer runs on a blocking task owned by the coordinator, so export,
//! import and target discovery stay responsive while a pass is in flight.

pub mod error;
pub mod handlers;
pub mod push;
pub mod state;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::config::{Config, DiscoveryConfig, ServerConfig};
use crate::error::Result;
use crate::geo::FeatureStore;
use crate::hub::EventHub;
use crate::replicate::ReplicationCoordinator;

pub use state::{AppState, SharedState};

/// Assemble the application state.
pub fn app_state(
    coordinator: Arc<ReplicationCoordinator>,
    hub: Arc<EventHub>,
    features: Arc<dyn FeatureStore>,
    discovery: DiscoveryConfig,
) -> SharedState {
    Arc::new(AppState {
        coordinator,
        hub,
        features,
        discovery,
    })
}

/// Build the request router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/replicate", post(handlers::replicate))
        .route("/export.geojson", get(handlers::export_geojson))
        .route(
            "/import.shp",
            post(handlers::import_features).put(handlers::import_features),
        )
        .route("/sync_targets", get(handlers::sync_targets))
        .route("/ws", get(push::push_channel))
        .fallback(handlers::not_found)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the router on the configured address until the task is dropped.
pub async fn serve(config: &ServerConfig, state: SharedState) -> Result<()> {
    let listener = TcpListener::bind(config.bind_addr()).await?;
    serve_on(listener, state).await
}

/// Serve the router on an already-bound listener.
///
/// Split out so tests can bind port 0 and learn the address first.
pub async fn serve_on(listener: TcpListener, state: SharedState) -> Result<()> {
    tracing::info!(addr = %listener.local_addr()?, "portage server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Wire up a complete server from configuration and a data directory.
///
/// Convenience used by the CLI: opens the segment log and feature store
/// under `data_dir`, builds the hub and coordinator, and returns the
/// shared state ready for [`serve`].
pub fn build(config: &Config, data_dir: &std::path::Path) -> Result<SharedState> {
    let log = Arc::new(crate::log::SegmentLog::open(data_dir.join("log"))?);
    let features = Arc::new(crate::geo::LogFeatureStore::open(data_dir)?);
    let hub = Arc::new(EventHub::new());
    let coordinator = ReplicationCoordinator::new(
        log,
        Arc::new(crate::replicate::SyncfileTransfer::new()),
        Arc::clone(&hub),
        config.replication.clone(),
    );
    Ok(app_state(coordinator, hub, features, config.discovery.clone()))
}
