pub mod api;
pub mod cli;
pub mod model;
pub mod node_store;
pub mod store;
pub mod sync;
pub mod ws;

use api::{api_router, ApiState};
use axum::{routing::get, Router};
use std::sync::Arc;
use store::HiveStore;
use sync::registry::NodeConnectionRegistry;
use sync::service::BackfillService;
use sync::tracker::BackfillRequestTracker;
use sync::SyncConfig;
use tower_http::cors::CorsLayer;
use ws::handler::{ws_router, WsState};

async fn health_check() -> &'static str {
    "OK"
}

/// Configuration for creating a router.
pub struct RouterConfig {
    /// The hive store backing the service.
    pub store: Arc<HiveStore>,
    /// Sync subsystem tunables.
    pub sync: SyncConfig,
}

/// Create a router with the given configuration.
///
/// Wires the store, the backfill tracker, the connection registry and the
/// backfill service together, and spawns the reconciliation sweep.
pub async fn create_router_with_config(config: RouterConfig) -> Router {
    let tracker = Arc::new(BackfillRequestTracker::new());
    let registry = Arc::new(NodeConnectionRegistry::new());
    let service = Arc::new(BackfillService::new(
        config.store.clone(),
        tracker,
        registry.clone(),
        config.sync,
    ));
    service.spawn_reconciler();

    let api = api_router(ApiState {
        store: config.store.clone(),
        registry: registry.clone(),
        service: service.clone(),
    });
    let ws = ws_router(WsState {
        store: config.store,
        registry,
        service,
        config: config.sync,
    });

    Router::new()
        .route("/health", get(health_check))
        .merge(api)
        .merge(ws)
        .layer(CorsLayer::permissive())
}
