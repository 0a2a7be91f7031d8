// Module: http
// JSON API over the lifecycle core

pub mod error;
pub mod health;
pub mod streams;

use std::sync::Arc;

use axum::Router;
use livecast_core::{Config, LifecycleCoordinator, StreamRegistryClient, StreamStatusPoller};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<dyn StreamRegistryClient>,
    pub coordinator: Arc<LifecycleCoordinator>,
    /// List-scope poller backing the grid
    pub streams: StreamStatusPoller,
}

impl AppState {
    /// Wire the coordinator to the grid poller
    pub fn new(config: Config, registry: Arc<dyn StreamRegistryClient>) -> Self {
        let streams = StreamStatusPoller::list(Arc::clone(&registry), &config.polling);
        let coordinator = Arc::new(LifecycleCoordinator::new(Arc::clone(&registry)));
        coordinator.attach(&streams);

        Self {
            config: Arc::new(config),
            registry,
            coordinator,
            streams,
        }
    }
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(health::create_health_router())
        .merge(streams::create_streams_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
