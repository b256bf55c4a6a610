/// PeerBeam relay process: HTTP probes plus the signaling WebSocket.

pub mod config;
pub mod routes;

use std::time::Instant;

use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use peerbeam_gateway::Relay;

pub use config::ServerConfig;
pub use routes::AppState;

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            relay: Relay::new(config.rejoin_policy),
            started_at: Instant::now(),
            heartbeat_interval: config.heartbeat_interval,
        }
    }
}

/// Build the relay router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::identity))
        .route("/health", get(routes::health))
        .route("/ws", get(routes::ws_upgrade))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
