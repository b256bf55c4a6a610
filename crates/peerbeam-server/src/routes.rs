use std::time::{Duration, Instant};

use axum::{
    Json,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
};
use serde::Serialize;

use peerbeam_gateway::{Relay, connection};

/// Shared state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub relay: Relay,
    pub started_at: Instant,
    pub heartbeat_interval: Duration,
}

#[derive(Debug, Serialize)]
pub struct Identity {
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    /// Seconds since the relay started.
    pub uptime: f64,
    pub timestamp: String,
}

/// GET /: static identity payload.
pub async fn identity() -> Json<Identity> {
    Json(Identity {
        service: "peerbeam-relay",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /health: liveness check.
pub async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        uptime: state.started_at.elapsed().as_secs_f64(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// GET /ws: upgrade into a relay connection.
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, state.relay, state.heartbeat_interval))
}
