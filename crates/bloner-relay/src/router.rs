//! Axum router wiring.
//!
//! The WebSocket listener and the ops listener are separate sockets, so each
//! gets its own router.

use axum::{routing::get, Router};

use crate::{app_state::AppState, ops, transport};

/// `GET /ws` upgrade.
pub fn build_ws_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(transport::ws::ws_upgrade))
        .with_state(state)
}

/// `/healthz`, `/readyz`, `/metrics`.
pub fn build_ops_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics))
        .with_state(state)
}
