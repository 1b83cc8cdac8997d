//! Health check

use axum::{Json, Router, extract::State, routing::get};
use shared::request::HealthResponse;

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().route("/health", get(health))
}

/// GET /health
async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        connections: state.broadcaster.connection_count(),
        subscriptions: state.broadcaster.subscription_count(),
        products: state.ledger.len(),
    })
}
