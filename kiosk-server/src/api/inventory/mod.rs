//! Inventory API 模块 - 预留、释放、确认

mod handler;

use axum::{Router, routing::post};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/inventory", inventory_routes())
}

fn inventory_routes() -> Router<ServerState> {
    Router::new()
        .route("/{id}/reserve", post(handler::reserve))
        .route("/{id}/release", post(handler::release))
        .route("/{id}/confirm", post(handler::confirm))
}
