//! Order API 模块

mod handler;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/orders", order_routes())
}

fn order_routes() -> Router<ServerState> {
    Router::new()
        .route("/current", get(handler::current))
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/items", put(handler::replace_items))
        .route("/{id}/status", get(handler::status))
        .route("/{id}/status/stream", get(handler::status_stream))
        .route("/{id}/advance", post(handler::advance))
}
