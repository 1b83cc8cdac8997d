//! Product API 模块

mod handler;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/products", product_routes())
}

fn product_routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(handler::list).post(handler::create))
        .route("/quantity/stream", get(handler::quantity_stream))
        .route("/{id}", get(handler::get_by_id).delete(handler::delete))
        .route("/{id}/stock", put(handler::set_stock))
        .route("/{id}/visibility", post(handler::set_visibility))
}
