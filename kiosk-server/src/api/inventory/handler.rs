//! Inventory API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use shared::ProductId;
use shared::request::{QuantityRequest, StockResponse};

use crate::api::stock_response;
use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::utils::AppResult;

/// POST /api/inventory/:id/reserve - 预留库存
pub async fn reserve(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<ProductId>,
    Json(req): Json<QuantityRequest>,
) -> AppResult<Json<StockResponse>> {
    let level = state.ledger.reserve(id, req.quantity)?;
    tracing::debug!(product_id = %id, user_id = %user.id, quantity = req.quantity, "Reserved");
    Ok(stock_response(id, level))
}

/// POST /api/inventory/:id/release - 释放预留
pub async fn release(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<ProductId>,
    Json(req): Json<QuantityRequest>,
) -> AppResult<Json<StockResponse>> {
    let level = state.ledger.release(id, req.quantity)?;
    tracing::debug!(product_id = %id, user_id = %user.id, quantity = req.quantity, "Released");
    Ok(stock_response(id, level))
}

/// POST /api/inventory/:id/confirm - 确认交付，扣减实物库存
pub async fn confirm(
    State(state): State<ServerState>,
    _user: CurrentUser,
    Path(id): Path<ProductId>,
    Json(req): Json<QuantityRequest>,
) -> AppResult<Json<StockResponse>> {
    let level = state.ledger.confirm(id, req.quantity)?;
    Ok(stock_response(id, level))
}
