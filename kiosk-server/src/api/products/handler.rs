//! Product API Handlers

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use shared::models::ProductCreate;
use shared::request::{SetStockRequest, StockResponse, VisibilityRequest};
use shared::{Product, ProductId, Topic};

use crate::api::{stock_response, stream};
use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::utils::{ApiResponse, AppResult};

/// GET /api/products - 获取所有可见商品 (含实时库存)
pub async fn list(State(state): State<ServerState>) -> AppResult<Json<Vec<Product>>> {
    Ok(Json(state.catalog.list_visible().await?))
}

/// GET /api/products/:id - 获取单个商品
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<ProductId>,
) -> AppResult<Json<Product>> {
    Ok(Json(state.catalog.get(id).await?))
}

/// POST /api/products - 创建商品
pub async fn create(
    State(state): State<ServerState>,
    _user: CurrentUser,
    Json(payload): Json<ProductCreate>,
) -> AppResult<Json<Product>> {
    Ok(Json(state.catalog.create(payload).await?))
}

/// PUT /api/products/:id/stock - 调整实物库存
pub async fn set_stock(
    State(state): State<ServerState>,
    _user: CurrentUser,
    Path(id): Path<ProductId>,
    Json(req): Json<SetStockRequest>,
) -> AppResult<Json<StockResponse>> {
    let level = state.catalog.set_stock(id, req.stock)?;
    Ok(stock_response(id, level))
}

/// POST /api/products/:id/visibility - 上架/下架
pub async fn set_visibility(
    State(state): State<ServerState>,
    _user: CurrentUser,
    Path(id): Path<ProductId>,
    Json(req): Json<VisibilityRequest>,
) -> AppResult<Json<Product>> {
    Ok(Json(state.catalog.set_visibility(id, req.is_visible).await?))
}

/// DELETE /api/products/:id - 删除商品 (存在预留时拒绝)
pub async fn delete(
    State(state): State<ServerState>,
    _user: CurrentUser,
    Path(id): Path<ProductId>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.catalog.delete(id).await?;
    Ok(Json(ApiResponse::ok()))
}

/// GET /api/products/quantity/stream - 库存变更推送流
///
/// 每行一个事件: `productId:stock:reserved`
pub async fn quantity_stream(State(state): State<ServerState>) -> impl IntoResponse {
    let subscription = state.broadcaster.subscribe(Topic::ProductQuantity);
    stream::live_events(subscription, state.config.sse_keep_alive())
}
