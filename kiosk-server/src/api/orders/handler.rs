//! Order API Handlers

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    response::IntoResponse,
};
use futures::StreamExt;
use shared::request::{AdvanceRequest, ReplaceItemsRequest, StatusResponse};
use shared::{LiveEvent, Order, OrderId, OrderStatus, StatusChange, Topic};

use crate::api::stream;
use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::orders::OrderError;
use crate::utils::{AppError, AppResult};

/// GET /api/orders/current - 当前用户的活动订单 (没有则新建)
pub async fn current(
    State(state): State<ServerState>,
    user: CurrentUser,
) -> AppResult<Json<Order>> {
    Ok(Json(state.orders.current_order(user.id).await?))
}

/// GET /api/orders/:id - 获取订单
pub async fn get_by_id(
    State(state): State<ServerState>,
    _user: CurrentUser,
    Path(id): Path<OrderId>,
) -> AppResult<Json<Order>> {
    Ok(Json(state.orders.get(id).await?))
}

/// PUT /api/orders/:id/items - 整单覆盖购物车行
pub async fn replace_items(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<OrderId>,
    Json(req): Json<ReplaceItemsRequest>,
) -> AppResult<Json<Order>> {
    Ok(Json(state.orders.replace_items(user.id, id, req.items).await?))
}

/// GET /api/orders/:id/status - 轮询订单状态
pub async fn status(
    State(state): State<ServerState>,
    Path(id): Path<OrderId>,
) -> AppResult<Json<StatusResponse>> {
    let status = state.orders.status(id).await?;
    Ok(Json(StatusResponse {
        order_id: id,
        status,
    }))
}

/// POST /api/orders/:id/advance - 推进一步
///
/// Body is optional. `{"from": "Placed"}` makes the advance conditional on
/// the current status; a numeric code is accepted as well.
pub async fn advance(
    State(state): State<ServerState>,
    _user: CurrentUser,
    Path(id): Path<OrderId>,
    body: Bytes,
) -> AppResult<Json<StatusResponse>> {
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        AdvanceRequest::default()
    } else {
        serde_json::from_slice::<Option<AdvanceRequest>>(&body)
            .map_err(|e| AppError::validation(format!("invalid advance request: {e}")))?
            .unwrap_or_default()
    };

    let expected = req
        .from
        .as_deref()
        .map(str::parse::<OrderStatus>)
        .transpose()
        .map_err(OrderError::from)?;

    let status = state.orders.advance_status(id, expected).await?;
    Ok(Json(StatusResponse {
        order_id: id,
        status,
    }))
}

/// GET /api/orders/:id/status/stream - 订单状态推送流
///
/// The current status is sent first, then every transition. The stream ends
/// after `Delivered`.
pub async fn status_stream(
    State(state): State<ServerState>,
    Path(id): Path<OrderId>,
) -> AppResult<impl IntoResponse> {
    // subscribe before reading so no transition falls in between
    let subscription = state.broadcaster.subscribe(Topic::OrderStatus(id));
    let current = state.orders.status(id).await?;

    let initial = LiveEvent::Status(StatusChange {
        order_id: id,
        status: current,
    });
    let events = futures::stream::iter([initial]).chain(subscription);
    let events = stream::until_inclusive(events, |event| {
        matches!(event, LiveEvent::Status(change) if change.status.is_terminal())
    });

    Ok(stream::live_events(events, state.config.sse_keep_alive()))
}
