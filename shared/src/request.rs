//! Request / response bodies of the HTTP API

use serde::{Deserialize, Serialize};

use crate::models::{OrderItem, OrderStatus, ProductId};

/// Body of reserve / release / confirm
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuantityRequest {
    pub quantity: u32,
}

/// Body of `PUT /api/products/{id}/stock`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SetStockRequest {
    pub stock: u32,
}

/// Body of `POST /api/products/{id}/visibility`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VisibilityRequest {
    pub is_visible: bool,
}

/// Body of `PUT /api/orders/{id}/items`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceItemsRequest {
    pub items: Vec<OrderItem>,
}

/// Body of `POST /api/orders/{id}/advance`
///
/// `from` is the status the caller believes the order is in, as a name or a
/// numeric code. When present the advance only happens from that status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdvanceRequest {
    #[serde(default)]
    pub from: Option<String>,
}

/// Counters after a ledger operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockResponse {
    pub product_id: ProductId,
    pub stock: u32,
    pub reserved: u32,
    pub available: u32,
}

/// Status of an order (polling endpoint, advance result)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub order_id: i64,
    pub status: OrderStatus,
}

/// Live registry counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub connections: usize,
    pub subscriptions: usize,
    pub products: usize,
}
