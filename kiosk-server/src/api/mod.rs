//! API 路由模块
//!
//! - [`inventory`] - 预留 / 释放 / 确认
//! - [`products`] - 商品目录与库存推送
//! - [`orders`] - 订单状态机与购物车写入
//! - [`health`] - 健康检查

pub mod health;
pub mod inventory;
pub mod orders;
pub mod products;
pub mod stream;

use axum::Json;
use shared::request::StockResponse;
use shared::{ProductId, StockLevel};

pub(crate) fn stock_response(product_id: ProductId, level: StockLevel) -> Json<StockResponse> {
    Json(StockResponse {
        product_id,
        stock: level.stock(),
        reserved: level.reserved(),
        available: level.available(),
    })
}
