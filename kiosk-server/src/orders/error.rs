use shared::{AppError, ErrorCode, OrderId, OrderStatus, UnknownStatus, UserId};
use thiserror::Error;

use crate::db::RepoError;
use crate::inventory::LedgerError;

/// Order service errors
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    #[error("Order {0} already delivered")]
    AlreadyTerminal(OrderId),

    #[error("Order {0} is delivered and can no longer be changed")]
    Locked(OrderId),

    #[error("User {user_id} does not own order {order_id}")]
    Forbidden { order_id: OrderId, user_id: UserId },

    #[error("Order {order_id} is {current}, not {expected}")]
    StatusConflict {
        order_id: OrderId,
        expected: OrderStatus,
        current: OrderStatus,
    },

    #[error("Invalid item: {0}")]
    InvalidItem(String),

    #[error(transparent)]
    UnknownStatus(#[from] UnknownStatus),

    #[error(transparent)]
    Stock(#[from] LedgerError),

    #[error("Storage error: {0}")]
    Storage(#[from] RepoError),
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        let message = err.to_string();
        match err {
            OrderError::NotFound(id) => AppError::order_not_found(id),
            OrderError::AlreadyTerminal(id) => {
                AppError::with_message(ErrorCode::OrderAlreadyTerminal, message).with_detail("order_id", id)
            }
            OrderError::Locked(id) => {
                AppError::with_message(ErrorCode::OrderLocked, message).with_detail("order_id", id)
            }
            OrderError::Forbidden { order_id, .. } => {
                AppError::permission_denied(message).with_detail("order_id", order_id)
            }
            OrderError::StatusConflict {
                order_id, current, ..
            } => AppError::with_message(ErrorCode::OrderStatusConflict, message)
                .with_detail("order_id", order_id)
                .with_detail("current", current.name()),
            OrderError::InvalidItem(msg) => AppError::with_message(ErrorCode::InvalidQuantity, msg),
            OrderError::UnknownStatus(e) => {
                AppError::with_message(ErrorCode::UnknownOrderStatus, e.to_string()).with_detail("status", e.0)
            }
            OrderError::Stock(e) => e.into(),
            OrderError::Storage(e) => e.into(),
        }
    }
}
