//! Client error types

use shared::{AppError, ErrorCode, OrderId, ProductId, UnknownStatus};
use thiserror::Error;

/// Client error type
///
/// Business failures reported by the server come back typed; anything the
/// client has no dedicated variant for keeps the original [`AppError`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure, safe to retry
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Invalid response format
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Caller identity missing or rejected
    #[error("Authentication required")]
    Unauthorized,

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not enough stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("Invalid release for product {product_id}: {message}")]
    InvalidRelease { product_id: ProductId, message: String },

    #[error(transparent)]
    UnknownStatus(#[from] UnknownStatus),

    #[error("Order {0} already delivered")]
    AlreadyTerminal(OrderId),

    #[error("Order {0} can no longer be changed")]
    OrderLocked(OrderId),

    #[error("Order status changed: {0}")]
    StatusConflict(String),

    /// Server-side transient failure (storage, timeout)
    #[error("Server unavailable: {0}")]
    Unavailable(String),

    #[error("Server error: {0}")]
    Api(AppError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether repeating the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Network(_) | ClientError::Unavailable(_))
    }
}

fn detail_i64(err: &AppError, key: &str) -> i64 {
    err.details
        .as_ref()
        .and_then(|d| d.get(key))
        .and_then(|v| v.as_i64())
        .unwrap_or_default()
}

fn detail_u32(err: &AppError, key: &str) -> u32 {
    u32::try_from(detail_i64(err, key)).unwrap_or_default()
}

impl From<AppError> for ClientError {
    fn from(err: AppError) -> Self {
        match err.code {
            ErrorCode::NotAuthenticated => ClientError::Unauthorized,
            ErrorCode::PermissionDenied => ClientError::Forbidden(err.message),
            ErrorCode::NotFound | ErrorCode::ProductNotFound | ErrorCode::OrderNotFound => {
                ClientError::NotFound(err.message)
            }
            ErrorCode::ValidationFailed
            | ErrorCode::InvalidRequest
            | ErrorCode::InvalidQuantity
            | ErrorCode::ProductInvalidPrice => ClientError::Validation(err.message),
            ErrorCode::InsufficientStock => ClientError::InsufficientStock {
                product_id: detail_i64(&err, "product_id"),
                requested: detail_u32(&err, "requested"),
                available: detail_u32(&err, "available"),
            },
            ErrorCode::InvalidRelease => ClientError::InvalidRelease {
                product_id: detail_i64(&err, "product_id"),
                message: err.message,
            },
            ErrorCode::UnknownOrderStatus => {
                let raw = err
                    .details
                    .as_ref()
                    .and_then(|d| d.get("status"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or(err.message);
                ClientError::UnknownStatus(UnknownStatus(raw))
            }
            ErrorCode::OrderAlreadyTerminal => ClientError::AlreadyTerminal(detail_i64(&err, "order_id")),
            ErrorCode::OrderLocked => ClientError::OrderLocked(detail_i64(&err, "order_id")),
            ErrorCode::OrderStatusConflict => ClientError::StatusConflict(err.message),
            ErrorCode::StorageError | ErrorCode::NetworkError | ErrorCode::TimeoutError => {
                ClientError::Unavailable(err.message)
            }
            _ => ClientError::Api(err),
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
