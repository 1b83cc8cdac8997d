//! Shared types for the ordering kiosk
//!
//! Types used by both `kiosk-server` and `kiosk-client`: catalog and order
//! models, live-update wire messages, request bodies and the unified error
//! system.

pub mod error;
pub mod message;
pub mod models;
pub mod request;
pub mod util;

// Re-exports
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};
pub use message::{LiveEvent, StatusChange, StockChange, Topic};
pub use models::{
    Order, OrderId, OrderItem, OrderStatus, Product, ProductId, StockLevel, UnknownStatus, UserId,
};
