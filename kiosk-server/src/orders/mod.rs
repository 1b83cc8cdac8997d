//! 订单模块 - 状态机与购物车写入

pub mod error;
pub mod service;

pub use error::OrderError;
pub use service::{OrderResult, OrderService};
