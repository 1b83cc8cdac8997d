//! 工具模块
//!
//! - [`logger`] - 日志初始化
//! - 统一错误类型 (from shared::error)

pub mod logger;

pub use shared::error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};
