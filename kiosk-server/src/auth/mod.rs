//! 认证模块 - 调用方身份

mod extractor;

pub use extractor::{CurrentUser, USER_ID_HEADER};
