//! 实时推送 - 订阅注册表与事件扇出
//!
//! - [`ChangeBroadcaster`] - 注册表，按 topic 分发事件
//! - [`Subscription`] - 订阅句柄 (Stream)，drop 时自动注销

pub mod broadcaster;
pub mod subscription;

pub use broadcaster::{ChangeBroadcaster, ConnectionId, DEFAULT_BUFFER, SubscriptionId};
pub use subscription::Subscription;
