//! Kiosk Client - 点餐终端侧的购物车同步
//!
//! - [`HttpClient`] - REST 调用与事件流
//! - [`ProductCache`] - 商品与实时库存缓存
//! - [`CartEngine`] - 本地购物车与服务器预留的对账
//! - [`StatusMonitor`] - 订单状态轮询 / 推送

pub mod cache;
pub mod cart;
pub mod config;
pub mod error;
pub mod feed;
pub mod http;
pub mod status;

pub use cache::ProductCache;
pub use cart::{CartEngine, CartError, CartLine, OrderGateway, StockGateway};
pub use config::{ClientConfig, StatusTransport};
pub use error::{ClientError, ClientResult};
pub use feed::{EventFeed, SseDecoder};
pub use http::HttpClient;
pub use status::{StatusMonitor, StatusSource, StatusUpdate};

// Re-export shared types for convenience
pub use shared::{Order, OrderItem, OrderStatus, Product, ProductId, StockChange, StockLevel};
