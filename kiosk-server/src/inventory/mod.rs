//! 库存模块
//!
//! - [`StockLedger`] - 每个商品的 (stock, reserved) 计数器
//! - [`CatalogService`] - 商品管理 (创建、可见性、删除)
//! - [`run_stock_persistence`] - 库存写回监听器

pub mod catalog;
pub mod error;
pub mod ledger;
pub mod persist;

pub use catalog::CatalogService;
pub use error::LedgerError;
pub use ledger::{LedgerResult, NoopNotifier, StockLedger, StockNotifier};
pub use persist::run_stock_persistence;
