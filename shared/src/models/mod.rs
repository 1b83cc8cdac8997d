//! Domain models shared by server and client

pub mod order;
pub mod product;

pub use order::{Order, OrderId, OrderItem, OrderStatus, UnknownStatus, UserId};
pub use product::{Product, ProductCreate, ProductId, StockLevel};
