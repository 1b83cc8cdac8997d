//! Repository Module
//!
//! Persistence seams for products and orders. The core only sees these traits;
//! the relational store behind them is an external collaborator.

use async_trait::async_trait;
use shared::{AppError, Order, OrderId, Product, ProductId, StockLevel, UserId};
use thiserror::Error;

/// Repository error types
#[derive(Debug, Clone, Error)]
pub enum RepoError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(what) => AppError::not_found(what),
            RepoError::Duplicate(what) => {
                AppError::with_message(shared::ErrorCode::AlreadyExists, format!("Duplicate: {}", what))
            }
            RepoError::Database(msg) => AppError::storage(msg),
        }
    }
}

/// Result type for repository operations
pub type RepoResult<T> = Result<T, RepoError>;

/// Product persistence
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn find_all(&self) -> RepoResult<Vec<Product>>;
    async fn find_by_id(&self, id: ProductId) -> RepoResult<Option<Product>>;
    async fn save(&self, product: &Product) -> RepoResult<()>;
    /// Overwrite the persisted counters, `false` when the product is gone
    async fn update_stock(&self, id: ProductId, level: StockLevel) -> RepoResult<bool>;
    async fn delete(&self, id: ProductId) -> RepoResult<bool>;
}

/// Order persistence
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_by_id(&self, id: OrderId) -> RepoResult<Option<Order>>;
    /// The user's order that has not been delivered yet, if any
    async fn find_active_by_user(&self, user_id: UserId) -> RepoResult<Option<Order>>;
    async fn save(&self, order: &Order) -> RepoResult<()>;
}
