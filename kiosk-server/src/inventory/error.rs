use shared::{AppError, ErrorCode, ProductId};
use thiserror::Error;

/// Ledger errors
///
/// Every failure leaves the counters untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Product already tracked: {0}")]
    AlreadyExists(ProductId),

    #[error("Quantity must be greater than zero")]
    InvalidQuantity,

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("Release of {requested} exceeds reserved {reserved} for product {product_id}")]
    InvalidRelease {
        product_id: ProductId,
        requested: u32,
        reserved: u32,
    },

    #[error("Confirm of {requested} exceeds reserved {reserved} for product {product_id}")]
    InvalidConfirm {
        product_id: ProductId,
        requested: u32,
        reserved: u32,
    },

    #[error("Product {product_id} still has {reserved} reserved units")]
    ProductInUse { product_id: ProductId, reserved: u32 },

    #[error("Stock {stock} below reserved {reserved} for product {product_id}")]
    InvalidStock {
        product_id: ProductId,
        stock: u32,
        reserved: u32,
    },
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        let message = err.to_string();
        match err {
            LedgerError::ProductNotFound(id) => AppError::product_not_found(id),
            LedgerError::AlreadyExists(id) => {
                AppError::with_message(ErrorCode::AlreadyExists, message).with_detail("product_id", id)
            }
            LedgerError::InvalidQuantity => AppError::new(ErrorCode::InvalidQuantity),
            LedgerError::InsufficientStock {
                product_id,
                requested,
                available,
            } => AppError::insufficient_stock(product_id, requested, available),
            LedgerError::InvalidRelease {
                product_id,
                requested,
                reserved,
            } => AppError::invalid_release(product_id, requested, reserved),
            LedgerError::InvalidConfirm {
                product_id,
                requested,
                reserved,
            } => AppError::with_message(ErrorCode::InvalidConfirm, message)
                .with_detail("product_id", product_id)
                .with_detail("requested", requested)
                .with_detail("reserved", reserved),
            LedgerError::ProductInUse {
                product_id,
                reserved,
            } => AppError::with_message(ErrorCode::ProductInUse, message)
                .with_detail("product_id", product_id)
                .with_detail("reserved", reserved),
            LedgerError::InvalidStock {
                product_id,
                stock,
                reserved,
            } => AppError::with_message(ErrorCode::InvalidStock, message)
                .with_detail("product_id", product_id)
                .with_detail("stock", stock)
                .with_detail("reserved", reserved),
        }
    }
}
