//! Product Model

use serde::{Deserialize, Serialize};

/// Product identifier (snowflake id)
pub type ProductId = i64;

/// Stock counters of one product
///
/// `available` is always derived from `stock - reserved` and never stored.
/// A value with `reserved > stock` cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawStockLevel")]
pub struct StockLevel {
    stock: u32,
    reserved: u32,
}

#[derive(Deserialize)]
struct RawStockLevel {
    stock: u32,
    reserved: u32,
}

impl TryFrom<RawStockLevel> for StockLevel {
    type Error = String;

    fn try_from(raw: RawStockLevel) -> Result<Self, Self::Error> {
        StockLevel::new(raw.stock, raw.reserved).ok_or_else(|| {
            format!(
                "reserved ({}) exceeds stock ({})",
                raw.reserved, raw.stock
            )
        })
    }
}

impl StockLevel {
    /// Counters with `reserved <= stock`, `None` otherwise
    pub fn new(stock: u32, reserved: u32) -> Option<Self> {
        (reserved <= stock).then_some(Self { stock, reserved })
    }

    /// Fresh counters with nothing reserved
    pub fn unreserved(stock: u32) -> Self {
        Self { stock, reserved: 0 }
    }

    pub fn stock(&self) -> u32 {
        self.stock
    }

    pub fn reserved(&self) -> u32 {
        self.reserved
    }

    pub fn available(&self) -> u32 {
        self.stock - self.reserved
    }
}

/// Product entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Price in cents
    pub price: i64,
    /// Hidden products stay reservable for existing carts but are not listed
    pub is_visible: bool,
    #[serde(flatten)]
    pub stock: StockLevel,
}

impl Product {
    pub fn available(&self) -> u32 {
        self.stock.available()
    }
}

/// Create product payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCreate {
    pub name: String,
    /// Price in cents
    pub price: i64,
    #[serde(default)]
    pub stock: u32,
    pub is_visible: Option<bool>,
}
