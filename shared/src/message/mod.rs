//! 实时推送消息类型定义
//!
//! Events travel from the server broadcaster to connected clients, one
//! event per line on a text event stream:
//!
//! - stock: `productId:stock:reserved`
//! - status: `orderId:StatusName`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::{OrderId, OrderStatus, ProductId, UnknownStatus};

/// Channel a subscriber listens on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Topic {
    /// Stock counters of every product
    ProductQuantity,
    /// Status of one order
    OrderStatus(OrderId),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::ProductQuantity => write!(f, "product_quantity"),
            Topic::OrderStatus(id) => write!(f, "order_status/{}", id),
        }
    }
}

/// Malformed event line
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("malformed event line: {0:?}")]
    Malformed(String),
    #[error("reserved exceeds stock in line: {0:?}")]
    Inconsistent(String),
    #[error(transparent)]
    UnknownStatus(#[from] UnknownStatus),
}

/// New counters of one product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub product_id: ProductId,
    pub stock: u32,
    pub reserved: u32,
}

impl StockChange {
    pub fn available(&self) -> u32 {
        self.stock.saturating_sub(self.reserved)
    }

    pub fn to_line(&self) -> String {
        format!("{}:{}:{}", self.product_id, self.stock, self.reserved)
    }
}

impl FromStr for StockChange {
    type Err = WireError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let malformed = || WireError::Malformed(line.to_string());
        let mut parts = line.trim().split(':');
        let (Some(id), Some(stock), Some(reserved), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };

        let change = StockChange {
            product_id: id.parse().map_err(|_| malformed())?,
            stock: stock.parse().map_err(|_| malformed())?,
            reserved: reserved.parse().map_err(|_| malformed())?,
        };
        if change.reserved > change.stock {
            return Err(WireError::Inconsistent(line.to_string()));
        }
        Ok(change)
    }
}

/// New status of one order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

impl StatusChange {
    pub fn to_line(&self) -> String {
        format!("{}:{}", self.order_id, self.status)
    }
}

impl FromStr for StatusChange {
    type Err = WireError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (id, status) = line
            .trim()
            .split_once(':')
            .ok_or_else(|| WireError::Malformed(line.to_string()))?;
        Ok(StatusChange {
            order_id: id
                .parse()
                .map_err(|_| WireError::Malformed(line.to_string()))?,
            status: status.parse()?,
        })
    }
}

/// Anything the broadcaster fans out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    Stock(StockChange),
    Status(StatusChange),
}

impl LiveEvent {
    pub fn topic(&self) -> Topic {
        match self {
            LiveEvent::Stock(_) => Topic::ProductQuantity,
            LiveEvent::Status(change) => Topic::OrderStatus(change.order_id),
        }
    }

    pub fn to_line(&self) -> String {
        match self {
            LiveEvent::Stock(change) => change.to_line(),
            LiveEvent::Status(change) => change.to_line(),
        }
    }
}

impl From<StockChange> for LiveEvent {
    fn from(change: StockChange) -> Self {
        LiveEvent::Stock(change)
    }
}

impl From<StatusChange> for LiveEvent {
    fn from(change: StatusChange) -> Self {
        LiveEvent::Status(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_line_format() {
        let change = StockChange {
            product_id: 42,
            stock: 10,
            reserved: 4,
        };
        assert_eq!(change.to_line(), "42:10:4");
        assert_eq!("42:10:4".parse::<StockChange>().unwrap(), change);
        assert_eq!(change.available(), 6);
    }

    #[test]
    fn test_stock_line_rejects_garbage() {
        assert!(matches!(
            "42:10".parse::<StockChange>(),
            Err(WireError::Malformed(_))
        ));
        assert!(matches!(
            "42:10:4:1".parse::<StockChange>(),
            Err(WireError::Malformed(_))
        ));
        assert!(matches!(
            "a:b:c".parse::<StockChange>(),
            Err(WireError::Malformed(_))
        ));
        assert!(matches!(
            "1:2:3".parse::<StockChange>(),
            Err(WireError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_status_line() {
        let change: StatusChange = "7:Assembling".parse().unwrap();
        assert_eq!(change.order_id, 7);
        assert_eq!(change.status, OrderStatus::Assembling);
        assert_eq!(change.to_line(), "7:Assembling");

        let numeric: StatusChange = "7:3".parse().unwrap();
        assert_eq!(numeric.status, OrderStatus::Delivered);

        assert!(matches!(
            "7:Lost".parse::<StatusChange>(),
            Err(WireError::UnknownStatus(_))
        ));
    }

    #[test]
    fn test_event_topic() {
        let stock = LiveEvent::from(StockChange {
            product_id: 1,
            stock: 1,
            reserved: 0,
        });
        assert_eq!(stock.topic(), Topic::ProductQuantity);

        let status = LiveEvent::from(StatusChange {
            order_id: 9,
            status: OrderStatus::Placed,
        });
        assert_eq!(status.topic(), Topic::OrderStatus(9));
        assert_eq!(status.topic().to_string(), "order_status/9");
    }
}
