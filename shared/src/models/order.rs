//! Order Model

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::product::ProductId;

/// Order identifier (snowflake id)
pub type OrderId = i64;
/// Caller identity as trusted from the auth layer
pub type UserId = i64;

// ============================================================================
// Order Status
// ============================================================================

/// 订单状态
///
/// Strictly forward: `NotPlaced -> Placed -> Assembling -> Delivered`.
/// Serialized as the canonical name; the numeric code is accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum OrderStatus {
    /// 购物中，尚未下单
    #[default]
    NotPlaced = 0,
    /// 已下单
    Placed = 1,
    /// 备餐中
    Assembling = 2,
    /// 已交付（终态）
    Delivered = 3,
}

/// Status value outside the known vocabulary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order status: {0:?}")]
pub struct UnknownStatus(pub String);

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::NotPlaced,
        OrderStatus::Placed,
        OrderStatus::Assembling,
        OrderStatus::Delivered,
    ];

    /// The single forward step, `None` from the terminal state
    pub fn next(self) -> Option<Self> {
        match self {
            OrderStatus::NotPlaced => Some(OrderStatus::Placed),
            OrderStatus::Placed => Some(OrderStatus::Assembling),
            OrderStatus::Assembling => Some(OrderStatus::Delivered),
            OrderStatus::Delivered => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == OrderStatus::Delivered
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            OrderStatus::NotPlaced => "NotPlaced",
            OrderStatus::Placed => "Placed",
            OrderStatus::Assembling => "Assembling",
            OrderStatus::Delivered => "Delivered",
        }
    }
}

impl TryFrom<u8> for OrderStatus {
    type Error = UnknownStatus;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OrderStatus::NotPlaced),
            1 => Ok(OrderStatus::Placed),
            2 => Ok(OrderStatus::Assembling),
            3 => Ok(OrderStatus::Delivered),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    /// Accepts the canonical name or its numeric code
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<u8>() {
            return OrderStatus::try_from(code);
        }
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.name() == trimmed)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Code(u8),
            Name(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Code(code) => OrderStatus::try_from(code).map_err(serde::de::Error::custom),
            Repr::Name(name) => name.parse().map_err(serde::de::Error::custom),
        }
    }
}

// ============================================================================
// Order
// ============================================================================

/// One cart line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Order entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub status: OrderStatus,
    /// Unix millis
    pub created_at: i64,
    /// Delivery window start (Unix millis)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_from: Option<i64>,
    /// Delivery window end (Unix millis)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_until: Option<i64>,
}

impl Order {
    /// Fresh cart for `user_id`
    pub fn new_empty(id: OrderId, user_id: UserId, created_at: i64) -> Self {
        Self {
            id,
            user_id,
            items: Vec::new(),
            status: OrderStatus::NotPlaced,
            created_at,
            delivery_from: None,
            delivery_until: None,
        }
    }

    /// Not yet delivered
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Quantity of `product_id` summed over all lines
    pub fn quantity_of(&self, product_id: ProductId) -> u32 {
        self.items
            .iter()
            .filter(|item| item.product_id == product_id)
            .map(|item| item.quantity)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_advances_one_step() {
        assert_eq!(OrderStatus::NotPlaced.next(), Some(OrderStatus::Placed));
        assert_eq!(OrderStatus::Placed.next(), Some(OrderStatus::Assembling));
        assert_eq!(OrderStatus::Assembling.next(), Some(OrderStatus::Delivered));
        assert_eq!(OrderStatus::Delivered.next(), None);
        assert!(OrderStatus::Delivered.is_terminal());
    }

    #[test]
    fn test_status_parse_name_and_code() {
        assert_eq!("Placed".parse::<OrderStatus>().unwrap(), OrderStatus::Placed);
        assert_eq!("1".parse::<OrderStatus>().unwrap(), OrderStatus::Placed);
        assert_eq!(" 3 ".parse::<OrderStatus>().unwrap(), OrderStatus::Delivered);
    }

    #[test]
    fn test_status_unknown_fails_loudly() {
        assert_eq!(
            "Cooking".parse::<OrderStatus>(),
            Err(UnknownStatus("Cooking".to_string()))
        );
        assert!("7".parse::<OrderStatus>().is_err());
        assert!(serde_json::from_str::<OrderStatus>("\"placed\"").is_err());
        assert!(serde_json::from_str::<OrderStatus>("9").is_err());
    }

    #[test]
    fn test_status_serde_canonical_name() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Assembling).unwrap(),
            "\"Assembling\""
        );
        assert_eq!(
            serde_json::from_str::<OrderStatus>("2").unwrap(),
            OrderStatus::Assembling
        );
    }

    #[test]
    fn test_order_quantity_of() {
        let mut order = Order::new_empty(1, 2, 0);
        order.items.push(OrderItem { product_id: 5, quantity: 2 });
        order.items.push(OrderItem { product_id: 6, quantity: 1 });
        order.items.push(OrderItem { product_id: 5, quantity: 1 });
        assert_eq!(order.quantity_of(5), 3);
        assert_eq!(order.quantity_of(9), 0);
        assert!(order.is_active());
    }
}
