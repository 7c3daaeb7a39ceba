use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: BigDecimal,
    pub stock: i32,
}

impl Product {
    pub fn can_fulfil(&self, quantity: i32) -> bool {
        self.stock >= quantity
    }
}

/// Lifecycle of an order.
///
/// ```text
/// RESERVED --(payment success)--> CONFIRMED
/// RESERVED --(payment failure)--> CANCELED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Reserved,
    Confirmed,
    Canceled,
}

impl OrderStatus {
    /// Representation stored in `orders.status`.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Reserved => "reserved",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Reserved)
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Reserved, OrderStatus::Confirmed)
                | (OrderStatus::Reserved, OrderStatus::Canceled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOrderStatus(pub String);

impl fmt::Display for UnknownOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown order status: {}", self.0)
    }
}

impl std::error::Error for UnknownOrderStatus {}

impl FromStr for OrderStatus {
    type Err = UnknownOrderStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reserved" => Ok(OrderStatus::Reserved),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "canceled" => Ok(OrderStatus::Canceled),
            other => Err(UnknownOrderStatus(other.to_string())),
        }
    }
}

/// Opaque locator handed to the payer so a later payment callback can be
/// correlated back to its order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentHandle(String);

impl PaymentHandle {
    pub fn derive(base_url: &str, order_id: i64) -> Self {
        Self(format!("{}/{}", base_url.trim_end_matches('/'), order_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn order_id(&self) -> Option<i64> {
        self.0.rsplit('/').next()?.parse().ok()
    }
}

impl fmt::Display for PaymentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub sum: BigDecimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub payment_handle: Option<PaymentHandle>,
}

impl Order {
    pub fn with_payment_handle(mut self, base_url: &str) -> Self {
        self.payment_handle = Some(PaymentHandle::derive(base_url, self.id));
        self
    }
}

/// `price * quantity`, fixed at reservation time.
pub fn order_sum(price: &BigDecimal, quantity: i32) -> BigDecimal {
    price.clone() * BigDecimal::from(quantity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_reserved_orders_can_move() {
        assert!(OrderStatus::Reserved.can_transition_to(OrderStatus::Confirmed));
        assert!(OrderStatus::Reserved.can_transition_to(OrderStatus::Canceled));
        assert!(!OrderStatus::Confirmed.can_transition_to(OrderStatus::Canceled));
        assert!(!OrderStatus::Canceled.can_transition_to(OrderStatus::Confirmed));
        assert!(!OrderStatus::Reserved.can_transition_to(OrderStatus::Reserved));
        assert!(OrderStatus::Confirmed.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(!OrderStatus::Reserved.is_terminal());
    }

    #[test]
    fn status_round_trips_through_column_value() {
        for status in [OrderStatus::Reserved, OrderStatus::Confirmed, OrderStatus::Canceled] {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert!("approved".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn status_serializes_upper_case() {
        let json = serde_json::to_string(&OrderStatus::Reserved).unwrap();
        assert_eq!(json, "\"RESERVED\"");
    }

    #[test]
    fn payment_handle_is_deterministic() {
        let a = PaymentHandle::derive("https://pay.example/orders/", 42);
        let b = PaymentHandle::derive("https://pay.example/orders", 42);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "https://pay.example/orders/42");
        assert_eq!(a.order_id(), Some(42));
    }

    #[test]
    fn sum_multiplies_price_by_quantity() {
        let price: BigDecimal = "19.99".parse().unwrap();
        let expected: BigDecimal = "59.97".parse().unwrap();
        assert_eq!(order_sum(&price, 3), expected);
    }
}
