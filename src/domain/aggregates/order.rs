//! Order Aggregate
//!
//! Orders are priced once at creation; items are an immutable snapshot of the
//! prices in effect at that moment.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,
    pub promo_code_id: Option<Uuid>,
    pub payment_method: PaymentMethod,
    pub payment_id: Option<String>,
    pub shipping_method_id: Uuid,
    pub shipping_address: String,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Delivered | Self::Cancelled) }

    /// Single-step forward moves plus cancellation before shipment.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Processing, Shipped) | (Shipped, Delivered) | (Pending, Cancelled) | (Processing, Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "SHIPPED" => Ok(Self::Shipped),
            "DELIVERED" => Ok(Self::Delivered),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(UnknownVariant::new("order status", s)),
        }
    }
}

/// `Card` orders are paid online through the payment provider; `Cash`
/// orders are settled on delivery and confirmed by an administrator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[default]
    Card,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Card => "CARD", Self::Cash => "CASH" }
    }
    pub fn is_online(&self) -> bool { matches!(self, Self::Card) }
}

impl FromStr for PaymentMethod {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CARD" => Ok(Self::Card),
            "CASH" => Ok(Self::Cash),
            _ => Err(UnknownVariant::new("payment method", s)),
        }
    }
}

/// Returned when a stored or submitted enum value is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant { pub kind: &'static str, pub value: String }
impl UnknownVariant {
    pub fn new(kind: &'static str, value: &str) -> Self { Self { kind, value: value.to_string() } }
}
impl std::error::Error for UnknownVariant {}
impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "unknown {}: {}", self.kind, self.value) }
}

impl From<UnknownVariant> for crate::EcommerceError {
    fn from(err: UnknownVariant) -> Self { crate::EcommerceError::Validation(err.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn test_order_workflow() {
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(Delivered.is_terminal());
    }

    #[test]
    fn test_no_skipping_or_leaving_terminal_states() {
        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Processing.can_transition_to(Delivered));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Shipped.can_transition_to(Cancelled));
    }

    #[test]
    fn test_cancel_only_before_shipment() {
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Cancelled));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("shipped".parse::<OrderStatus>().unwrap(), Shipped);
        assert!("LOST".parse::<OrderStatus>().is_err());
        assert_eq!(serde_json::to_string(&Processing).unwrap(), "\"PROCESSING\"");
    }
}
