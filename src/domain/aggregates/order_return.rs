//! Returns and refunds for delivered orders

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::order::{Order, OrderStatus, UnknownVariant};
use crate::{EcommerceError, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderReturn {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub reason: String,
    pub status: ReturnStatus,
    pub refund_amount: Decimal,
    pub refund_status: RefundStatus,
    pub admin_comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderReturn {
    /// Checks a return request against its parent order. `open_returns` is
    /// the number of existing, non-rejected returns for the order.
    pub fn check_request(order: &Order, user_id: Uuid, refund_amount: Decimal, open_returns: usize) -> Result<()> {
        if order.user_id != user_id { return Err(EcommerceError::NotFound("Order")); }
        if order.status != OrderStatus::Delivered {
            return Err(EcommerceError::conflict(format!("returns require a delivered order, order is {}", order.status)));
        }
        if refund_amount <= Decimal::ZERO { return Err(EcommerceError::validation("refund amount must be positive")); }
        if refund_amount > order.total {
            return Err(EcommerceError::conflict(format!("refund amount {} exceeds order total {}", refund_amount, order.total)));
        }
        if open_returns > 0 { return Err(EcommerceError::conflict("a return for this order is already open")); }
        Ok(())
    }

    pub fn is_open(&self) -> bool { self.status != ReturnStatus::Rejected }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Processing,
    Completed,
}

impl ReturnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
        }
    }

    pub fn can_transition_to(&self, next: ReturnStatus) -> bool {
        use ReturnStatus::*;
        matches!((self, next), (Pending, Approved) | (Pending, Rejected) | (Approved, Processing) | (Processing, Completed))
    }
}

impl FromStr for ReturnStatus {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            _ => Err(UnknownVariant::new("return status", s)),
        }
    }
}

/// Tracked independently of [`ReturnStatus`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn can_transition_to(&self, next: RefundStatus) -> bool {
        use RefundStatus::*;
        matches!((self, next), (Pending, Processing) | (Processing, Completed) | (Processing, Failed) | (Failed, Processing))
    }
}

impl FromStr for RefundStatus {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            _ => Err(UnknownVariant::new("refund status", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::PaymentMethod;

    fn order(status: OrderStatus) -> Order {
        Order {
            id: Uuid::now_v7(), user_id: Uuid::now_v7(), status, items: vec![],
            subtotal: Decimal::new(2000, 0), discount_amount: Decimal::ZERO, shipping_cost: Decimal::new(300, 0), total: Decimal::new(2300, 0),
            promo_code_id: None, payment_method: PaymentMethod::Card, payment_id: None, shipping_method_id: Uuid::now_v7(),
            shipping_address: "Moscow".into(), comment: None, created_at: Utc::now(), updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_return_requires_delivered_order() {
        let o = order(OrderStatus::Pending);
        let err = OrderReturn::check_request(&o, o.user_id, Decimal::new(100, 0), 0).unwrap_err();
        assert!(matches!(err, EcommerceError::Conflict(_)));
    }

    #[test]
    fn test_refund_cannot_exceed_total() {
        let o = order(OrderStatus::Delivered);
        assert!(OrderReturn::check_request(&o, o.user_id, o.total, 0).is_ok());
        let err = OrderReturn::check_request(&o, o.user_id, o.total + Decimal::ONE, 0).unwrap_err();
        assert!(matches!(err, EcommerceError::Conflict(_)));
    }

    #[test]
    fn test_only_owner_can_request() {
        let o = order(OrderStatus::Delivered);
        let err = OrderReturn::check_request(&o, Uuid::now_v7(), Decimal::ONE, 0).unwrap_err();
        assert!(matches!(err, EcommerceError::NotFound(_)));
    }

    #[test]
    fn test_statuses_parse_from_storage() {
        assert_eq!(" approved".parse::<ReturnStatus>().unwrap(), ReturnStatus::Approved);
        assert_eq!("FAILED".parse::<RefundStatus>().unwrap(), RefundStatus::Failed);
        assert!("SHIPPED".parse::<ReturnStatus>().is_err());
        assert!("".parse::<RefundStatus>().is_err());
    }

    #[test]
    fn test_return_machine() {
        use ReturnStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn test_refund_retry_after_failure() {
        use RefundStatus::*;
        assert!(Failed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Processing));
    }
}
