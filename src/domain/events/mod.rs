//! Domain events delivered to buyers as notifications
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{OrderStatus, RefundStatus, ReturnStatus};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, user_id: Uuid, total: Decimal },
    StatusChanged { order_id: Uuid, user_id: Uuid, from: OrderStatus, to: OrderStatus },
    ReturnUpdated { return_id: Uuid, order_id: Uuid, user_id: Uuid, status: ReturnStatus, refund_status: RefundStatus },
}

impl OrderEvent {
    pub fn user_id(&self) -> Uuid {
        match self {
            Self::Placed { user_id, .. } | Self::StatusChanged { user_id, .. } | Self::ReturnUpdated { user_id, .. } => *user_id,
        }
    }

    /// Subject suffix used when the event is published to a message bus.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Placed { .. } => "order_confirmation",
            Self::StatusChanged { .. } => "status_update",
            Self::ReturnUpdated { .. } => "return_update",
        }
    }
}
