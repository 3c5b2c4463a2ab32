//! Shipping methods

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShippingMethod {
    pub id: Uuid,
    pub name: String,
    pub base_price: Decimal,
    pub free_shipping_threshold: Option<Decimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl ShippingMethod {
    /// Base price, waived once the subtotal reaches the free-shipping threshold.
    pub fn cost_for(&self, subtotal: Decimal) -> Decimal {
        match self.free_shipping_threshold {
            Some(threshold) if subtotal >= threshold => Decimal::ZERO,
            _ => self.base_price,
        }
    }
}
