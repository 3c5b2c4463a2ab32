//! Promo codes

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::order::UnknownVariant;
use crate::domain::value_objects::PromoCodeKey;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromoCode {
    pub id: Uuid,
    pub code: PromoCodeKey,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_purchase_amount: Option<Decimal>,
    pub max_discount_amount: Option<Decimal>,
    pub usage_limit: Option<u32>,
    pub used_count: u32,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl PromoCode {
    pub fn is_exhausted(&self) -> bool {
        self.usage_limit.is_some_and(|limit| self.used_count >= limit)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    Percent,
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Percent => "PERCENT", Self::Fixed => "FIXED" }
    }
}

impl FromStr for DiscountType {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PERCENT" | "PERCENTAGE" => Ok(Self::Percent),
            "FIXED" => Ok(Self::Fixed),
            _ => Err(UnknownVariant::new("discount type", s)),
        }
    }
}
