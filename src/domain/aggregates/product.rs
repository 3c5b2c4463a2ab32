//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EcommerceError, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub original_price: Option<Decimal>,
    pub discount_percent: i32,
    pub category: Option<String>,
    pub stock: u32,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub variants: Vec<ProductVariant>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A purchasable option of a product (size, colour...). Carries its own
/// stock; the price falls back to the product price when unset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub price: Option<Decimal>,
    pub stock: u32,
}

impl Product {
    pub fn variant(&self, variant_id: Uuid) -> Result<&ProductVariant> {
        self.variants.iter().find(|v| v.id == variant_id).ok_or(EcommerceError::NotFound("Product variant"))
    }

    /// Current authoritative unit price for the product or one of its variants.
    pub fn unit_price(&self, variant_id: Option<Uuid>) -> Result<Decimal> {
        match variant_id {
            Some(id) => Ok(self.variant(id)?.price.unwrap_or(self.price)),
            None => Ok(self.price),
        }
    }

    /// Physical stock of the product or the named variant.
    pub fn stock_of(&self, variant_id: Option<Uuid>) -> Result<u32> {
        match variant_id {
            Some(id) => Ok(self.variant(id)?.stock),
            None => Ok(self.stock),
        }
    }

    pub fn ensure_purchasable(&self) -> Result<()> {
        if !self.is_active { return Err(EcommerceError::conflict(format!("product {} is not available", self.id))); }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> Product {
        let id = Uuid::now_v7();
        Product {
            id, name: "Tea".into(), description: String::new(), price: Decimal::new(1000, 0),
            original_price: None, discount_percent: 0, category: None, stock: 3, image_url: None, is_active: true,
            variants: vec![ProductVariant { id: Uuid::now_v7(), product_id: id, name: "500g".into(), price: Some(Decimal::new(1800, 0)), stock: 7 }],
            created_at: Utc::now(), updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_variant_price_overrides_product_price() {
        let p = product();
        let variant = p.variants[0].id;
        assert_eq!(p.unit_price(None).unwrap(), Decimal::new(1000, 0));
        assert_eq!(p.unit_price(Some(variant)).unwrap(), Decimal::new(1800, 0));
        assert_eq!(p.stock_of(Some(variant)).unwrap(), 7);
    }

    #[test]
    fn test_unknown_variant() {
        let p = product();
        assert!(matches!(p.unit_price(Some(Uuid::now_v7())), Err(EcommerceError::NotFound(_))));
    }

    #[test]
    fn test_inactive_product_is_not_purchasable() {
        let mut p = product();
        p.is_active = false;
        assert!(matches!(p.ensure_purchasable(), Err(EcommerceError::Conflict(_))));
    }
}
