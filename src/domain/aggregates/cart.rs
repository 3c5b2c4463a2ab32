//! Cart Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::product::Product;
use crate::domain::value_objects::Quantity;
use crate::{EcommerceError, Result};

/// Persisted cart line. Carries no price; prices are always read from the
/// catalog when the cart is viewed or checked out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
}

impl CartItem {
    pub fn same_line(&self, product_id: Uuid, variant_id: Option<Uuid>) -> bool {
        self.product_id == product_id && self.variant_id == variant_id
    }
}

/// Adds `quantity` to the user's cart, summing into an existing line for the
/// same product and variant. Returns the resulting line.
pub fn merge_into(items: &mut Vec<CartItem>, user_id: Uuid, product_id: Uuid, variant_id: Option<Uuid>, quantity: Quantity) -> Result<CartItem> {
    if let Some(existing) = items.iter_mut().find(|i| i.user_id == user_id && i.same_line(product_id, variant_id)) {
        existing.quantity = existing.quantity.saturating_add(quantity.value()).min(Quantity::MAX);
        return Ok(existing.clone());
    }
    let item = CartItem { id: Uuid::now_v7(), user_id, product_id, variant_id, quantity: quantity.value(), created_at: Utc::now() };
    items.push(item.clone());
    Ok(item)
}

#[derive(Clone, Debug, Serialize)]
pub struct CartLine {
    pub item_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Clone, Debug, Serialize)]
pub struct Cart {
    pub user_id: Uuid,
    pub lines: Vec<CartLine>,
    pub subtotal: Decimal,
}

impl Cart {
    /// Prices cart items against current catalog data. Items whose product
    /// disappeared are reported as `NotFound`.
    pub fn price(user_id: Uuid, items: &[CartItem], products: &[Product]) -> Result<Self> {
        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let product = products.iter().find(|p| p.id == item.product_id).ok_or(EcommerceError::NotFound("Product"))?;
            let unit_price = product.unit_price(item.variant_id)?;
            let product_name = match item.variant_id {
                Some(v) => format!("{} ({})", product.name, product.variant(v)?.name),
                None => product.name.clone(),
            };
            lines.push(CartLine {
                item_id: item.id, product_id: item.product_id, variant_id: item.variant_id, product_name,
                quantity: item.quantity, unit_price, line_total: unit_price * Decimal::from(item.quantity),
            });
        }
        let subtotal = lines.iter().map(|l| l.line_total).sum();
        Ok(Self { user_id, lines, subtotal })
    }

    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn item_count(&self) -> u32 { self.lines.iter().map(|l| l.quantity).sum() }
}
