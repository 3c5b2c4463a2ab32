//! Write models accepted by the [`Store`](super::Store).
//!
//! Request bodies deserialize straight into these and are validated with
//! `validator` before they reach storage.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::domain::aggregates::{
    CartItem, DiscountType, Order, OrderItem, OrderStatus, PaymentMethod, Product, ReservationLine,
};
use crate::pricing::OrderTotals;
use crate::{EcommerceError, Result};

fn non_negative(amount: &Decimal) -> std::result::Result<(), ValidationError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ValidationError::new("negative_amount"));
    }
    Ok(())
}

fn positive(amount: &Decimal) -> std::result::Result<(), ValidationError> {
    if *amount <= Decimal::ZERO {
        return Err(ValidationError::new("non_positive_amount"));
    }
    Ok(())
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewVariant {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(custom = "non_negative")]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub stock: u32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewProduct {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[validate(custom = "non_negative")]
    pub price: Decimal,
    #[validate(custom = "non_negative")]
    pub original_price: Option<Decimal>,
    #[serde(default)]
    #[validate(range(min = 0, max = 100))]
    pub discount_percent: i32,
    pub category: Option<String>,
    #[serde(default)]
    pub stock: u32,
    pub image_url: Option<String>,
    #[serde(default)]
    #[validate]
    pub variants: Vec<NewVariant>,
}

/// Partial product update. Absent fields are left untouched; nullable
/// fields accept an explicit `null` to clear them.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProductPatch {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "non_negative")]
    pub price: Option<Decimal>,
    #[serde(default, deserialize_with = "nullable")]
    pub original_price: Option<Option<Decimal>>,
    #[validate(range(min = 0, max = 100))]
    pub discount_percent: Option<i32>,
    #[serde(default, deserialize_with = "nullable")]
    pub category: Option<Option<String>>,
    pub stock: Option<u32>,
    #[serde(default, deserialize_with = "nullable")]
    pub image_url: Option<Option<String>>,
    pub is_active: Option<bool>,
}

impl ProductPatch {
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        if let Some(Some(price)) = self.original_price {
            if price.is_sign_negative() && !price.is_zero() {
                return Err(EcommerceError::validation("original_price must not be negative"));
            }
        }
        Ok(())
    }

    pub fn apply(self, product: &mut Product) {
        if let Some(name) = self.name { product.name = name; }
        if let Some(description) = self.description { product.description = description; }
        if let Some(price) = self.price { product.price = price; }
        if let Some(original_price) = self.original_price { product.original_price = original_price; }
        if let Some(discount) = self.discount_percent { product.discount_percent = discount; }
        if let Some(category) = self.category { product.category = category; }
        if let Some(stock) = self.stock { product.stock = stock; }
        if let Some(image_url) = self.image_url { product.image_url = image_url; }
        if let Some(active) = self.is_active { product.is_active = active; }
        product.updated_at = Utc::now();
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.price.is_none() && self.original_price.is_none()
            && self.discount_percent.is_none() && self.category.is_none() && self.stock.is_none()
            && self.image_url.is_none() && self.is_active.is_none()
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewShippingMethod {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(custom = "non_negative")]
    pub base_price: Decimal,
    #[validate(custom = "non_negative")]
    pub free_shipping_threshold: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewPromoCode {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    pub discount_type: DiscountType,
    #[validate(custom = "positive")]
    pub discount_value: Decimal,
    #[validate(custom = "non_negative")]
    pub min_purchase_amount: Option<Decimal>,
    #[validate(custom = "positive")]
    pub max_discount_amount: Option<Decimal>,
    #[validate(range(min = 1))]
    pub usage_limit: Option<u32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl NewPromoCode {
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        if self.discount_type == DiscountType::Percent && self.discount_value > Decimal::ONE_HUNDRED {
            return Err(EcommerceError::validation("percent discount must not exceed 100"));
        }
        if let (Some(from), Some(until)) = (self.valid_from, self.valid_until) {
            if from >= until {
                return Err(EcommerceError::validation("valid_from must be before valid_until"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub search: Option<String>,
    pub include_inactive: bool,
    pub page: u32,
    pub per_page: u32,
}

impl ProductFilter {
    pub fn offset(&self) -> u64 { u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page) }

    pub fn matches(&self, name: &str, category: Option<&str>, is_active: bool) -> bool {
        if !self.include_inactive && !is_active { return false; }
        if let Some(wanted) = &self.category {
            if category != Some(wanted.as_str()) { return false; }
        }
        if let Some(term) = &self.search {
            if !name.to_lowercase().contains(&term.to_lowercase()) { return false; }
        }
        true
    }
}

/// A fully priced order ready to be persisted together with its stock
/// reservations, promo redemption and cart clean-up.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<OrderItem>,
    pub totals: OrderTotals,
    pub promo_code_id: Option<Uuid>,
    pub payment_method: PaymentMethod,
    pub shipping_method_id: Uuid,
    pub shipping_address: String,
    pub comment: Option<String>,
    /// The cart lines as they were priced. Placement consumes exactly these
    /// quantities; anything added to the cart meanwhile stays there.
    pub cart_items: Vec<CartItem>,
    pub reservation_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl OrderDraft {
    pub fn reservation_lines(&self) -> Vec<ReservationLine> {
        self.items
            .iter()
            .map(|i| ReservationLine { product_id: i.product_id, variant_id: i.variant_id, quantity: i.quantity })
            .collect()
    }

    pub fn to_order(&self) -> Order {
        Order {
            id: self.id,
            user_id: self.user_id,
            status: OrderStatus::Pending,
            items: self.items.clone(),
            subtotal: self.totals.subtotal,
            discount_amount: self.totals.discount_amount,
            shipping_cost: self.totals.shipping_cost,
            total: self.totals.total,
            promo_code_id: self.promo_code_id,
            payment_method: self.payment_method,
            payment_id: None,
            shipping_method_id: self.shipping_method_id,
            shipping_address: self.shipping_address.clone(),
            comment: self.comment.clone(),
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Sums requested quantities per stock unit (product or variant).
pub fn group_lines(lines: &[ReservationLine]) -> Vec<ReservationLine> {
    let mut grouped: Vec<ReservationLine> = Vec::with_capacity(lines.len());
    for line in lines {
        match grouped.iter_mut().find(|g| g.product_id == line.product_id && g.variant_id == line.variant_id) {
            Some(existing) => existing.quantity += line.quantity,
            None => grouped.push(line.clone()),
        }
    }
    grouped.sort_by_key(|l| (l.product_id, l.variant_id));
    grouped
}

#[derive(Debug, Clone)]
pub struct NewReturn {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub reason: String,
    /// Defaults to the order total.
    pub refund_amount: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub rating: u8,
    pub text: Option<String>,
}

/// Outcome of confirming an order's holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Confirmation {
    /// Holds turned into stock decrements.
    pub confirmed: u32,
    /// Holds whose stock was gone by the time payment arrived. They are
    /// released without touching stock and need an admin decision.
    pub unfulfilled: Vec<ReservationLine>,
}

/// Result of applying a payment notification to an order.
#[derive(Debug, Clone)]
pub struct PaymentApplied {
    pub order: Order,
    /// True only for the delivery that moved the order out of PENDING.
    pub transitioned: bool,
    pub confirmation: Confirmation,
}

#[derive(Debug, Clone)]
pub struct StatusChange {
    pub order: Order,
    pub from: OrderStatus,
}

impl StatusChange {
    pub fn changed(&self) -> bool { self.from != self.order.status }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_distinguishes_null_from_absent() {
        let patch: ProductPatch = serde_json::from_str(r#"{"original_price": null}"#).unwrap();
        assert_eq!(patch.original_price, Some(None));
        assert_eq!(patch.category, None);
        assert!(!patch.is_empty());
        let empty: ProductPatch = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_patch_rejects_bad_discount() {
        let patch: ProductPatch = serde_json::from_str(r#"{"discount_percent": 120}"#).unwrap();
        assert!(patch.check().is_err());
    }

    #[test]
    fn test_promo_percent_over_hundred_rejected() {
        let promo: NewPromoCode = serde_json::from_str(
            r#"{"code": "HALF", "discount_type": "PERCENT", "discount_value": "150"}"#,
        ).unwrap();
        assert!(promo.check().is_err());
    }

    #[test]
    fn test_offset_of_last_page_does_not_overflow() {
        let filter = ProductFilter { page: u32::MAX, per_page: 100, ..Default::default() };
        assert_eq!(filter.offset(), u64::from(u32::MAX - 1) * 100);
        let first = ProductFilter { page: 1, per_page: 20, ..Default::default() };
        assert_eq!(first.offset(), 0);
    }

    #[test]
    fn test_group_lines_sums_same_stock_unit() {
        let product = Uuid::now_v7();
        let lines = vec![
            ReservationLine { product_id: product, variant_id: None, quantity: 2 },
            ReservationLine { product_id: product, variant_id: None, quantity: 3 },
        ];
        let grouped = group_lines(&lines);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].quantity, 5);
    }
}
