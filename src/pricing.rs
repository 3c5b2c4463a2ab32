//! Order pricing.
//!
//! Every subtotal, discount and total the service reports is computed here.
//! Prices come from the catalog; anything a client submits is advisory.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::domain::aggregates::{DiscountType, PromoCode, ShippingMethod};
use crate::{EcommerceError, Result};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PricedLine {
    pub unit_price: Decimal,
    pub quantity: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,
}

pub fn subtotal(lines: &[PricedLine]) -> Decimal {
    lines.iter().map(|l| l.unit_price * Decimal::from(l.quantity)).sum()
}

fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Rejects a promo code that is inactive, outside its validity window,
/// used up, or applied below its minimum purchase amount.
pub fn validate_promo(promo: &PromoCode, subtotal: Decimal, now: DateTime<Utc>) -> Result<()> {
    let reject = |reason: &str| Err(EcommerceError::InvalidPromoCode(format!("{}: {}", promo.code, reason)));
    if !promo.is_active { return reject("not active"); }
    if promo.valid_from.is_some_and(|from| now < from) { return reject("not yet valid"); }
    if promo.valid_until.is_some_and(|until| now > until) { return reject("expired"); }
    if promo.is_exhausted() { return reject("usage limit reached"); }
    if let Some(min) = promo.min_purchase_amount {
        if subtotal < min { return reject(&format!("minimum purchase amount is {}", min)); }
    }
    Ok(())
}

/// Discount a valid promo grants on `subtotal`; within `[0, subtotal]`.
pub fn discount_for(promo: &PromoCode, subtotal: Decimal) -> Decimal {
    let raw = match promo.discount_type {
        DiscountType::Percent => {
            let amount = subtotal * promo.discount_value / Decimal::ONE_HUNDRED;
            match promo.max_discount_amount {
                Some(cap) => amount.min(cap),
                None => amount,
            }
        }
        DiscountType::Fixed => promo.discount_value,
    };
    round_money(raw).max(Decimal::ZERO).min(subtotal)
}

/// Computes the totals for an order. Shipping is optional so carts can be
/// previewed before a shipping method is chosen.
pub fn compute_order_totals(
    lines: &[PricedLine],
    promo: Option<&PromoCode>,
    shipping: Option<&ShippingMethod>,
    now: DateTime<Utc>,
) -> Result<OrderTotals> {
    let subtotal = subtotal(lines);
    let discount_amount = match promo {
        Some(promo) => {
            validate_promo(promo, subtotal, now)?;
            discount_for(promo, subtotal)
        }
        None => Decimal::ZERO,
    };
    let shipping_cost = shipping.map(|m| m.cost_for(subtotal)).unwrap_or(Decimal::ZERO);
    let total = (subtotal - discount_amount + shipping_cost).max(Decimal::ZERO);
    Ok(OrderTotals { subtotal, discount_amount, shipping_cost, total })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::PromoCodeKey;
    use chrono::Duration;
    use uuid::Uuid;

    fn promo(code: &str, discount_type: DiscountType, value: i64) -> PromoCode {
        PromoCode {
            id: Uuid::now_v7(), code: PromoCodeKey::new(code).unwrap(), discount_type, discount_value: Decimal::new(value, 0),
            min_purchase_amount: None, max_discount_amount: None, usage_limit: None, used_count: 0,
            valid_from: None, valid_until: None, is_active: true, created_at: Utc::now(),
        }
    }

    fn courier(price: i64) -> ShippingMethod {
        ShippingMethod {
            id: Uuid::now_v7(), name: "Courier".into(), base_price: Decimal::new(price, 0),
            free_shipping_threshold: None, is_active: true, created_at: Utc::now(),
        }
    }

    fn line(price: i64, quantity: u32) -> PricedLine { PricedLine { unit_price: Decimal::new(price, 0), quantity } }

    #[test]
    fn test_percent_promo_scenario() {
        let save10 = promo("SAVE10", DiscountType::Percent, 10);
        let totals = compute_order_totals(&[line(1000, 2)], Some(&save10), Some(&courier(300)), Utc::now()).unwrap();
        assert_eq!(totals.subtotal, Decimal::new(2000, 0));
        assert_eq!(totals.discount_amount, Decimal::new(200, 0));
        assert_eq!(totals.shipping_cost, Decimal::new(300, 0));
        assert_eq!(totals.total, Decimal::new(2100, 0));
    }

    #[test]
    fn test_fixed_promo_capped_to_subtotal() {
        let flat = promo("FLAT500", DiscountType::Fixed, 500);
        let totals = compute_order_totals(&[line(300, 1)], Some(&flat), Some(&courier(300)), Utc::now()).unwrap();
        assert_eq!(totals.discount_amount, Decimal::new(300, 0));
        assert_eq!(totals.total, Decimal::new(300, 0));
    }

    #[test]
    fn test_percent_discount_respects_cap() {
        let mut p = promo("BIG", DiscountType::Percent, 50);
        p.max_discount_amount = Some(Decimal::new(700, 0));
        for subtotal in [100i64, 1000, 1400, 5000] {
            let expected = (Decimal::new(subtotal, 0) / Decimal::TWO).min(Decimal::new(700, 0));
            assert_eq!(discount_for(&p, Decimal::new(subtotal, 0)), expected);
        }
    }

    #[test]
    fn test_discount_never_exceeds_subtotal_or_goes_negative() {
        let over = promo("OVER", DiscountType::Percent, 150);
        assert_eq!(discount_for(&over, Decimal::new(80, 0)), Decimal::new(80, 0));
        let negative = promo("NEG", DiscountType::Fixed, -10);
        assert_eq!(discount_for(&negative, Decimal::new(80, 0)), Decimal::ZERO);
    }

    #[test]
    fn test_percent_discount_is_rounded_to_cents() {
        let p = promo("THIRD", DiscountType::Percent, 33);
        assert_eq!(discount_for(&p, Decimal::new(1001, 2)), Decimal::new(330, 2));
    }

    #[test]
    fn test_exhausted_promo_rejected() {
        let mut p = promo("ONCE", DiscountType::Fixed, 100);
        p.usage_limit = Some(1);
        assert!(validate_promo(&p, Decimal::new(1000, 0), Utc::now()).is_ok());
        p.used_count = 1;
        let err = validate_promo(&p, Decimal::new(1000, 0), Utc::now()).unwrap_err();
        assert!(matches!(err, EcommerceError::InvalidPromoCode(_)));
    }

    #[test]
    fn test_validity_window() {
        let now = Utc::now();
        let mut p = promo("WINDOW", DiscountType::Fixed, 100);
        p.valid_from = Some(now + Duration::days(1));
        assert!(validate_promo(&p, Decimal::new(1000, 0), now).is_err());
        p.valid_from = Some(now - Duration::days(2));
        p.valid_until = Some(now - Duration::days(1));
        assert!(validate_promo(&p, Decimal::new(1000, 0), now).is_err());
        p.valid_until = Some(now + Duration::days(1));
        assert!(validate_promo(&p, Decimal::new(1000, 0), now).is_ok());
    }

    #[test]
    fn test_minimum_purchase_amount() {
        let mut p = promo("MIN", DiscountType::Fixed, 100);
        p.min_purchase_amount = Some(Decimal::new(1500, 0));
        assert!(compute_order_totals(&[line(1000, 1)], Some(&p), None, Utc::now()).is_err());
        assert!(compute_order_totals(&[line(1500, 1)], Some(&p), None, Utc::now()).is_ok());
    }

    #[test]
    fn test_inactive_promo_rejected() {
        let mut p = promo("OFF", DiscountType::Fixed, 100);
        p.is_active = false;
        assert!(validate_promo(&p, Decimal::new(1000, 0), Utc::now()).is_err());
    }

    #[test]
    fn test_free_shipping_compares_undiscounted_subtotal() {
        let mut method = courier(300);
        method.free_shipping_threshold = Some(Decimal::new(2000, 0));
        let save10 = promo("SAVE10", DiscountType::Percent, 10);
        let totals = compute_order_totals(&[line(1000, 2)], Some(&save10), Some(&method), Utc::now()).unwrap();
        assert_eq!(totals.shipping_cost, Decimal::ZERO);
        assert_eq!(totals.total, Decimal::new(1800, 0));
    }
}
