//! Checkout and the order lifecycle.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::notify_later;
use crate::domain::aggregates::{Order, OrderItem, OrderStatus, PaymentMethod, Product};
use crate::domain::value_objects::PromoCodeKey;
use crate::integrations::{Notifier, PaymentGateway, PaymentSession};
use crate::pricing::{compute_order_totals, PricedLine};
use crate::storage::{OrderDraft, StatusChange, Store};
use crate::{EcommerceError, Result};

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    pub shipping_method_id: Uuid,
    #[validate(length(min = 1, max = 500))]
    pub shipping_address: String,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    pub promo_code: Option<String>,
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
    /// Total the client displayed. Advisory only.
    pub expected_total: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResult {
    pub order: Order,
    /// Absent for cash orders and when the provider could not be reached;
    /// the buyer can retry through `/orders/:id/pay`.
    pub payment: Option<PaymentSession>,
    pub price_changed: bool,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
    payments: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    reservation_ttl: chrono::Duration,
}

fn order_line(order_id: Uuid, product: &Product, variant_id: Option<Uuid>, quantity: u32) -> Result<OrderItem> {
    product.ensure_purchasable()?;
    let product_name = match variant_id {
        Some(id) => format!("{} ({})", product.name, product.variant(id)?.name),
        None => product.name.clone(),
    };
    Ok(OrderItem {
        id: Uuid::now_v7(),
        order_id,
        product_id: product.id,
        variant_id,
        product_name,
        quantity,
        unit_price: product.unit_price(variant_id)?,
    })
}

impl OrderService {
    pub fn new(
        store: Arc<dyn Store>,
        payments: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        reservation_ttl: chrono::Duration,
    ) -> Self {
        Self { store, payments, notifier, reservation_ttl }
    }

    /// Turns the buyer's cart into a PENDING order with reserved stock.
    pub async fn create_order(&self, user_id: Uuid, req: CheckoutRequest) -> Result<CheckoutResult> {
        req.validate()?;
        let cart = self.store.cart_items(user_id).await?;
        if cart.is_empty() {
            return Err(EcommerceError::validation("cart is empty"));
        }

        let order_id = Uuid::now_v7();
        let ids: Vec<Uuid> = cart.iter().map(|i| i.product_id).collect();
        let products = self.store.get_products(&ids).await?;
        let items = cart
            .iter()
            .map(|item| {
                let product = products.iter().find(|p| p.id == item.product_id).ok_or(EcommerceError::NotFound("Product"))?;
                order_line(order_id, product, item.variant_id, item.quantity)
            })
            .collect::<Result<Vec<_>>>()?;

        let shipping = self
            .store
            .get_shipping_method(req.shipping_method_id)
            .await?
            .filter(|m| m.is_active)
            .ok_or(EcommerceError::NotFound("Shipping method"))?;

        let promo = match req.promo_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => {
                let key = PromoCodeKey::new(code)?;
                let found = self.store.find_promo(&key).await?;
                Some(found.ok_or_else(|| EcommerceError::InvalidPromoCode(format!("{}: unknown code", key)))?)
            }
            None => None,
        };

        let now = Utc::now();
        let lines: Vec<PricedLine> = items.iter().map(|i| PricedLine { unit_price: i.unit_price, quantity: i.quantity }).collect();
        let totals = compute_order_totals(&lines, promo.as_ref(), Some(&shipping), now)?;

        let price_changed = req.expected_total.is_some_and(|expected| expected != totals.total);
        if price_changed {
            tracing::warn!(%user_id, expected = ?req.expected_total, actual = %totals.total, "Client total differs from computed total");
        }

        let draft = OrderDraft {
            id: order_id,
            user_id,
            items,
            totals,
            promo_code_id: promo.as_ref().map(|p| p.id),
            payment_method: req.payment_method,
            shipping_method_id: shipping.id,
            shipping_address: req.shipping_address,
            comment: req.comment,
            cart_items: cart,
            reservation_expires_at: now + self.reservation_ttl,
            created_at: now,
        };
        let mut order = self.store.place_order(draft).await?;
        tracing::info!(order_id = %order.id, %user_id, total = %order.total, "Order placed");

        let payment = if order.payment_method.is_online() && order.total.is_zero() {
            // Nothing to charge: settle now, a provider payment for 0.00 could never succeed.
            let applied = self.store.apply_payment(order.id, &format!("free-{}", order.id)).await?;
            tracing::info!(order_id = %order.id, "Zero-total order settled without payment");
            order = applied.order;
            None
        } else if order.payment_method.is_online() {
            match self.open_payment(&order).await {
                Ok(session) => {
                    order.payment_id = Some(session.payment_id.clone());
                    Some(session)
                }
                Err(e) => {
                    tracing::warn!(order_id = %order.id, error = %e, "Payment creation failed, order stays pending");
                    None
                }
            }
        } else {
            None
        };

        let placed = order.clone();
        notify_later(&self.notifier, "order_confirmation", move |n| async move { n.send_order_confirmation(&placed).await });
        Ok(CheckoutResult { order, payment, price_changed })
    }

    async fn open_payment(&self, order: &Order) -> Result<PaymentSession> {
        let description = format!("Order {}", order.id);
        let session = self.payments.create_payment(order.total, order.id, order.user_id, &description).await?;
        self.store.set_payment_id(order.id, &session.payment_id).await?;
        Ok(session)
    }

    /// (Re)creates the provider payment for an unpaid card order.
    pub async fn start_payment(&self, user_id: Uuid, order_id: Uuid) -> Result<PaymentSession> {
        let order = self.get(user_id, false, order_id).await?;
        if order.status != OrderStatus::Pending {
            return Err(EcommerceError::conflict(format!("order is {}", order.status)));
        }
        if !order.payment_method.is_online() {
            return Err(EcommerceError::conflict("order is paid on delivery"));
        }
        if order.total.is_zero() {
            return Err(EcommerceError::conflict("order has nothing to pay"));
        }
        self.open_payment(&order).await
    }

    /// Buyers only see their own orders; others read as missing.
    pub async fn get(&self, user_id: Uuid, is_admin: bool, order_id: Uuid) -> Result<Order> {
        let order = self.store.get_order(order_id).await?.ok_or(EcommerceError::NotFound("Order"))?;
        if !is_admin && order.user_id != user_id {
            return Err(EcommerceError::NotFound("Order"));
        }
        Ok(order)
    }

    pub async fn list_for(&self, user_id: Uuid) -> Result<Vec<Order>> {
        self.store.list_orders(Some(user_id)).await
    }

    pub async fn list_all(&self) -> Result<Vec<Order>> {
        self.store.list_orders(None).await
    }

    /// Buyer cancellation of an unpaid order.
    pub async fn cancel(&self, user_id: Uuid, order_id: Uuid) -> Result<Order> {
        self.get(user_id, false, order_id).await?;
        let change = self.store.change_order_status(order_id, OrderStatus::Cancelled, Some(OrderStatus::Pending)).await?;
        Ok(self.after_change(change))
    }

    /// Admin status change. Card orders leave PENDING only through a
    /// confirmed payment.
    pub async fn set_status(&self, order_id: Uuid, to: OrderStatus) -> Result<Order> {
        if to == OrderStatus::Processing {
            let order = self.store.get_order(order_id).await?.ok_or(EcommerceError::NotFound("Order"))?;
            if order.status == OrderStatus::Pending && order.payment_method.is_online() {
                return Err(EcommerceError::conflict("card orders move to PROCESSING when the payment succeeds"));
            }
        }
        let change = self.store.change_order_status(order_id, to, None).await?;
        Ok(self.after_change(change))
    }

    fn after_change(&self, change: StatusChange) -> Order {
        if change.changed() {
            tracing::info!(order_id = %change.order.id, from = %change.from, to = %change.order.status, "Order status changed");
            let order = change.order.clone();
            let from = change.from;
            notify_later(&self.notifier, "status_update", move |n| async move { n.send_status_update(&order, from).await });
        }
        change.order
    }
}
