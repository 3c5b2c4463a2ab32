//! In-memory [`Store`] used for tests and for running without a database.
//!
//! Writes run against a copy of the state which replaces the original only
//! when the whole operation succeeds, so a failed write leaves nothing behind.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::{group_lines, Confirmation, NewProduct, NewPromoCode, NewReturn, NewReview, NewShippingMethod, OrderDraft, PaymentApplied, ProductFilter, ProductPatch, StatusChange};
use super::Store;
use crate::domain::aggregates::cart::merge_into;
use crate::domain::aggregates::{
    CartItem, Order, OrderReturn, OrderStatus, Product, ProductReservation, ProductVariant, PromoCode, RefundStatus,
    ReservationLine, ReservationStatus, ReturnStatus, Review, ShippingMethod, WishlistItem,
};
use crate::domain::value_objects::{PromoCodeKey, Quantity};
use crate::{EcommerceError, Result};

#[derive(Clone, Default)]
struct State {
    products: BTreeMap<Uuid, Product>,
    shipping: BTreeMap<Uuid, ShippingMethod>,
    promos: BTreeMap<Uuid, PromoCode>,
    cart: Vec<CartItem>,
    orders: BTreeMap<Uuid, Order>,
    reservations: Vec<ProductReservation>,
    returns: BTreeMap<Uuid, OrderReturn>,
    reviews: BTreeMap<Uuid, Review>,
    wishlist: Vec<WishlistItem>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn write<T>(&self, op: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        let out = op(&mut next)?;
        *guard = next;
        Ok(out)
    }
}

impl State {
    fn expire(&mut self, now: DateTime<Utc>) -> u32 {
        let mut expired = 0;
        for r in self.reservations.iter_mut().filter(|r| r.is_stale(now)) {
            r.status = ReservationStatus::Expired;
            expired += 1;
        }
        expired
    }

    fn adjust_stock(&mut self, product_id: Uuid, variant_id: Option<Uuid>, delta: i64) -> Result<()> {
        let product = self.products.get_mut(&product_id).ok_or(EcommerceError::NotFound("Product"))?;
        let stock = match variant_id {
            Some(id) => &mut product.variants.iter_mut().find(|v| v.id == id).ok_or(EcommerceError::NotFound("Product variant"))?.stock,
            None => &mut product.stock,
        };
        let next = i64::from(*stock) + delta;
        if next < 0 {
            return Err(EcommerceError::conflict(format!("stock of product {} cannot go below zero", product_id)));
        }
        *stock = u32::try_from(next).unwrap_or(u32::MAX);
        product.updated_at = Utc::now();
        Ok(())
    }

    fn reserve(&mut self, order_id: Uuid, lines: &[ReservationLine], now: DateTime<Utc>, expires_at: DateTime<Utc>) -> Result<Vec<ProductReservation>> {
        self.expire(now);
        let grouped = group_lines(lines);
        for line in &grouped {
            let product = self.products.get(&line.product_id).ok_or(EcommerceError::NotFound("Product"))?;
            let stock = product.stock_of(line.variant_id)?;
            let held: u32 = self
                .reservations
                .iter()
                .filter(|r| r.holds_stock(now) && r.same_stock(line.product_id, line.variant_id))
                .map(|r| r.quantity)
                .sum();
            let available = stock.saturating_sub(held);
            if line.quantity > available {
                return Err(EcommerceError::InsufficientStock {
                    product_id: line.product_id,
                    variant_id: line.variant_id,
                    requested: line.quantity,
                    available,
                });
            }
        }
        let created: Vec<ProductReservation> = grouped
            .into_iter()
            .map(|line| ProductReservation {
                id: Uuid::now_v7(),
                order_id,
                product_id: line.product_id,
                variant_id: line.variant_id,
                quantity: line.quantity,
                status: ReservationStatus::Pending,
                expires_at,
                created_at: now,
            })
            .collect();
        self.reservations.extend(created.iter().cloned());
        Ok(created)
    }

    fn confirm(&mut self, order_id: Uuid, now: DateTime<Utc>) -> Result<Confirmation> {
        let confirmable: Vec<usize> = self
            .reservations
            .iter()
            .enumerate()
            .filter(|(_, r)| r.order_id == order_id && r.is_confirmable())
            .map(|(i, _)| i)
            .collect();
        let mut outcome = Confirmation::default();
        for index in confirmable {
            let hold = self.reservations[index].clone();
            let stock = self
                .products
                .get(&hold.product_id)
                .ok_or(EcommerceError::NotFound("Product"))?
                .stock_of(hold.variant_id)?;
            let held_by_others: u32 = self
                .reservations
                .iter()
                .filter(|r| r.order_id != order_id && r.holds_stock(now) && r.same_stock(hold.product_id, hold.variant_id))
                .map(|r| r.quantity)
                .sum();
            if hold.is_covered(stock, held_by_others, now) {
                self.adjust_stock(hold.product_id, hold.variant_id, -i64::from(hold.quantity))?;
                self.reservations[index].status = ReservationStatus::Confirmed;
                outcome.confirmed += 1;
            } else {
                tracing::warn!(%order_id, product_id = %hold.product_id, quantity = hold.quantity, stock, "stock gone before payment, hold released");
                self.reservations[index].status = ReservationStatus::Released;
                outcome.unfulfilled.push(hold.line());
            }
        }
        Ok(outcome)
    }

    fn release(&mut self, order_id: Uuid) -> u32 {
        let mut released = 0;
        for r in self.reservations.iter_mut().filter(|r| r.order_id == order_id && r.status == ReservationStatus::Pending) {
            r.status = ReservationStatus::Released;
            released += 1;
        }
        released
    }

    fn restock(&mut self, order_id: Uuid) -> Result<u32> {
        let confirmed: Vec<(usize, Uuid, Option<Uuid>, u32)> = self
            .reservations
            .iter()
            .enumerate()
            .filter(|(_, r)| r.order_id == order_id && r.status == ReservationStatus::Confirmed)
            .map(|(i, r)| (i, r.product_id, r.variant_id, r.quantity))
            .collect();
        for (index, product_id, variant_id, quantity) in &confirmed {
            self.adjust_stock(*product_id, *variant_id, i64::from(*quantity))?;
            self.reservations[*index].status = ReservationStatus::Released;
        }
        Ok(confirmed.len() as u32)
    }

    fn order_mut(&mut self, id: Uuid) -> Result<&mut Order> {
        self.orders.get_mut(&id).ok_or(EcommerceError::NotFound("Order"))
    }

    fn return_mut(&mut self, id: Uuid) -> Result<&mut OrderReturn> {
        self.returns.get_mut(&id).ok_or(EcommerceError::NotFound("Return"))
    }
}

fn newest_first<T: Clone>(items: impl Iterator<Item = T>, created: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    let mut items: Vec<T> = items.collect();
    items.sort_by_key(|i| std::cmp::Reverse(created(i)));
    items
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_products(&self, filter: &ProductFilter) -> Result<(Vec<Product>, u64)> {
        let state = self.state.read().await;
        let matching = newest_first(
            state.products.values().filter(|p| filter.matches(&p.name, p.category.as_deref(), p.is_active)).cloned(),
            |p| p.created_at,
        );
        let total = matching.len() as u64;
        let page = matching.into_iter().skip(usize::try_from(filter.offset()).unwrap_or(usize::MAX)).take(filter.per_page as usize).collect();
        Ok((page, total))
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        Ok(ids.iter().filter_map(|id| state.products.get(id).cloned()).collect())
    }

    async fn insert_product(&self, new: NewProduct) -> Result<Product> {
        let now = Utc::now();
        let id = Uuid::now_v7();
        let product = Product {
            id,
            name: new.name,
            description: new.description,
            price: new.price,
            original_price: new.original_price,
            discount_percent: new.discount_percent,
            category: new.category,
            stock: new.stock,
            image_url: new.image_url,
            is_active: true,
            variants: new
                .variants
                .into_iter()
                .map(|v| ProductVariant { id: Uuid::now_v7(), product_id: id, name: v.name, price: v.price, stock: v.stock })
                .collect(),
            created_at: now,
            updated_at: now,
        };
        self.write(|s| {
            s.products.insert(id, product.clone());
            Ok(product)
        })
        .await
    }

    async fn update_product(&self, id: Uuid, patch: ProductPatch) -> Result<Option<Product>> {
        self.write(|s| {
            let Some(p) = s.products.get_mut(&id) else { return Ok(None) };
            patch.apply(p);
            Ok(Some(p.clone()))
        })
        .await
    }

    async fn deactivate_product(&self, id: Uuid) -> Result<bool> {
        self.write(|s| {
            Ok(match s.products.get_mut(&id) {
                Some(p) => {
                    p.is_active = false;
                    p.updated_at = Utc::now();
                    true
                }
                None => false,
            })
        })
        .await
    }

    async fn list_shipping_methods(&self, include_inactive: bool) -> Result<Vec<ShippingMethod>> {
        let state = self.state.read().await;
        Ok(state.shipping.values().filter(|m| include_inactive || m.is_active).cloned().collect())
    }

    async fn get_shipping_method(&self, id: Uuid) -> Result<Option<ShippingMethod>> {
        Ok(self.state.read().await.shipping.get(&id).cloned())
    }

    async fn insert_shipping_method(&self, new: NewShippingMethod) -> Result<ShippingMethod> {
        let method = ShippingMethod {
            id: Uuid::now_v7(),
            name: new.name,
            base_price: new.base_price,
            free_shipping_threshold: new.free_shipping_threshold,
            is_active: true,
            created_at: Utc::now(),
        };
        self.write(|s| {
            s.shipping.insert(method.id, method.clone());
            Ok(method)
        })
        .await
    }

    async fn find_promo(&self, code: &PromoCodeKey) -> Result<Option<PromoCode>> {
        Ok(self.state.read().await.promos.values().find(|p| &p.code == code).cloned())
    }

    async fn list_promos(&self) -> Result<Vec<PromoCode>> {
        Ok(newest_first(self.state.read().await.promos.values().cloned(), |p| p.created_at))
    }

    async fn insert_promo(&self, new: NewPromoCode, code: PromoCodeKey) -> Result<PromoCode> {
        let promo = PromoCode {
            id: Uuid::now_v7(),
            code,
            discount_type: new.discount_type,
            discount_value: new.discount_value,
            min_purchase_amount: new.min_purchase_amount,
            max_discount_amount: new.max_discount_amount,
            usage_limit: new.usage_limit,
            used_count: 0,
            valid_from: new.valid_from,
            valid_until: new.valid_until,
            is_active: true,
            created_at: Utc::now(),
        };
        self.write(|s| {
            if s.promos.values().any(|p| p.code == promo.code) {
                return Err(EcommerceError::conflict(format!("promo code {} already exists", promo.code)));
            }
            s.promos.insert(promo.id, promo.clone());
            Ok(promo)
        })
        .await
    }

    async fn cart_items(&self, user_id: Uuid) -> Result<Vec<CartItem>> {
        Ok(self.state.read().await.cart.iter().filter(|i| i.user_id == user_id).cloned().collect())
    }

    async fn add_cart_item(&self, user_id: Uuid, product_id: Uuid, variant_id: Option<Uuid>, quantity: Quantity) -> Result<CartItem> {
        self.write(|s| merge_into(&mut s.cart, user_id, product_id, variant_id, quantity)).await
    }

    async fn set_cart_quantity(&self, user_id: Uuid, item_id: Uuid, quantity: Quantity) -> Result<Option<CartItem>> {
        self.write(|s| {
            Ok(s.cart.iter_mut().find(|i| i.id == item_id && i.user_id == user_id).map(|i| {
                i.quantity = quantity.value();
                i.clone()
            }))
        })
        .await
    }

    async fn remove_cart_item(&self, user_id: Uuid, item_id: Uuid) -> Result<bool> {
        self.write(|s| {
            let before = s.cart.len();
            s.cart.retain(|i| !(i.id == item_id && i.user_id == user_id));
            Ok(s.cart.len() != before)
        })
        .await
    }

    async fn clear_cart(&self, user_id: Uuid) -> Result<()> {
        self.write(|s| {
            s.cart.retain(|i| i.user_id != user_id);
            Ok(())
        })
        .await
    }

    async fn place_order(&self, draft: OrderDraft) -> Result<Order> {
        self.write(|s| {
            if let Some(promo_id) = draft.promo_code_id {
                let promo = s.promos.get_mut(&promo_id).ok_or_else(|| EcommerceError::InvalidPromoCode("no longer exists".into()))?;
                if !promo.is_active || promo.is_exhausted() {
                    return Err(EcommerceError::InvalidPromoCode(format!("{}: usage limit reached", promo.code)));
                }
                promo.used_count += 1;
            }
            let order = draft.to_order();
            s.orders.insert(order.id, order.clone());
            s.reserve(order.id, &draft.reservation_lines(), draft.created_at, draft.reservation_expires_at)?;
            for priced in &draft.cart_items {
                if let Some(item) = s.cart.iter_mut().find(|i| i.id == priced.id && i.user_id == draft.user_id) {
                    item.quantity = item.quantity.saturating_sub(priced.quantity);
                }
            }
            s.cart.retain(|i| i.quantity > 0);
            Ok(order)
        })
        .await
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, user_id: Option<Uuid>) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(newest_first(
            state.orders.values().filter(|o| user_id.map_or(true, |u| o.user_id == u)).cloned(),
            |o| o.created_at,
        ))
    }

    async fn set_payment_id(&self, order_id: Uuid, payment_id: &str) -> Result<()> {
        self.write(|s| {
            let order = s.order_mut(order_id)?;
            order.payment_id = Some(payment_id.to_string());
            order.updated_at = Utc::now();
            Ok(())
        })
        .await
    }

    async fn apply_payment(&self, order_id: Uuid, payment_id: &str) -> Result<PaymentApplied> {
        self.write(|s| {
            let status = s.order_mut(order_id)?.status;
            if status == OrderStatus::Cancelled {
                tracing::warn!(%order_id, payment_id, "payment received for cancelled order");
                let order = s.order_mut(order_id)?.clone();
                return Ok(PaymentApplied { order, transitioned: false, confirmation: Confirmation::default() });
            }
            let confirmation = s.confirm(order_id, Utc::now())?;
            let order = s.order_mut(order_id)?;
            let transitioned = order.status == OrderStatus::Pending;
            if transitioned {
                order.status = OrderStatus::Processing;
                order.payment_id.get_or_insert_with(|| payment_id.to_string());
                order.updated_at = Utc::now();
            }
            Ok(PaymentApplied { order: order.clone(), transitioned, confirmation })
        })
        .await
    }

    async fn change_order_status(&self, order_id: Uuid, to: OrderStatus, only_from: Option<OrderStatus>) -> Result<StatusChange> {
        self.write(|s| {
            let from = s.order_mut(order_id)?.status;
            if only_from.is_some_and(|expected| expected != from) {
                return Err(EcommerceError::conflict(format!("order is {}", from)));
            }
            if from != to {
                if !from.can_transition_to(to) {
                    return Err(EcommerceError::conflict(format!("cannot move order from {} to {}", from, to)));
                }
                match to {
                    OrderStatus::Cancelled => {
                        s.release(order_id);
                        s.restock(order_id)?;
                    }
                    OrderStatus::Processing => {
                        s.confirm(order_id, Utc::now())?;
                    }
                    _ => {}
                }
                let order = s.order_mut(order_id)?;
                order.status = to;
                order.updated_at = Utc::now();
            }
            Ok(StatusChange { order: s.order_mut(order_id)?.clone(), from })
        })
        .await
    }

    async fn reserve(&self, order_id: Uuid, lines: &[ReservationLine], now: DateTime<Utc>, expires_at: DateTime<Utc>) -> Result<Vec<ProductReservation>> {
        self.write(|s| s.reserve(order_id, lines, now, expires_at)).await
    }

    async fn confirm(&self, order_id: Uuid) -> Result<Confirmation> {
        self.write(|s| s.confirm(order_id, Utc::now())).await
    }

    async fn release(&self, order_id: Uuid) -> Result<u32> {
        self.write(|s| Ok(s.release(order_id))).await
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u32> {
        self.write(|s| Ok(s.expire(now))).await
    }

    async fn reservations_for(&self, order_id: Uuid) -> Result<Vec<ProductReservation>> {
        Ok(self.state.read().await.reservations.iter().filter(|r| r.order_id == order_id).cloned().collect())
    }

    async fn create_return(&self, request: NewReturn) -> Result<OrderReturn> {
        self.write(|s| {
            let order = s.orders.get(&request.order_id).ok_or(EcommerceError::NotFound("Order"))?;
            let refund_amount = request.refund_amount.unwrap_or(order.total);
            let open = s.returns.values().filter(|r| r.order_id == order.id && r.is_open()).count();
            OrderReturn::check_request(order, request.user_id, refund_amount, open)?;
            let now = Utc::now();
            let created = OrderReturn {
                id: Uuid::now_v7(),
                order_id: request.order_id,
                user_id: request.user_id,
                reason: request.reason,
                status: ReturnStatus::Pending,
                refund_amount,
                refund_status: RefundStatus::Pending,
                admin_comment: None,
                created_at: now,
                updated_at: now,
            };
            s.returns.insert(created.id, created.clone());
            Ok(created)
        })
        .await
    }

    async fn get_return(&self, id: Uuid) -> Result<Option<OrderReturn>> {
        Ok(self.state.read().await.returns.get(&id).cloned())
    }

    async fn list_returns(&self, user_id: Option<Uuid>) -> Result<Vec<OrderReturn>> {
        let state = self.state.read().await;
        Ok(newest_first(
            state.returns.values().filter(|r| user_id.map_or(true, |u| r.user_id == u)).cloned(),
            |r| r.created_at,
        ))
    }

    async fn set_return_status(&self, id: Uuid, to: ReturnStatus, admin_comment: Option<String>) -> Result<OrderReturn> {
        self.write(|s| {
            let ret = s.return_mut(id)?;
            if ret.status != to && !ret.status.can_transition_to(to) {
                return Err(EcommerceError::conflict(format!("cannot move return from {} to {}", ret.status.as_str(), to.as_str())));
            }
            ret.status = to;
            if admin_comment.is_some() { ret.admin_comment = admin_comment; }
            ret.updated_at = Utc::now();
            Ok(ret.clone())
        })
        .await
    }

    async fn set_refund_status(&self, id: Uuid, to: RefundStatus) -> Result<OrderReturn> {
        self.write(|s| {
            let ret = s.return_mut(id)?;
            if ret.refund_status != to && !ret.refund_status.can_transition_to(to) {
                return Err(EcommerceError::conflict(format!("cannot move refund from {} to {}", ret.refund_status.as_str(), to.as_str())));
            }
            ret.refund_status = to;
            ret.updated_at = Utc::now();
            Ok(ret.clone())
        })
        .await
    }

    async fn insert_review(&self, new: NewReview) -> Result<Review> {
        self.write(|s| {
            if !s.products.contains_key(&new.product_id) { return Err(EcommerceError::NotFound("Product")); }
            if s.reviews.values().any(|r| r.product_id == new.product_id && r.user_id == new.user_id) {
                return Err(EcommerceError::conflict("product already reviewed"));
            }
            let review = Review { id: Uuid::now_v7(), product_id: new.product_id, user_id: new.user_id, rating: new.rating, text: new.text, created_at: Utc::now() };
            s.reviews.insert(review.id, review.clone());
            Ok(review)
        })
        .await
    }

    async fn list_reviews(&self, product_id: Uuid) -> Result<Vec<Review>> {
        let state = self.state.read().await;
        Ok(newest_first(state.reviews.values().filter(|r| r.product_id == product_id).cloned(), |r| r.created_at))
    }

    async fn delete_review(&self, id: Uuid) -> Result<bool> {
        self.write(|s| Ok(s.reviews.remove(&id).is_some())).await
    }

    async fn add_to_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<WishlistItem> {
        self.write(|s| {
            if !s.products.contains_key(&product_id) { return Err(EcommerceError::NotFound("Product")); }
            if let Some(existing) = s.wishlist.iter().find(|w| w.user_id == user_id && w.product_id == product_id) {
                return Ok(existing.clone());
            }
            let item = WishlistItem { user_id, product_id, created_at: Utc::now() };
            s.wishlist.push(item.clone());
            Ok(item)
        })
        .await
    }

    async fn remove_from_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<bool> {
        self.write(|s| {
            let before = s.wishlist.len();
            s.wishlist.retain(|w| !(w.user_id == user_id && w.product_id == product_id));
            Ok(s.wishlist.len() != before)
        })
        .await
    }

    async fn wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistItem>> {
        let state = self.state.read().await;
        Ok(newest_first(state.wishlist.iter().filter(|w| w.user_id == user_id).cloned(), |w| w.created_at))
    }
}
