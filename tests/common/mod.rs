#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use opensase_storefront::api::AppState;
use opensase_storefront::config::Config;
use chrono::Utc;
use opensase_storefront::domain::aggregates::{CartItem, OrderItem, Product, PromoCode, ShippingMethod};
use opensase_storefront::domain::events::OrderEvent;
use opensase_storefront::domain::value_objects::{PromoCodeKey, Quantity};
use opensase_storefront::integrations::{Notifier, PaymentGateway, StubPaymentGateway};
use opensase_storefront::services::{AddToCart, CartService, CheckoutRequest, OrderService, WebhookService};
use opensase_storefront::pricing::OrderTotals;
use opensase_storefront::storage::{MemoryStore, NewProduct, NewPromoCode, NewShippingMethod, OrderDraft, Store};
use opensase_storefront::domain::aggregates::{DiscountType, PaymentMethod};
use rust_decimal::Decimal;
use uuid::Uuid;

pub const WEBHOOK_TOKEN: &str = "test-webhook-token";

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<OrderEvent>>,
}

impl RecordingNotifier {
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.kind()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &OrderEvent) -> opensase_storefront::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<dyn Store>,
    pub notifier: Arc<RecordingNotifier>,
    pub state: AppState,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_ttl(chrono::Duration::minutes(30))
    }

    pub fn with_ttl(ttl: chrono::Duration) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), ttl)
    }

    pub fn with_store(store: Arc<dyn Store>, ttl: chrono::Duration) -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        let payments: Arc<dyn PaymentGateway> = Arc::new(StubPaymentGateway);
        let config = Config { reservation_ttl: ttl, webhook_token: Some(WEBHOOK_TOKEN.to_string()), ..Config::default() };
        let state = AppState::new(store.clone(), payments, notifier.clone(), config);
        Self { store, notifier, state }
    }

    pub fn orders(&self) -> OrderService { self.state.orders() }
    pub fn cart(&self) -> CartService { self.state.cart() }
    pub fn webhook(&self) -> WebhookService { self.state.webhook() }

    pub async fn product(&self, price: i64, stock: u32) -> Product {
        self.store
            .insert_product(NewProduct {
                name: format!("Product {}", price),
                description: "Test product".into(),
                price: Decimal::new(price, 0),
                original_price: None,
                discount_percent: 0,
                category: Some("test".into()),
                stock,
                image_url: None,
                variants: vec![],
            })
            .await
            .unwrap()
    }

    pub async fn shipping(&self, price: i64) -> ShippingMethod {
        self.store
            .insert_shipping_method(NewShippingMethod { name: "Courier".into(), base_price: Decimal::new(price, 0), free_shipping_threshold: None })
            .await
            .unwrap()
    }

    pub async fn promo(&self, code: &str, discount_type: DiscountType, value: i64, usage_limit: Option<u32>) -> PromoCode {
        let new = NewPromoCode {
            code: code.into(),
            discount_type,
            discount_value: Decimal::new(value, 0),
            min_purchase_amount: None,
            max_discount_amount: None,
            usage_limit,
            valid_from: None,
            valid_until: None,
        };
        self.store.insert_promo(new, PromoCodeKey::new(code).unwrap()).await.unwrap()
    }

    pub async fn promo_by_code(&self, code: &str) -> PromoCode {
        self.store.find_promo(&PromoCodeKey::new(code).unwrap()).await.unwrap().unwrap()
    }

    pub async fn add_to_cart(&self, user_id: Uuid, product_id: Uuid, quantity: u32) {
        self.cart()
            .add(user_id, AddToCart { product_id, variant_id: None, quantity: Quantity::new(quantity).unwrap() })
            .await
            .unwrap();
    }

    pub async fn stock(&self, product_id: Uuid) -> u32 {
        self.store.get_product(product_id).await.unwrap().unwrap().stock
    }
}

pub fn checkout(shipping: &ShippingMethod, promo: Option<&str>, payment_method: PaymentMethod) -> CheckoutRequest {
    CheckoutRequest {
        shipping_method_id: shipping.id,
        shipping_address: "1 Main Street".into(),
        payment_method,
        promo_code: promo.map(str::to_string),
        comment: None,
        expected_total: None,
    }
}

pub fn payment_succeeded(order_id: Uuid) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "event": "payment.succeeded",
        "object": { "id": format!("pay-{}", order_id), "metadata": { "orderId": order_id.to_string() } }
    }))
    .unwrap()
}

/// Prices `cart` at catalog prices into a cash order draft, as checkout does.
pub fn draft(user_id: Uuid, cart: Vec<CartItem>, products: &[Product], shipping: &ShippingMethod) -> OrderDraft {
    let id = Uuid::now_v7();
    let items: Vec<OrderItem> = cart
        .iter()
        .map(|line| {
            let product = products.iter().find(|p| p.id == line.product_id).unwrap();
            OrderItem {
                id: Uuid::now_v7(),
                order_id: id,
                product_id: product.id,
                variant_id: None,
                product_name: product.name.clone(),
                quantity: line.quantity,
                unit_price: product.price,
            }
        })
        .collect();
    let subtotal: Decimal = items.iter().map(|i| i.unit_price * Decimal::from(i.quantity)).sum();
    let now = Utc::now();
    OrderDraft {
        id,
        user_id,
        items,
        totals: OrderTotals {
            subtotal,
            discount_amount: Decimal::ZERO,
            shipping_cost: shipping.base_price,
            total: subtotal + shipping.base_price,
        },
        promo_code_id: None,
        payment_method: PaymentMethod::Cash,
        shipping_method_id: shipping.id,
        shipping_address: "1 Main Street".into(),
        comment: None,
        cart_items: cart,
        reservation_expires_at: now + chrono::Duration::minutes(30),
        created_at: now,
    }
}

/// Lets background notification tasks run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
