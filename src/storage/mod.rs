//! Persistence.
//!
//! [`Store`] is the only shared mutable state in the service. Every method
//! is atomic: on PostgreSQL it runs in a single transaction, on the
//! in-memory store inside one critical section. Multi-entity operations
//! (order placement, payment application, cancellation) are exposed as
//! single methods so no caller can observe a half-applied change.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::aggregates::{
    CartItem, Order, OrderReturn, OrderStatus, Product, ProductReservation, PromoCode, RefundStatus,
    ReservationLine, ReturnStatus, Review, ShippingMethod, WishlistItem,
};
use crate::domain::value_objects::{PromoCodeKey, Quantity};
use crate::Result;

pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::MemoryStore;
pub use models::{
    Confirmation, NewProduct, NewPromoCode, NewReturn, NewReview, NewShippingMethod, NewVariant, OrderDraft, PaymentApplied,
    ProductFilter, ProductPatch, StatusChange,
};
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    // --- catalog -----------------------------------------------------------
    async fn list_products(&self, filter: &ProductFilter) -> Result<(Vec<Product>, u64)>;
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>>;
    async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<Product>>;
    async fn insert_product(&self, product: NewProduct) -> Result<Product>;
    async fn update_product(&self, id: Uuid, patch: ProductPatch) -> Result<Option<Product>>;
    /// Soft delete; past orders keep referencing the product.
    async fn deactivate_product(&self, id: Uuid) -> Result<bool>;

    async fn list_shipping_methods(&self, include_inactive: bool) -> Result<Vec<ShippingMethod>>;
    async fn get_shipping_method(&self, id: Uuid) -> Result<Option<ShippingMethod>>;
    async fn insert_shipping_method(&self, method: NewShippingMethod) -> Result<ShippingMethod>;

    // --- promo codes -------------------------------------------------------
    async fn find_promo(&self, code: &PromoCodeKey) -> Result<Option<PromoCode>>;
    async fn list_promos(&self) -> Result<Vec<PromoCode>>;
    /// Fails with `Conflict` when the code already exists (case-insensitive).
    async fn insert_promo(&self, promo: NewPromoCode, code: PromoCodeKey) -> Result<PromoCode>;

    // --- cart --------------------------------------------------------------
    async fn cart_items(&self, user_id: Uuid) -> Result<Vec<CartItem>>;
    async fn add_cart_item(&self, user_id: Uuid, product_id: Uuid, variant_id: Option<Uuid>, quantity: Quantity) -> Result<CartItem>;
    async fn set_cart_quantity(&self, user_id: Uuid, item_id: Uuid, quantity: Quantity) -> Result<Option<CartItem>>;
    async fn remove_cart_item(&self, user_id: Uuid, item_id: Uuid) -> Result<bool>;
    async fn clear_cart(&self, user_id: Uuid) -> Result<()>;

    // --- orders ------------------------------------------------------------
    /// Redeems the promo code (guarded increment), inserts the order and its
    /// items, reserves stock and clears the buyer's cart, all or nothing.
    async fn place_order(&self, draft: OrderDraft) -> Result<Order>;
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>>;
    async fn list_orders(&self, user_id: Option<Uuid>) -> Result<Vec<Order>>;
    async fn set_payment_id(&self, order_id: Uuid, payment_id: &str) -> Result<()>;
    /// Confirms the order's reservations and moves a PENDING order to
    /// PROCESSING. Safe to call repeatedly for the same order.
    async fn apply_payment(&self, order_id: Uuid, payment_id: &str) -> Result<PaymentApplied>;
    /// Applies an order status transition. Cancellation releases pending
    /// holds and restocks confirmed ones; moving to PROCESSING confirms
    /// reservations. `only_from` rejects the change unless the order is in
    /// that status.
    async fn change_order_status(&self, order_id: Uuid, to: OrderStatus, only_from: Option<OrderStatus>) -> Result<StatusChange>;

    // --- inventory ---------------------------------------------------------
    async fn reserve(&self, order_id: Uuid, lines: &[ReservationLine], now: DateTime<Utc>, expires_at: DateTime<Utc>) -> Result<Vec<ProductReservation>>;
    /// Turns the order's PENDING and EXPIRED holds into stock decrements.
    /// Holds the current stock no longer covers are RELEASED and reported as
    /// unfulfilled. A repeated call confirms nothing.
    async fn confirm(&self, order_id: Uuid) -> Result<Confirmation>;
    async fn release(&self, order_id: Uuid) -> Result<u32>;
    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u32>;
    async fn reservations_for(&self, order_id: Uuid) -> Result<Vec<ProductReservation>>;

    // --- returns -----------------------------------------------------------
    async fn create_return(&self, request: NewReturn) -> Result<OrderReturn>;
    async fn get_return(&self, id: Uuid) -> Result<Option<OrderReturn>>;
    async fn list_returns(&self, user_id: Option<Uuid>) -> Result<Vec<OrderReturn>>;
    async fn set_return_status(&self, id: Uuid, to: ReturnStatus, admin_comment: Option<String>) -> Result<OrderReturn>;
    async fn set_refund_status(&self, id: Uuid, to: RefundStatus) -> Result<OrderReturn>;

    // --- reviews & wishlists -----------------------------------------------
    async fn insert_review(&self, review: NewReview) -> Result<Review>;
    async fn list_reviews(&self, product_id: Uuid) -> Result<Vec<Review>>;
    async fn delete_review(&self, id: Uuid) -> Result<bool>;
    async fn add_to_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<WishlistItem>;
    async fn remove_from_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<bool>;
    async fn wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistItem>>;
}

/// Picks PostgreSQL when `DATABASE_URL` is set, otherwise an in-memory store.
pub async fn init_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url).await?;
            store.migrate().await?;
            tracing::info!("Storage: postgres");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
