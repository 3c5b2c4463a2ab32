//! PostgreSQL store tests against a throwaway container.
//!
//! Run with: cargo test --test storage_postgres --features postgres-tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{checkout, payment_succeeded, Harness, WEBHOOK_TOKEN};
use opensase_storefront::domain::aggregates::{DiscountType, OrderStatus, PaymentMethod, ReservationStatus};
use opensase_storefront::domain::value_objects::{PromoCodeKey, Quantity};
use opensase_storefront::storage::{NewPromoCode, PgStore, Store};
use opensase_storefront::EcommerceError;
use rust_decimal::Decimal;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};
use uuid::Uuid;

async fn start_postgres() -> (ContainerAsync<GenericImage>, String) {
    let container = GenericImage::new("postgres", "16")
        .with_exposed_port(5432.tcp())
        .with_wait_for(WaitFor::message_on_stdout("database system is ready to accept connections"))
        .with_env_var("POSTGRES_USER", "storefront")
        .with_env_var("POSTGRES_PASSWORD", "storefront")
        .with_env_var("POSTGRES_DB", "storefront")
        .with_startup_timeout(Duration::from_secs(60))
        .start()
        .await
        .expect("Failed to start postgres container");

    // The ready message is printed once before the final restart.
    tokio::time::sleep(Duration::from_secs(1)).await;

    let port = container.get_host_port_ipv4(5432).await.expect("Failed to get mapped port");
    let host = container.get_host().await.expect("Failed to get container host");
    (container, format!("postgres://storefront:storefront@{}:{}/storefront", host, port))
}

async fn pg_harness(ttl: chrono::Duration) -> (ContainerAsync<GenericImage>, Harness) {
    let (container, url) = start_postgres().await;
    let store = PgStore::connect(&url).await.expect("Failed to connect to PostgreSQL");
    store.migrate().await.expect("Failed to run migrations");
    (container, Harness::with_store(Arc::new(store), ttl))
}

fn thirty_minutes() -> chrono::Duration {
    chrono::Duration::minutes(30)
}

#[tokio::test]
async fn test_postgres_concurrent_confirm_decrements_once() {
    let (_container, h) = pg_harness(thirty_minutes()).await;
    let user = Uuid::now_v7();
    let product = h.product(1000, 10).await;
    let shipping = h.shipping(300).await;
    h.add_to_cart(user, product.id, 3).await;
    let order = h.orders().create_order(user, checkout(&shipping, None, PaymentMethod::Card)).await.unwrap().order;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let store = h.store.clone();
            tokio::spawn(async move { store.confirm(order.id).await.unwrap().confirmed })
        })
        .collect();
    let mut confirmed = 0;
    for task in tasks {
        confirmed += task.await.unwrap();
    }

    assert_eq!(confirmed, 1);
    assert_eq!(h.stock(product.id).await, 7);
}

#[tokio::test]
async fn test_postgres_duplicate_webhook_pays_once() {
    let (_container, h) = pg_harness(thirty_minutes()).await;
    let user = Uuid::now_v7();
    let product = h.product(1000, 10).await;
    let shipping = h.shipping(300).await;
    h.add_to_cart(user, product.id, 2).await;
    let order = h.orders().create_order(user, checkout(&shipping, None, PaymentMethod::Card)).await.unwrap().order;

    let body = payment_succeeded(order.id);
    h.webhook().handle(Some(WEBHOOK_TOKEN), &body).await.unwrap();
    h.webhook().handle(Some(WEBHOOK_TOKEN), &body).await.unwrap();

    assert_eq!(h.stock(product.id).await, 8);
    let stored = h.store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Processing);
    assert_eq!(stored.items.len(), 1);
}

#[tokio::test]
async fn test_postgres_promo_limit_boundary() {
    let (_container, h) = pg_harness(thirty_minutes()).await;
    let product = h.product(1000, 10).await;
    let shipping = h.shipping(300).await;
    h.promo("SAVE10", DiscountType::Percent, 10, Some(2)).await;

    for _ in 0..2 {
        let user = Uuid::now_v7();
        h.add_to_cart(user, product.id, 1).await;
        h.orders().create_order(user, checkout(&shipping, Some("save10"), PaymentMethod::Cash)).await.unwrap();
    }
    assert_eq!(h.promo_by_code("SAVE10").await.used_count, 2);

    let late = Uuid::now_v7();
    h.add_to_cart(late, product.id, 1).await;
    let err = h.orders().create_order(late, checkout(&shipping, Some("SAVE10"), PaymentMethod::Cash)).await.unwrap_err();
    assert!(matches!(err, EcommerceError::InvalidPromoCode(_)));
    assert_eq!(h.promo_by_code("SAVE10").await.used_count, 2);
    assert_eq!(h.store.cart_items(late).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_postgres_concurrent_redemption_respects_limit() {
    let (_container, h) = pg_harness(thirty_minutes()).await;
    let product = h.product(1000, 50).await;
    let shipping = h.shipping(300).await;
    h.promo("ONCE", DiscountType::Fixed, 100, Some(1)).await;

    let mut buyers = Vec::new();
    for _ in 0..6 {
        let user = Uuid::now_v7();
        h.add_to_cart(user, product.id, 1).await;
        buyers.push(user);
    }
    let tasks: Vec<_> = buyers
        .into_iter()
        .map(|user| {
            let orders = h.orders();
            let req = checkout(&shipping, Some("ONCE"), PaymentMethod::Cash);
            tokio::spawn(async move { orders.create_order(user, req).await })
        })
        .collect();
    let mut placed = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => placed += 1,
            Err(EcommerceError::InvalidPromoCode(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(placed, 1);
    assert_eq!(h.promo_by_code("ONCE").await.used_count, 1);
}

#[tokio::test]
async fn test_postgres_insufficient_stock_rolls_back_everything() {
    let (_container, h) = pg_harness(thirty_minutes()).await;
    let product = h.product(1000, 1).await;
    let shipping = h.shipping(300).await;
    h.promo("SAVE10", DiscountType::Percent, 10, Some(5)).await;
    let (first, second) = (Uuid::now_v7(), Uuid::now_v7());
    h.add_to_cart(first, product.id, 1).await;
    h.add_to_cart(second, product.id, 1).await;

    h.orders().create_order(first, checkout(&shipping, None, PaymentMethod::Card)).await.unwrap();
    let err = h.orders().create_order(second, checkout(&shipping, Some("SAVE10"), PaymentMethod::Card)).await.unwrap_err();

    assert!(matches!(err, EcommerceError::InsufficientStock { requested: 1, available: 0, .. }));
    assert_eq!(h.promo_by_code("SAVE10").await.used_count, 0);
    assert_eq!(h.store.cart_items(second).await.unwrap().len(), 1);
    assert!(h.store.list_orders(Some(second)).await.unwrap().is_empty());
    assert_eq!(h.stock(product.id).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_postgres_concurrent_checkouts_never_oversell() {
    let (_container, h) = pg_harness(thirty_minutes()).await;
    let product = h.product(1000, 5).await;
    let shipping = h.shipping(300).await;

    let mut buyers = Vec::new();
    for _ in 0..10 {
        let user = Uuid::now_v7();
        h.add_to_cart(user, product.id, 1).await;
        buyers.push(user);
    }
    let tasks: Vec<_> = buyers
        .into_iter()
        .map(|user| {
            let orders = h.orders();
            let req = checkout(&shipping, None, PaymentMethod::Card);
            tokio::spawn(async move { orders.create_order(user, req).await })
        })
        .collect();
    let mut placed = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => placed += 1,
            Err(EcommerceError::InsufficientStock { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(placed, 5);
}

#[tokio::test]
async fn test_postgres_late_payment_after_stock_sold() {
    let (_container, h) = pg_harness(chrono::Duration::seconds(-1)).await;
    let product = h.product(1000, 3).await;
    let shipping = h.shipping(300).await;
    let (first_buyer, second_buyer) = (Uuid::now_v7(), Uuid::now_v7());

    h.add_to_cart(first_buyer, product.id, 3).await;
    let late = h.orders().create_order(first_buyer, checkout(&shipping, None, PaymentMethod::Card)).await.unwrap().order;
    h.add_to_cart(second_buyer, product.id, 3).await;
    let paid = h.orders().create_order(second_buyer, checkout(&shipping, None, PaymentMethod::Card)).await.unwrap().order;
    h.webhook().handle(Some(WEBHOOK_TOKEN), &payment_succeeded(paid.id)).await.unwrap();
    assert_eq!(h.stock(product.id).await, 0);

    let applied = h.store.apply_payment(late.id, "pay-late").await.unwrap();
    assert_eq!(applied.confirmation.confirmed, 0);
    assert_eq!(applied.confirmation.unfulfilled.len(), 1);
    assert_eq!(h.store.reservations_for(late.id).await.unwrap()[0].status, ReservationStatus::Released);

    h.orders().set_status(late.id, OrderStatus::Cancelled).await.unwrap();
    assert_eq!(h.stock(product.id).await, 0);
}

#[tokio::test]
async fn test_postgres_duplicate_promo_code_conflicts() {
    let (_container, h) = pg_harness(thirty_minutes()).await;
    h.promo("SAVE10", DiscountType::Percent, 10, None).await;

    let again = NewPromoCode {
        code: "save10".into(),
        discount_type: DiscountType::Fixed,
        discount_value: Decimal::new(50, 0),
        min_purchase_amount: None,
        max_discount_amount: None,
        usage_limit: None,
        valid_from: None,
        valid_until: None,
    };
    let err = h.store.insert_promo(again, PromoCodeKey::new("save10").unwrap()).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Conflict(_)));
}

#[tokio::test]
async fn test_postgres_cart_merge_is_capped() {
    let (_container, h) = pg_harness(thirty_minutes()).await;
    let user = Uuid::now_v7();
    let product = h.product(1000, 10).await;

    let store = &h.store;
    store.add_cart_item(user, product.id, None, Quantity::new(Quantity::MAX - 1).unwrap()).await.unwrap();
    let merged = store.add_cart_item(user, product.id, None, Quantity::new(5).unwrap()).await.unwrap();

    assert_eq!(merged.quantity, Quantity::MAX);
    assert_eq!(store.cart_items(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_postgres_items_added_during_checkout_stay_in_cart() {
    let (_container, h) = pg_harness(thirty_minutes()).await;
    let user = Uuid::now_v7();
    let mug = h.product(1000, 10).await;
    let shipping = h.shipping(300).await;
    h.add_to_cart(user, mug.id, 2).await;
    let priced = h.store.cart_items(user).await.unwrap();

    let plate = h.product(500, 10).await;
    h.add_to_cart(user, plate.id, 1).await;
    h.add_to_cart(user, mug.id, 1).await;
    h.store.place_order(common::draft(user, priced, &[mug.clone()], &shipping)).await.unwrap();

    let left = h.store.cart_items(user).await.unwrap();
    assert_eq!(left.len(), 2);
    assert_eq!(left.iter().find(|i| i.product_id == mug.id).unwrap().quantity, 1);
}
