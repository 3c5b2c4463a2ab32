mod common;

use common::Harness;
use opensase_storefront::domain::aggregates::{ReservationLine, ReservationStatus};
use opensase_storefront::EcommerceError;
use uuid::Uuid;

fn line(product_id: Uuid, quantity: u32) -> Vec<ReservationLine> {
    vec![ReservationLine { product_id, variant_id: None, quantity }]
}

#[tokio::test]
async fn test_reserve_more_than_stock_fails() {
    let h = Harness::new();
    let product = h.product(500, 3).await;
    let order_id = Uuid::now_v7();

    let err = h.state.inventory().reserve(order_id, &line(product.id, 5)).await.unwrap_err();
    match err {
        EcommerceError::InsufficientStock { requested, available, .. } => {
            assert_eq!(requested, 5);
            assert_eq!(available, 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.stock(product.id).await, 3);
    assert!(h.store.reservations_for(order_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reserve_leaves_stock_until_confirmed() {
    let h = Harness::new();
    let product = h.product(500, 10).await;
    let order_id = Uuid::now_v7();
    let inventory = h.state.inventory();

    let held = inventory.reserve(order_id, &line(product.id, 4)).await.unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].status, ReservationStatus::Pending);
    assert_eq!(h.stock(product.id).await, 10);

    assert_eq!(inventory.confirm(order_id).await.unwrap().confirmed, 1);
    assert_eq!(h.stock(product.id).await, 6);
    assert_eq!(inventory.confirm(order_id).await.unwrap().confirmed, 0);
    assert_eq!(h.stock(product.id).await, 6);
}

#[tokio::test]
async fn test_release_frees_hold_without_touching_stock() {
    let h = Harness::new();
    let product = h.product(500, 5).await;
    let inventory = h.state.inventory();
    let first = Uuid::now_v7();

    inventory.reserve(first, &line(product.id, 5)).await.unwrap();
    assert!(inventory.reserve(Uuid::now_v7(), &line(product.id, 1)).await.is_err());

    assert_eq!(inventory.release(first).await.unwrap(), 1);
    assert_eq!(h.stock(product.id).await, 5);
    assert_eq!(inventory.confirm(first).await.unwrap().confirmed, 0);
    inventory.reserve(Uuid::now_v7(), &line(product.id, 5)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_confirm_decrements_once() {
    let h = Harness::new();
    let product = h.product(500, 10).await;
    let order_id = Uuid::now_v7();
    h.state.inventory().reserve(order_id, &line(product.id, 3)).await.unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let inventory = h.state.inventory();
            tokio::spawn(async move { inventory.confirm(order_id).await.unwrap().confirmed })
        })
        .collect();
    let mut total = 0;
    for task in tasks {
        total += task.await.unwrap();
    }

    assert_eq!(total, 1);
    assert_eq!(h.stock(product.id).await, 7);
}

#[tokio::test]
async fn test_lapsed_holds_are_swept_and_free_stock() {
    let h = Harness::with_ttl(chrono::Duration::seconds(-1));
    let product = h.product(500, 2).await;
    let inventory = h.state.inventory();
    let order_id = Uuid::now_v7();

    inventory.reserve(order_id, &line(product.id, 2)).await.unwrap();
    assert_eq!(inventory.sweep().await.unwrap(), 1);
    let held = h.store.reservations_for(order_id).await.unwrap();
    assert_eq!(held[0].status, ReservationStatus::Expired);

    inventory.reserve(Uuid::now_v7(), &line(product.id, 2)).await.unwrap();
}
