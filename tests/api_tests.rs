mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{payment_succeeded, Harness, WEBHOOK_TOKEN};
use http_body_util::BodyExt;
use opensase_storefront::api::router;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

async fn send(h: &Harness, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(h.state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    (status, body)
}

fn money(value: &Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}

fn request(method: &str, uri: &str, user: Option<(Uuid, &str)>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((id, role)) = user {
        builder = builder.header("x-user-id", id.to_string()).header("x-user-role", role);
    }
    match body {
        Some(body) => builder.header("content-type", "application/json").body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
async fn test_health() {
    let h = Harness::new();
    let (status, body) = send(&h, request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_cart_requires_identity() {
    let h = Harness::new();
    let (status, body) = send(&h, request("GET", "/api/v1/cart", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let h = Harness::new();
    let user = Some((Uuid::now_v7(), "USER"));
    let (status, body) = send(&h, request("GET", "/api/v1/admin/orders", user, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn test_checkout_over_http() {
    let h = Harness::new();
    let admin = Some((Uuid::now_v7(), "ADMIN"));
    let buyer_id = Uuid::now_v7();
    let buyer = Some((buyer_id, "USER"));

    let (status, product) = send(&h, request("POST", "/api/v1/admin/products", admin, Some(json!({"name": "Mug", "price": "1000", "stock": 10})))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, shipping) = send(&h, request("POST", "/api/v1/admin/shipping-methods", admin, Some(json!({"name": "Courier", "base_price": "300"})))).await;
    let (status, _) = send(&h, request("POST", "/api/v1/admin/promo-codes", admin, Some(json!({"code": "save10", "discount_type": "PERCENT", "discount_value": "10"})))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, cart) = send(&h, request("POST", "/api/v1/cart", buyer, Some(json!({"product_id": product["id"], "quantity": 2})))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["lines"].as_array().unwrap().len(), 1);

    let (status, preview) = send(&h, request("POST", "/api/v1/promo/validate", buyer, Some(json!({"code": "SAVE10", "shipping_method_id": shipping["id"]})))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(money(&preview["totals"]["total"]), Decimal::new(2100, 0));

    let checkout = json!({"shipping_method_id": shipping["id"], "shipping_address": "1 Main Street", "promo_code": "SAVE10"});
    let (status, created) = send(&h, request("POST", "/api/v1/orders", buyer, Some(checkout))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(money(&created["order"]["total"]), Decimal::new(2100, 0));
    assert_eq!(created["order"]["status"], "PENDING");
    assert!(created["payment"]["confirmation_url"].is_string());

    let order_id: Uuid = created["order"]["id"].as_str().unwrap().parse().unwrap();
    let (status, _) = send(&h, request("GET", &format!("/api/v1/orders/{}", order_id), Some((Uuid::now_v7(), "USER")), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, mine) = send(&h, request("GET", "/api/v1/orders", buyer, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_webhook_over_http() {
    let h = Harness::new();
    let order_id = Uuid::now_v7();

    let bad = Request::builder()
        .method("POST")
        .uri("/api/v1/payments/webhook")
        .header("x-webhook-token", "nope")
        .body(Body::from(payment_succeeded(order_id)))
        .unwrap();
    let (status, _) = send(&h, bad).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let unknown_order = Request::builder()
        .method("POST")
        .uri("/api/v1/payments/webhook")
        .header("x-webhook-token", WEBHOOK_TOKEN)
        .body(Body::from(payment_succeeded(order_id)))
        .unwrap();
    let (status, body) = send(&h, unknown_order).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ignored");
}

#[tokio::test]
async fn test_invalid_promo_has_distinct_error_code() {
    let h = Harness::new();
    let buyer = Some((Uuid::now_v7(), "USER"));
    let (status, body) = send(&h, request("POST", "/api/v1/promo/validate", buyer, Some(json!({"code": "MISSING"})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_promo_code");
}

#[tokio::test]
async fn test_csv_export_and_import() {
    let h = Harness::new();
    let admin = Some((Uuid::now_v7(), "ADMIN"));
    h.product(450, 3).await;

    let response = router(h.state.clone()).oneshot(request("GET", "/api/v1/admin/products/export", admin, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let csv = String::from_utf8(response.into_body().collect().await.unwrap().to_bytes().to_vec()).unwrap();
    assert!(csv.starts_with("ID,Название"));

    let upload = format!("{}\n,New item,Red; large,99,,1,0,,\n,Two commas,Red, large,99,,1,0,,\n,Broken,,abc,,1,0,,\n", csv.lines().next().unwrap());
    let import = Request::builder()
        .method("POST")
        .uri("/api/v1/admin/products/import")
        .header("x-user-id", admin.unwrap().0.to_string())
        .header("x-user-role", "ADMIN")
        .header("content-type", "text/csv")
        .body(Body::from(upload))
        .unwrap();
    let (status, report) = send(&h, import).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["created"], 1);
    assert_eq!(report["errors"].as_array().unwrap().len(), 2);
}
