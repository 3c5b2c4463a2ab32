//! Back-office handlers. Every handler requires the ADMIN role.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{AdminIdentity, AppState};
use crate::domain::aggregates::{Order, OrderReturn, OrderStatus, Product, PromoCode, RefundStatus, ReturnStatus, ShippingMethod};
use crate::services::{CsvImportReport, ProductPage, ProductQuery};
use crate::storage::{NewProduct, NewPromoCode, NewShippingMethod, ProductPatch};
use crate::Result;

#[derive(Debug, Deserialize)]
pub struct OrderStatusUpdate {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct ReturnStatusUpdate {
    pub status: ReturnStatus,
    pub admin_comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefundStatusUpdate {
    pub refund_status: RefundStatus,
}

#[derive(Debug, Serialize)]
pub struct SweepResult {
    pub expired: u32,
}

pub async fn list_products(State(s): State<AppState>, _: AdminIdentity, Query(q): Query<ProductQuery>) -> Result<Json<ProductPage>> {
    Ok(Json(s.catalog().list_products(q, true).await?))
}

pub async fn create_product(State(s): State<AppState>, _: AdminIdentity, Json(new): Json<NewProduct>) -> Result<(StatusCode, Json<Product>)> {
    Ok((StatusCode::CREATED, Json(s.catalog().create_product(new).await?)))
}

pub async fn update_product(State(s): State<AppState>, _: AdminIdentity, Path(id): Path<Uuid>, Json(patch): Json<ProductPatch>) -> Result<Json<Product>> {
    Ok(Json(s.catalog().update_product(id, patch).await?))
}

pub async fn delete_product(State(s): State<AppState>, _: AdminIdentity, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.catalog().delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn export_products(State(s): State<AppState>, _: AdminIdentity) -> Result<impl IntoResponse> {
    let csv = s.catalog().export_csv().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"products.csv\""),
        ],
        csv,
    ))
}

pub async fn import_products(State(s): State<AppState>, _: AdminIdentity, body: String) -> Result<Json<CsvImportReport>> {
    Ok(Json(s.catalog().import_csv(&body).await?))
}

pub async fn list_orders(State(s): State<AppState>, _: AdminIdentity) -> Result<Json<Vec<Order>>> {
    Ok(Json(s.orders().list_all().await?))
}

pub async fn set_order_status(State(s): State<AppState>, _: AdminIdentity, Path(id): Path<Uuid>, Json(req): Json<OrderStatusUpdate>) -> Result<Json<Order>> {
    Ok(Json(s.orders().set_status(id, req.status).await?))
}

pub async fn list_returns(State(s): State<AppState>, _: AdminIdentity) -> Result<Json<Vec<OrderReturn>>> {
    Ok(Json(s.returns().list_all().await?))
}

pub async fn set_return_status(State(s): State<AppState>, _: AdminIdentity, Path(id): Path<Uuid>, Json(req): Json<ReturnStatusUpdate>) -> Result<Json<OrderReturn>> {
    Ok(Json(s.returns().set_status(id, req.status, req.admin_comment).await?))
}

pub async fn set_refund_status(State(s): State<AppState>, _: AdminIdentity, Path(id): Path<Uuid>, Json(req): Json<RefundStatusUpdate>) -> Result<Json<OrderReturn>> {
    Ok(Json(s.returns().set_refund_status(id, req.refund_status).await?))
}

pub async fn list_promo_codes(State(s): State<AppState>, _: AdminIdentity) -> Result<Json<Vec<PromoCode>>> {
    Ok(Json(s.catalog().promo_codes().await?))
}

pub async fn create_promo_code(State(s): State<AppState>, _: AdminIdentity, Json(new): Json<NewPromoCode>) -> Result<(StatusCode, Json<PromoCode>)> {
    Ok((StatusCode::CREATED, Json(s.catalog().create_promo_code(new).await?)))
}

pub async fn list_shipping_methods(State(s): State<AppState>, _: AdminIdentity) -> Result<Json<Vec<ShippingMethod>>> {
    Ok(Json(s.catalog().shipping_methods(true).await?))
}

pub async fn create_shipping_method(State(s): State<AppState>, _: AdminIdentity, Json(new): Json<NewShippingMethod>) -> Result<(StatusCode, Json<ShippingMethod>)> {
    Ok((StatusCode::CREATED, Json(s.catalog().create_shipping_method(new).await?)))
}

pub async fn delete_review(State(s): State<AppState>, _: AdminIdentity, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.engagement().delete_review(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn sweep_reservations(State(s): State<AppState>, _: AdminIdentity) -> Result<Json<SweepResult>> {
    Ok(Json(SweepResult { expired: s.inventory().sweep().await? }))
}
