use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::api::{AppState, Identity};
use crate::domain::aggregates::{Product, ShippingMethod};
use crate::services::{ProductPage, ProductQuery, PromoPreview, PromoPreviewRequest};
use crate::Result;

pub async fn list_products(State(s): State<AppState>, Query(q): Query<ProductQuery>) -> Result<Json<ProductPage>> {
    Ok(Json(s.catalog().list_products(q, false).await?))
}

pub async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Product>> {
    Ok(Json(s.catalog().get_product(id, false).await?))
}

pub async fn list_shipping_methods(State(s): State<AppState>) -> Result<Json<Vec<ShippingMethod>>> {
    Ok(Json(s.catalog().shipping_methods(false).await?))
}

pub async fn validate_promo(State(s): State<AppState>, who: Identity, Json(req): Json<PromoPreviewRequest>) -> Result<Json<PromoPreview>> {
    Ok(Json(s.catalog().preview_promo(who.user_id, req).await?))
}
