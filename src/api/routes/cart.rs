use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::{AppState, Identity};
use crate::domain::aggregates::Cart;
use crate::domain::value_objects::Quantity;
use crate::services::AddToCart;
use crate::Result;

#[derive(Debug, Deserialize)]
pub struct SetQuantity {
    pub quantity: Quantity,
}

pub async fn view(State(s): State<AppState>, who: Identity) -> Result<Json<Cart>> {
    Ok(Json(s.cart().view(who.user_id).await?))
}

pub async fn add(State(s): State<AppState>, who: Identity, Json(req): Json<AddToCart>) -> Result<Json<Cart>> {
    Ok(Json(s.cart().add(who.user_id, req).await?))
}

pub async fn update(State(s): State<AppState>, who: Identity, Path(item_id): Path<Uuid>, Json(req): Json<SetQuantity>) -> Result<Json<Cart>> {
    Ok(Json(s.cart().update(who.user_id, item_id, req.quantity).await?))
}

pub async fn remove(State(s): State<AppState>, who: Identity, Path(item_id): Path<Uuid>) -> Result<Json<Cart>> {
    Ok(Json(s.cart().remove(who.user_id, item_id).await?))
}

pub async fn clear(State(s): State<AppState>, who: Identity) -> Result<StatusCode> {
    s.cart().clear(who.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
