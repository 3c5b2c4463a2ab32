use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::api::{AppState, Identity};
use crate::domain::aggregates::Order;
use crate::integrations::PaymentSession;
use crate::services::{CheckoutRequest, CheckoutResult};
use crate::Result;

pub async fn create(State(s): State<AppState>, who: Identity, Json(req): Json<CheckoutRequest>) -> Result<(StatusCode, Json<CheckoutResult>)> {
    let result = s.orders().create_order(who.user_id, req).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

pub async fn list(State(s): State<AppState>, who: Identity) -> Result<Json<Vec<Order>>> {
    Ok(Json(s.orders().list_for(who.user_id).await?))
}

pub async fn get(State(s): State<AppState>, who: Identity, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(s.orders().get(who.user_id, who.is_admin(), id).await?))
}

pub async fn cancel(State(s): State<AppState>, who: Identity, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(s.orders().cancel(who.user_id, id).await?))
}

pub async fn pay(State(s): State<AppState>, who: Identity, Path(id): Path<Uuid>) -> Result<Json<PaymentSession>> {
    Ok(Json(s.orders().start_payment(who.user_id, id).await?))
}
