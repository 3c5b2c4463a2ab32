use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::api::{AppState, Identity};
use crate::domain::aggregates::{Review, WishlistItem};
use crate::services::ReviewRequest;
use crate::Result;

pub async fn list_reviews(State(s): State<AppState>, Path(product_id): Path<Uuid>) -> Result<Json<Vec<Review>>> {
    Ok(Json(s.engagement().reviews(product_id).await?))
}

pub async fn add_review(State(s): State<AppState>, who: Identity, Path(product_id): Path<Uuid>, Json(req): Json<ReviewRequest>) -> Result<(StatusCode, Json<Review>)> {
    Ok((StatusCode::CREATED, Json(s.engagement().add_review(who.user_id, product_id, req).await?)))
}

pub async fn wishlist(State(s): State<AppState>, who: Identity) -> Result<Json<Vec<WishlistItem>>> {
    Ok(Json(s.engagement().wishlist(who.user_id).await?))
}

pub async fn add_to_wishlist(State(s): State<AppState>, who: Identity, Path(product_id): Path<Uuid>) -> Result<Json<WishlistItem>> {
    Ok(Json(s.engagement().add_to_wishlist(who.user_id, product_id).await?))
}

pub async fn remove_from_wishlist(State(s): State<AppState>, who: Identity, Path(product_id): Path<Uuid>) -> Result<StatusCode> {
    s.engagement().remove_from_wishlist(who.user_id, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
