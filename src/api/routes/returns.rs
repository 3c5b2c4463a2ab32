use axum::{extract::State, http::StatusCode, Json};

use crate::api::{AppState, Identity};
use crate::domain::aggregates::OrderReturn;
use crate::services::ReturnRequest;
use crate::Result;

pub async fn create(State(s): State<AppState>, who: Identity, Json(req): Json<ReturnRequest>) -> Result<(StatusCode, Json<OrderReturn>)> {
    Ok((StatusCode::CREATED, Json(s.returns().create(who.user_id, req).await?)))
}

pub async fn list(State(s): State<AppState>, who: Identity) -> Result<Json<Vec<OrderReturn>>> {
    Ok(Json(s.returns().list_for(who.user_id).await?))
}
