use axum::{body::Bytes, extract::State, http::HeaderMap, Json};

use crate::api::AppState;
use crate::services::WebhookOutcome;
use crate::Result;

pub const WEBHOOK_TOKEN_HEADER: &str = "x-webhook-token";

pub async fn webhook(State(s): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<WebhookOutcome>> {
    let token = headers.get(WEBHOOK_TOKEN_HEADER).and_then(|v| v.to_str().ok());
    Ok(Json(s.webhook().handle(token, &body).await?))
}
