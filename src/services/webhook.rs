//! Payment provider webhook.
//!
//! Deliveries are at-least-once. Anything we cannot act on is acknowledged
//! so the provider stops retrying; only storage failures are returned as
//! errors, which makes the provider retry the (idempotent) delivery.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::notify_later;
use crate::domain::aggregates::OrderStatus;
use crate::integrations::Notifier;
use crate::storage::Store;
use crate::{EcommerceError, Result};

const SUCCESS_EVENTS: [&str; 2] = ["payment.succeeded", "payment.waiting_for_capture"];

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    pub object: WebhookObject,
}

#[derive(Debug, Deserialize)]
pub struct WebhookObject {
    pub id: String,
    #[serde(default)]
    pub metadata: WebhookMetadata,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookMetadata {
    pub order_id: Option<String>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied { order_id: Uuid, transitioned: bool },
    Ignored { reason: String },
}

impl WebhookOutcome {
    fn ignored(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        tracing::warn!(%reason, "Payment webhook ignored");
        Self::Ignored { reason }
    }
}

#[derive(Clone)]
pub struct WebhookService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    token: Option<String>,
}

impl WebhookService {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, token: Option<String>) -> Self {
        Self { store, notifier, token }
    }

    fn authenticate(&self, presented: Option<&str>) -> Result<()> {
        match &self.token {
            Some(expected) if presented != Some(expected.as_str()) => Err(EcommerceError::Unauthorized),
            Some(_) => Ok(()),
            None => {
                tracing::warn!("PAYMENT_WEBHOOK_TOKEN not set, accepting unauthenticated webhook");
                Ok(())
            }
        }
    }

    pub async fn handle(&self, presented_token: Option<&str>, body: &[u8]) -> Result<WebhookOutcome> {
        self.authenticate(presented_token)?;

        let payload: WebhookPayload = match serde_json::from_slice(body) {
            Ok(p) => p,
            Err(e) => return Ok(WebhookOutcome::ignored(format!("malformed payload: {}", e))),
        };
        if !SUCCESS_EVENTS.contains(&payload.event.as_str()) {
            tracing::info!(event = %payload.event, payment_id = %payload.object.id, "Payment event acknowledged");
            return Ok(WebhookOutcome::Ignored { reason: format!("event {} not handled", payload.event) });
        }
        let Some(order_id) = payload.object.metadata.order_id.as_deref().and_then(|s| Uuid::parse_str(s).ok()) else {
            return Ok(WebhookOutcome::ignored("metadata.orderId missing or invalid"));
        };

        let applied = match self.store.apply_payment(order_id, &payload.object.id).await {
            Ok(applied) => applied,
            Err(EcommerceError::Storage(e)) => return Err(EcommerceError::Storage(e)),
            Err(e) => return Ok(WebhookOutcome::ignored(format!("order {}: {}", order_id, e))),
        };

        if !applied.confirmation.unfulfilled.is_empty() {
            tracing::error!(%order_id, unfulfilled = ?applied.confirmation.unfulfilled, "Paid order has lines without stock");
        }
        if applied.transitioned {
            tracing::info!(%order_id, payment_id = %payload.object.id, confirmed = applied.confirmation.confirmed, "Order paid");
            let order = applied.order.clone();
            notify_later(&self.notifier, "status_update", move |n| async move { n.send_status_update(&order, OrderStatus::Pending).await });
        } else {
            tracing::debug!(%order_id, "Duplicate payment notification");
        }
        Ok(WebhookOutcome::Applied { order_id, transitioned: applied.transitioned })
    }
}
