//! Buyer notifications.
//!
//! The service only emits events; rendering and delivering e-mails is the
//! job of whatever consumes `storefront.notifications.*`.

use async_trait::async_trait;

use crate::domain::aggregates::{Order, OrderReturn, OrderStatus};
use crate::domain::events::OrderEvent;
use crate::Result;

pub const SUBJECT_PREFIX: &str = "storefront.notifications";

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &OrderEvent) -> Result<()>;

    async fn send_order_confirmation(&self, order: &Order) -> Result<()> {
        self.notify(&OrderEvent::Placed { order_id: order.id, user_id: order.user_id, total: order.total }).await
    }

    async fn send_status_update(&self, order: &Order, from: OrderStatus) -> Result<()> {
        self.notify(&OrderEvent::StatusChanged { order_id: order.id, user_id: order.user_id, from, to: order.status }).await
    }

    async fn send_return_update(&self, ret: &OrderReturn) -> Result<()> {
        self.notify(&OrderEvent::ReturnUpdated {
            return_id: ret.id,
            order_id: ret.order_id,
            user_id: ret.user_id,
            status: ret.status,
            refund_status: ret.refund_status,
        })
        .await
    }
}

pub struct NatsNotifier {
    client: async_nats::Client,
}

impl NatsNotifier {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }

    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = async_nats::connect(url).await?;
        tracing::info!(url, "Connected to NATS");
        Ok(Self::new(client))
    }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn notify(&self, event: &OrderEvent) -> Result<()> {
        let subject = format!("{}.{}", SUBJECT_PREFIX, event.kind());
        let payload = serde_json::to_vec(event).map_err(|e| crate::EcommerceError::Storage(e.to_string()))?;
        self.client
            .publish(subject, payload.into())
            .await
            .map_err(|e| crate::EcommerceError::Storage(format!("nats publish: {}", e)))?;
        Ok(())
    }
}

/// Writes events to the log only.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &OrderEvent) -> Result<()> {
        tracing::info!(kind = event.kind(), user_id = %event.user_id(), ?event, "Notification");
        Ok(())
    }
}
