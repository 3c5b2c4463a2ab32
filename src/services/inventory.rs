//! Stock reservations held between checkout and payment.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::aggregates::{ProductReservation, ReservationLine};
use crate::storage::{Confirmation, Store};
use crate::Result;

#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn Store>,
    ttl: chrono::Duration,
}

impl InventoryService {
    pub fn new(store: Arc<dyn Store>, ttl: chrono::Duration) -> Self {
        Self { store, ttl }
    }

    /// Holds stock for `order_id` until the reservation TTL elapses. Fails
    /// with `InsufficientStock` without writing anything.
    pub async fn reserve(&self, order_id: Uuid, lines: &[ReservationLine]) -> Result<Vec<ProductReservation>> {
        let now = Utc::now();
        self.store.reserve(order_id, lines, now, now + self.ttl).await
    }

    pub async fn confirm(&self, order_id: Uuid) -> Result<Confirmation> {
        let outcome = self.store.confirm(order_id).await?;
        if outcome.confirmed > 0 {
            tracing::info!(%order_id, confirmed = outcome.confirmed, "Reservations confirmed");
        }
        Ok(outcome)
    }

    pub async fn release(&self, order_id: Uuid) -> Result<u32> {
        let released = self.store.release(order_id).await?;
        tracing::debug!(%order_id, released, "Reservations released");
        Ok(released)
    }

    /// Marks every lapsed PENDING reservation as EXPIRED.
    pub async fn sweep(&self) -> Result<u32> {
        let expired = self.store.expire_stale(Utc::now()).await?;
        if expired > 0 {
            tracing::info!(expired, "Expired stale reservations");
        }
        Ok(expired)
    }
}

/// Periodically runs [`InventoryService::sweep`] until the runtime shuts down.
pub fn spawn_sweeper(inventory: InventoryService, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = inventory.sweep().await {
                tracing::error!(error = %e, "Reservation sweep failed");
            }
        }
    })
}
