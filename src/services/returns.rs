use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::notify_later;
use crate::domain::aggregates::{OrderReturn, RefundStatus, ReturnStatus};
use crate::integrations::Notifier;
use crate::storage::{NewReturn, Store};
use crate::Result;

#[derive(Debug, Deserialize, Validate)]
pub struct ReturnRequest {
    pub order_id: Uuid,
    #[validate(length(min = 1, max = 1000))]
    pub reason: String,
    /// Defaults to the order total.
    pub refund_amount: Option<Decimal>,
}

#[derive(Clone)]
pub struct ReturnService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl ReturnService {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    pub async fn create(&self, user_id: Uuid, req: ReturnRequest) -> Result<OrderReturn> {
        req.validate()?;
        let ret = self
            .store
            .create_return(NewReturn { order_id: req.order_id, user_id, reason: req.reason, refund_amount: req.refund_amount })
            .await?;
        tracing::info!(return_id = %ret.id, order_id = %ret.order_id, refund = %ret.refund_amount, "Return requested");
        self.announce(&ret);
        Ok(ret)
    }

    pub async fn list_for(&self, user_id: Uuid) -> Result<Vec<OrderReturn>> {
        self.store.list_returns(Some(user_id)).await
    }

    pub async fn list_all(&self) -> Result<Vec<OrderReturn>> {
        self.store.list_returns(None).await
    }

    pub async fn set_status(&self, id: Uuid, to: ReturnStatus, admin_comment: Option<String>) -> Result<OrderReturn> {
        let before = self.store.get_return(id).await?.map(|r| r.status);
        let ret = self.store.set_return_status(id, to, admin_comment).await?;
        if before != Some(ret.status) {
            tracing::info!(return_id = %id, status = ret.status.as_str(), "Return status changed");
            self.announce(&ret);
        }
        Ok(ret)
    }

    pub async fn set_refund_status(&self, id: Uuid, to: RefundStatus) -> Result<OrderReturn> {
        let before = self.store.get_return(id).await?.map(|r| r.refund_status);
        let ret = self.store.set_refund_status(id, to).await?;
        if before != Some(ret.refund_status) {
            tracing::info!(return_id = %id, refund_status = ret.refund_status.as_str(), "Refund status changed");
            self.announce(&ret);
        }
        Ok(ret)
    }

    fn announce(&self, ret: &OrderReturn) {
        let ret = ret.clone();
        notify_later(&self.notifier, "return_update", move |n| async move { n.send_return_update(&ret).await });
    }
}
