//! Application services.
//!
//! Each service is a cheap bundle of `Arc`s built per request from the
//! shared state; they hold no state of their own.

use std::future::Future;
use std::sync::Arc;

use crate::integrations::Notifier;

pub mod cart;
pub mod catalog;
pub mod engagement;
pub mod inventory;
pub mod orders;
pub mod returns;
pub mod webhook;

pub use cart::{AddToCart, CartService};
pub use catalog::{CatalogService, CsvImportReport, ProductPage, ProductQuery, PromoPreview, PromoPreviewRequest};
pub use engagement::{EngagementService, ReviewRequest};
pub use inventory::{spawn_sweeper, InventoryService};
pub use orders::{CheckoutRequest, CheckoutResult, OrderService};
pub use returns::{ReturnRequest, ReturnService};
pub use webhook::{WebhookOutcome, WebhookService};

/// Runs a notification send in the background. Failures are logged and
/// never surface to the caller.
pub(crate) fn notify_later<F, Fut>(notifier: &Arc<dyn Notifier>, kind: &'static str, send: F)
where
    F: FnOnce(Arc<dyn Notifier>) -> Fut,
    Fut: Future<Output = crate::Result<()>> + Send + 'static,
{
    let pending = send(Arc::clone(notifier));
    tokio::spawn(async move {
        if let Err(e) = pending.await {
            tracing::warn!(kind, error = %e, "Notification failed");
        }
    });
}
