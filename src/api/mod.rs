//! HTTP API.

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::integrations::{Notifier, PaymentGateway};
use crate::services::{CartService, CatalogService, EngagementService, InventoryService, OrderService, ReturnService, WebhookService};
use crate::storage::Store;

pub mod errors;
pub mod extractors;
pub mod routes;

pub use extractors::{AdminIdentity, Identity, Role};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub payments: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, payments: Arc<dyn PaymentGateway>, notifier: Arc<dyn Notifier>, config: Config) -> Self {
        Self { store, payments, notifier, config: Arc::new(config) }
    }

    pub fn catalog(&self) -> CatalogService { CatalogService::new(self.store.clone()) }
    pub fn cart(&self) -> CartService { CartService::new(self.store.clone()) }
    pub fn engagement(&self) -> EngagementService { EngagementService::new(self.store.clone()) }
    pub fn returns(&self) -> ReturnService { ReturnService::new(self.store.clone(), self.notifier.clone()) }

    pub fn orders(&self) -> OrderService {
        OrderService::new(self.store.clone(), self.payments.clone(), self.notifier.clone(), self.config.reservation_ttl)
    }

    pub fn inventory(&self) -> InventoryService {
        InventoryService::new(self.store.clone(), self.config.reservation_ttl)
    }

    pub fn webhook(&self) -> WebhookService {
        WebhookService::new(self.store.clone(), self.notifier.clone(), self.config.webhook_token.clone())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "opensase-storefront"})) }))
        .nest("/api/v1", routes::api())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
