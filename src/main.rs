//! OpenSASE Storefront - storefront and admin back-office service

use std::sync::Arc;

use anyhow::Result;
use opensase_storefront::api::{self, AppState};
use opensase_storefront::config::Config;
use opensase_storefront::integrations::{HttpPaymentGateway, LogNotifier, NatsNotifier, Notifier, PaymentGateway, StubPaymentGateway};
use opensase_storefront::services::spawn_sweeper;
use opensase_storefront::storage::init_store;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();

    let config = Config::from_env()?;
    let store = init_store(&config).await?;

    let payments: Arc<dyn PaymentGateway> = match &config.payment {
        Some(payment) => Arc::new(HttpPaymentGateway::new(payment.clone(), config.currency.clone())?),
        None => {
            tracing::warn!("PAYMENT_API_URL not set, using stub payment gateway");
            Arc::new(StubPaymentGateway)
        }
    };

    let notifier: Arc<dyn Notifier> = match &config.nats_url {
        Some(url) => match NatsNotifier::connect(url).await {
            Ok(nats) => Arc::new(nats),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, notifications go to the log");
                Arc::new(LogNotifier)
            }
        },
        None => Arc::new(LogNotifier),
    };

    let port = config.port;
    let sweep_every = config.reservation_sweep_interval;
    let state = AppState::new(store, payments, notifier, config);
    spawn_sweeper(state.inventory(), sweep_every);

    let app = api::router(state);
    tracing::info!("🚀 OpenSASE Storefront listening on 0.0.0.0:{}", port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?, app).await?;
    Ok(())
}
