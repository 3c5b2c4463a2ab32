//! Payment provider client.
//!
//! The provider hosts the checkout page; we only create a payment for an
//! order and redirect the buyer to the returned confirmation URL. Payment
//! results come back through the webhook.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PaymentConfig;
use crate::{EcommerceError, Result};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PaymentSession {
    pub payment_id: String,
    pub confirmation_url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment(&self, amount: Decimal, order_id: Uuid, user_id: Uuid, description: &str) -> Result<PaymentSession>;
}

#[derive(Serialize)]
struct Amount {
    value: String,
    currency: String,
}

#[derive(Serialize)]
struct Confirmation<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    return_url: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Metadata {
    order_id: Uuid,
    user_id: Uuid,
}

#[derive(Serialize)]
struct CreatePayment<'a> {
    amount: Amount,
    capture: bool,
    confirmation: Confirmation<'a>,
    description: &'a str,
    metadata: Metadata,
}

#[derive(Deserialize)]
struct CreatedPayment {
    id: String,
    confirmation: Option<CreatedConfirmation>,
}

#[derive(Deserialize)]
struct CreatedConfirmation {
    confirmation_url: Option<String>,
}

/// Provider REST API over HTTPS with basic auth (shop id / secret key).
pub struct HttpPaymentGateway {
    client: Client,
    config: PaymentConfig,
    currency: String,
}

impl HttpPaymentGateway {
    pub fn new(config: PaymentConfig, currency: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EcommerceError::Payment(e.to_string()))?;
        Ok(Self { client, config, currency: currency.into() })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_payment(&self, amount: Decimal, order_id: Uuid, user_id: Uuid, description: &str) -> Result<PaymentSession> {
        let body = CreatePayment {
            amount: Amount { value: format!("{:.2}", amount.round_dp(2)), currency: self.currency.clone() },
            capture: true,
            confirmation: Confirmation { kind: "redirect", return_url: &self.config.return_url },
            description,
            metadata: Metadata { order_id, user_id },
        };
        let url = format!("{}/payments", self.config.api_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.shop_id, Some(&self.config.secret_key))
            // Retried creates for the same order return the same payment.
            .header("Idempotence-Key", order_id.to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| EcommerceError::Payment(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(%order_id, %status, body = %text, "Payment provider rejected create request");
            return Err(EcommerceError::Payment(format!("provider returned {}", status)));
        }

        let created: CreatedPayment = response.json().await.map_err(|e| EcommerceError::Payment(e.to_string()))?;
        let confirmation_url = created
            .confirmation
            .and_then(|c| c.confirmation_url)
            .ok_or_else(|| EcommerceError::Payment("response carried no confirmation url".to_string()))?;
        tracing::info!(%order_id, payment_id = %created.id, "Payment created");
        Ok(PaymentSession { payment_id: created.id, confirmation_url })
    }
}

/// Used when no provider is configured. Hands out a local URL so the
/// flow can be driven by posting the webhook manually.
#[derive(Default)]
pub struct StubPaymentGateway;

#[async_trait]
impl PaymentGateway for StubPaymentGateway {
    async fn create_payment(&self, amount: Decimal, order_id: Uuid, _user_id: Uuid, _description: &str) -> Result<PaymentSession> {
        tracing::info!(%order_id, %amount, "Stub payment created");
        Ok(PaymentSession {
            payment_id: format!("stub-{}", order_id),
            confirmation_url: format!("/payments/stub/{}", order_id),
        })
    }
}
