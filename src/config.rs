//! Service configuration loaded from the environment (optionally `.env`).

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Payment provider credentials. Absent when `PAYMENT_API_URL` is unset,
/// in which case the stub gateway is used.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub api_url: String,
    pub shop_id: String,
    pub secret_key: String,
    pub return_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub port: u16,
    pub nats_url: Option<String>,
    pub currency: String,
    pub reservation_ttl: chrono::Duration,
    pub reservation_sweep_interval: Duration,
    pub payment: Option<PaymentConfig>,
    /// Shared token the payment provider must send in `X-Webhook-Token`.
    pub webhook_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            port: 8083,
            nats_url: None,
            currency: "RUB".to_string(),
            reservation_ttl: chrono::Duration::minutes(30),
            reservation_sweep_interval: Duration::from_secs(60),
            payment: None,
            webhook_token: None,
        }
    }
}

impl Config {
    /// Reads configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let port = parse_var("PORT")?.unwrap_or(defaults.port);
        let reservation_ttl = reservation_ttl(parse_var("RESERVATION_TTL_MINUTES")?.unwrap_or(30))?;
        let sweep_secs: u64 = parse_var("RESERVATION_SWEEP_SECS")?.unwrap_or(60);

        let payment = match var("PAYMENT_API_URL") {
            Some(api_url) => Some(PaymentConfig {
                api_url,
                shop_id: var("PAYMENT_SHOP_ID").unwrap_or_default(),
                secret_key: var("PAYMENT_SECRET_KEY").unwrap_or_default(),
                return_url: var("PAYMENT_RETURN_URL").unwrap_or_else(|| "http://localhost:3000/orders".to_string()),
                timeout: Duration::from_secs(parse_var("PAYMENT_TIMEOUT_SECS")?.unwrap_or(30)),
            }),
            None => None,
        };

        let config = Self {
            database_url: var("DATABASE_URL"),
            port,
            nats_url: var("NATS_URL"),
            currency: var("STORE_CURRENCY").unwrap_or(defaults.currency),
            reservation_ttl,
            reservation_sweep_interval: Duration::from_secs(sweep_secs.max(1)),
            payment,
            webhook_token: var("PAYMENT_WEBHOOK_TOKEN"),
        };
        tracing::info!(port = config.port, persistent = config.database_url.is_some(), "Config loaded");
        Ok(config)
    }
}

/// Holds longer than a week are a misconfiguration.
const MAX_RESERVATION_TTL_MINUTES: i64 = 7 * 24 * 60;

fn reservation_ttl(minutes: i64) -> Result<chrono::Duration, ConfigError> {
    let invalid = || ConfigError::Invalid { name: "RESERVATION_TTL_MINUTES", value: minutes.to_string() };
    if !(1..=MAX_RESERVATION_TTL_MINUTES).contains(&minutes) {
        return Err(invalid());
    }
    chrono::Duration::try_minutes(minutes).ok_or_else(invalid)
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match var(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(None),
    }
}
