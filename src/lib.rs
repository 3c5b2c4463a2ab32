//! OpenSASE Storefront
//!
//! Self-hosted storefront and admin back-office.
//!
//! ## Features
//! - Product catalog, variants and CSV import/export
//! - Cart and checkout with promo codes and shipping rates
//! - Stock reservations held until payment
//! - Order lifecycle, returns and refunds
//! - Reviews, wishlists and buyer notifications

pub mod api;
pub mod catalog_csv;
pub mod config;
pub mod domain;
pub mod integrations;
pub mod pricing;
pub mod services;
pub mod storage;

use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Invalid promo code: {0}")]
    InvalidPromoCode(String),

    #[error("Insufficient stock for product {product_id}")]
    InsufficientStock {
        product_id: Uuid,
        variant_id: Option<Uuid>,
        requested: u32,
        available: u32,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment provider error: {0}")]
    Payment(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl EcommerceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}

impl From<sqlx::Error> for EcommerceError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for EcommerceError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<validator::ValidationErrors> for EcommerceError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EcommerceError>;
