//! JSON error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::EcommerceError;

impl EcommerceError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidPromoCode(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InsufficientStock { .. } | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Payment(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::InvalidPromoCode(_) => "invalid_promo_code",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::Conflict(_) => "conflict",
            Self::Payment(_) => "payment_error",
            Self::Storage(_) => "internal_error",
        }
    }
}

impl IntoResponse for EcommerceError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Storage(e) => {
                tracing::error!(error = %e, "Storage failure");
                "Internal server error".to_string()
            }
            Self::Payment(e) => {
                tracing::error!(error = %e, "Payment provider failure");
                self.to_string()
            }
            other => other.to_string(),
        };
        let mut body = json!({ "error": self.code(), "message": message });
        if let Self::InsufficientStock { product_id, variant_id, requested, available } = &self {
            body["details"] = json!({
                "product_id": product_id,
                "variant_id": variant_id,
                "requested": requested,
                "available": available,
            });
        }
        (self.status(), Json(body)).into_response()
    }
}
