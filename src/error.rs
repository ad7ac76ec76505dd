use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use std::borrow::Borrow;
use serde_json::json;
use thiserror::Error;

use crate::middleware::logging::{to_response, ApiError};
use crate::services::payment::PaymentError;

/// Reasons a cart or checkout request is rejected before anything is persisted.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Complete shipping address is required (missing: {})", .0.join(", "))]
    IncompleteAddress(Vec<String>),
    #[error("Cart is empty")]
    EmptyCart,
    #[error("Product {product_id} is no longer available")]
    ProductUnavailable { product_id: i32 },
    #[error("Insufficient stock for {product} ({variant}: {value}): requested {requested}, available {available}")]
    InsufficientStock {
        product_id: i32,
        product: String,
        variant: String,
        value: String,
        requested: i64,
        available: i64,
    },
    #[error("Invalid or expired coupon")]
    InvalidCoupon,
    #[error("Coupon usage limit reached")]
    UsageExhausted,
    #[error("Minimum order amount for this coupon is {}", format_amount(.minimum))]
    BelowMinimum { minimum: i64 },
    #[error("Quantity should be between 1 and 10000")]
    InvalidQuantity,
    #[error("Invalid variant selection: {0}")]
    InvalidVariantSelection(String),
    #[error("{0}")]
    InvalidInput(String),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Payment provider error: {0}")]
    ExternalService(#[from] PaymentError),
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    #[error("{0}")]
    Conflict(String),
}

impl ServiceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ServiceError::NotFound(what.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
        }
    }

    /// Message safe to show to the caller. Storage details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::Database(_) => "Internal server error".to_owned(),
            ServiceError::ExternalService(_) => {
                "Payment provider is unavailable, please retry".to_owned()
            }
            other => other.to_string(),
        }
    }
}

impl From<&ServiceError> for ApiError {
    fn from(value: &ServiceError) -> Self {
        match value {
            ServiceError::Database(err) => ApiError::DbError(err.to_string()),
            ServiceError::Validation(err) => ApiError::ValidationFail(err.to_string()),
            ServiceError::ExternalService(err) => ApiError::External(err.to_string()),
            other => ApiError::General(other.to_string()),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let ext = Err(ApiError::from(&self));
        to_response(
            (
                self.status_code(),
                Json(json!({
                    "error": self.public_message()
                })),
            ),
            ext,
        )
    }
}

/// Renders minor units as "$12.50".
pub fn format_amount(minor: impl Borrow<i64>) -> String {
    let minor = *minor.borrow();
    let sign = if minor < 0 { "-" } else { "" };
    let minor = minor.unsigned_abs();
    format!("{}${}.{:02}", sign, minor / 100, minor % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_minimum_message_shows_currency() {
        let err = ValidationError::BelowMinimum { minimum: 5000 };
        assert_eq!(err.to_string(), "Minimum order amount for this coupon is $50.00");
    }

    #[test]
    fn insufficient_stock_names_the_variant() {
        let err = ValidationError::InsufficientStock {
            product_id: 3,
            product: "Linen shirt".to_owned(),
            variant: "Size".to_owned(),
            value: "Large".to_owned(),
            requested: 4,
            available: 1,
        };
        assert!(err.to_string().starts_with("Insufficient stock for Linen shirt (Size: Large)"));
    }

    #[test]
    fn database_errors_are_not_leaked() {
        let err = ServiceError::Database(DbErr::Custom("disk I/O".to_owned()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn format_amount_pads_cents() {
        assert_eq!(format_amount(1205), "$12.05");
        assert_eq!(format_amount(7), "$0.07");
        assert_eq!(format_amount(-250), "-$2.50");
    }
}
