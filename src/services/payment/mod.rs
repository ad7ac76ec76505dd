//! Hosted payment provider: session creation on the way out, signed events on the
//! way back in.

pub mod signature;
pub mod stripe;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use signature::{verify_signature, SignatureError};
pub use stripe::{parse_event, StripeGateway};

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("request to payment provider failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("payment provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("payment provider response is missing `{0}`")]
    MissingField(&'static str),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaymentLineItem {
    pub name: String,
    pub description: Option<String>,
    /// Minor currency units.
    pub unit_amount: i64,
    pub quantity: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaymentSessionRequest {
    pub order_id: i32,
    pub user_id: i32,
    pub currency: String,
    pub line_items: Vec<PaymentLineItem>,
    /// One-time amount off the whole session, when a coupon applies.
    pub discount: Option<i64>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentSession {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(
        &self,
        request: PaymentSessionRequest,
    ) -> Result<PaymentSession, PaymentError>;
}

/// Provider events the settlement reconciler acts on, already authenticated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentEvent {
    PaymentCompleted {
        order_id: i32,
        payment_intent_id: Option<String>,
    },
    PaymentSessionExpired {
        order_id: i32,
    },
    ChargeRefunded {
        payment_intent_id: String,
    },
}

impl PaymentEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PaymentEvent::PaymentCompleted { .. } => "payment_completed",
            PaymentEvent::PaymentSessionExpired { .. } => "payment_session_expired",
            PaymentEvent::ChargeRefunded { .. } => "charge_refunded",
        }
    }
}
