use axum::{
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::error::ServiceError;
use crate::middleware::logging::{to_response, ApiError};
use crate::services::{
    payment::{parse_event, signature::DEFAULT_TOLERANCE_SECS, verify_signature},
    settlement::reconcile,
};
use crate::AppState;

const SIGNATURE_HEADER: &str = "Stripe-Signature";

pub fn webhook_router() -> Router {
    Router::new().route("/webhooks/payment", post(payment_webhook))
}

/// Verified deliveries are always acknowledged, so the provider never retries an
/// event the reconciler cannot apply.
async fn payment_webhook(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        return rejected("Missing signature header".to_owned());
    };

    if let Err(err) = verify_signature(
        &body,
        signature,
        &state.config.stripe_webhook_secret,
        Utc::now().timestamp(),
        DEFAULT_TOLERANCE_SECS,
    ) {
        return rejected(err.to_string());
    }

    let event = match parse_event(&body) {
        Ok(Some(event)) => event,
        Ok(None) => return acknowledged(),
        Err(err) => {
            warn!(error = %err, "Verified payment event has an unreadable body; dropped");
            return acknowledged();
        }
    };

    let kind = event.kind();
    match reconcile(&state.db, event).await {
        Ok(outcome) => info!(event = kind, outcome = ?outcome, "Payment event reconciled"),
        Err(ServiceError::NotFound(what)) => {
            warn!(event = kind, missing = %what, "Payment event refers to an unknown order; dropped")
        }
        Err(err) => error!(event = kind, error = %err, "Failed to reconcile payment event"),
    }
    acknowledged()
}

fn acknowledged() -> Response {
    to_response((StatusCode::OK, Json(json!({ "received": true }))), Ok(()))
}

fn rejected(reason: String) -> Response {
    debug!(reason = %reason, "Payment webhook rejected");
    to_response(
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid signature" })),
        ),
        Err(ApiError::Webhook(reason)),
    )
}
