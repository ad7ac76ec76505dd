use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::middleware::auth::Claims;
use crate::middleware::logging::to_response;
use crate::services::checkout::{CheckoutOrchestrator, CheckoutRequest, ShippingAddress};
use crate::AppState;

pub fn checkout_router() -> Router {
    Router::new().route("/checkout", post(checkout))
}

async fn checkout(
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CheckoutPayload>,
) -> Response {
    let orchestrator = CheckoutOrchestrator::new(
        &state.db,
        state.gateway.as_ref(),
        &state.config.app_origin,
        &state.config.currency,
    );
    let request = CheckoutRequest {
        user_id: claims.user_id,
        shipping_address: payload.shipping_address,
        coupon_code: payload.coupon_code,
    };

    match orchestrator.initiate(request, Utc::now()).await {
        Ok(session) => to_response(
            (
                StatusCode::OK,
                Json(json!({
                    "url": session.url,
                    "order_id": session.order_id,
                })),
            ),
            Ok(()),
        ),
        Err(err) => err.into_response(),
    }
}

#[derive(Deserialize)]
struct CheckoutPayload {
    #[serde(default)]
    shipping_address: ShippingAddress,
    coupon_code: Option<String>,
}
