use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{patch, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::entities::order::Status;
use crate::error::ServiceError;
use crate::middleware::logging::to_response;
use crate::services::{checkout::cancel_abandoned_orders, order as orders};
use crate::AppState;

pub fn admin_order_router() -> Router {
    Router::new()
        .route("/orders/sweep", post(sweep_abandoned))
        .route("/orders/:id", patch(patch_order_status))
}

async fn patch_order_status(
    Path(id): Path<i32>,
    Extension(state): Extension<AppState>,
    Json(payload): Json<PatchStatus>,
) -> Response {
    match orders::update_status(&*state.db, id, payload.status).await {
        Ok(order) => to_response((StatusCode::OK, Json(order)), Ok(())),
        Err(err) => err.into_response(),
    }
}

/// Cancels pending orders that never got a payment session and are past the
/// grace window.
async fn sweep_abandoned(Extension(state): Extension<AppState>) -> Response {
    match cancel_abandoned_orders(&*state.db, None, Utc::now()).await {
        Ok(cancelled) => to_response(
            (StatusCode::OK, Json(json!({ "cancelled": cancelled }))),
            Ok(()),
        ),
        Err(err) => ServiceError::from(err).into_response(),
    }
}

#[derive(Deserialize)]
struct PatchStatus {
    status: Status,
}
