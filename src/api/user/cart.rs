use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::entities::product::VariantSelection;
use crate::error::ServiceError;
use crate::middleware::auth::Claims;
use crate::middleware::logging::to_response;
use crate::services::{cart as cart_store, coupon as coupons};
use crate::AppState;

pub fn cart_router() -> Router {
    Router::new()
        .route("/cart", get(get_cart).post(add_product).delete(clear_cart))
        .route("/cart/:id", patch(patch_entry).delete(remove_product))
        .route("/cart/coupon", post(preview_coupon))
}

async fn get_cart(
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
) -> Response {
    match cart_store::get_cart(&*state.db, claims.user_id).await {
        Ok(view) => to_response((StatusCode::OK, Json(view)), Ok(())),
        Err(err) => ServiceError::from(err).into_response(),
    }
}

async fn add_product(
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<AddProduct>,
) -> Response {
    let result = cart_store::add_item(
        &*state.db,
        claims.user_id,
        payload.product_id,
        payload.variant_selections,
        payload.quantity,
    )
    .await;

    match result {
        Ok(entry) => to_response((StatusCode::CREATED, Json(entry)), Ok(())),
        Err(err) => err.into_response(),
    }
}

async fn patch_entry(
    Path(id): Path<i32>,
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<PatchCart>,
) -> Response {
    match cart_store::set_quantity(&*state.db, claims.user_id, id, payload.quantity).await {
        Ok(Some(entry)) => to_response((StatusCode::OK, Json(entry)), Ok(())),
        Ok(None) => to_response(
            (
                StatusCode::OK,
                Json(json!({
                    "message": "Cart entry removed"
                })),
            ),
            Ok(()),
        ),
        Err(err) => err.into_response(),
    }
}

async fn remove_product(
    Path(id): Path<i32>,
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
) -> Response {
    match cart_store::remove_item(&*state.db, claims.user_id, id).await {
        Ok(()) => to_response(
            (
                StatusCode::OK,
                Json(json!({
                    "message": "Cart entry removed"
                })),
            ),
            Ok(()),
        ),
        Err(err) => err.into_response(),
    }
}

async fn clear_cart(
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
) -> Response {
    match cart_store::clear(&*state.db, claims.user_id).await {
        Ok(removed) => to_response((StatusCode::OK, Json(json!({ "removed": removed }))), Ok(())),
        Err(err) => ServiceError::from(err).into_response(),
    }
}

/// Discount preview for the cart page. Nothing is recorded.
async fn preview_coupon(
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<PreviewCoupon>,
) -> Response {
    let subtotal = match payload.subtotal {
        Some(subtotal) => subtotal,
        None => match cart_store::get_cart(&*state.db, claims.user_id).await {
            Ok(view) => view.subtotal,
            Err(err) => return ServiceError::from(err).into_response(),
        },
    };

    match coupons::preview(&*state.db, &payload.code, subtotal, Utc::now()).await {
        Ok(preview) => to_response((StatusCode::OK, Json(preview)), Ok(())),
        Err(err) => err.into_response(),
    }
}

#[derive(Deserialize, Debug)]
struct AddProduct {
    product_id: i32,
    #[serde(default)]
    variant_selections: Vec<VariantSelection>,
    quantity: i32,
}

#[derive(Deserialize)]
struct PatchCart {
    quantity: i32,
}

#[derive(Deserialize)]
struct PreviewCoupon {
    code: String,
    /// Overrides the subtotal of the stored cart, in minor units.
    subtotal: Option<i64>,
}
