use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use crate::middleware::auth::Claims;
use crate::middleware::logging::to_response;
use crate::services::order as orders;
use crate::AppState;

pub fn order_router() -> Router {
    Router::new()
        .route("/orders", get(get_orders))
        .route("/orders/:id", get(get_order))
}

async fn get_orders(
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
) -> Response {
    match orders::list_for_user(&*state.db, claims.user_id).await {
        Ok(views) => to_response((StatusCode::OK, Json(views)), Ok(())),
        Err(err) => err.into_response(),
    }
}

async fn get_order(
    Path(id): Path<i32>,
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
) -> Response {
    match orders::get_for_user(&*state.db, claims.user_id, id).await {
        Ok(view) => to_response((StatusCode::OK, Json(view)), Ok(())),
        Err(err) => err.into_response(),
    }
}
