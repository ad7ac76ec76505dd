use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Deserialize;

use crate::entities::product::{self, Entity as ProductEntity};
use crate::error::ServiceError;
use crate::middleware::logging::to_response;
use crate::AppState;

pub fn product_router() -> Router {
    Router::new()
        .route("/product", get(get_products))
        .route("/product/:id", get(get_product))
}

async fn get_products(
    Query(params): Query<GetProductsQuery>,
    Extension(state): Extension<AppState>,
) -> Response {
    let mut query = ProductEntity::find().filter(product::Column::IsActive.eq(true));

    if let Some(vendor_id) = params.vendor_id {
        query = query.filter(product::Column::VendorId.eq(vendor_id));
    }
    if let Some(min) = params.min {
        query = query.filter(product::Column::BasePrice.gte(min));
    }
    if let Some(max) = params.max {
        query = query.filter(product::Column::BasePrice.lte(max));
    }

    match query.order_by_asc(product::Column::Id).all(&*state.db).await {
        Ok(products) => to_response((StatusCode::OK, Json(products)), Ok(())),
        Err(err) => ServiceError::from(err).into_response(),
    }
}

async fn get_product(
    Path(id): Path<i32>,
    Extension(state): Extension<AppState>,
) -> Response {
    let result = ProductEntity::find_by_id(id)
        .filter(product::Column::IsActive.eq(true))
        .one(&*state.db)
        .await;

    match result {
        Ok(Some(product)) => to_response((StatusCode::OK, Json(product)), Ok(())),
        Ok(None) => ServiceError::not_found(format!("Product {}", id)).into_response(),
        Err(err) => ServiceError::from(err).into_response(),
    }
}

#[derive(Deserialize)]
struct GetProductsQuery {
    vendor_id: Option<i32>,
    /// Bounds on the base price, in minor units.
    min: Option<i64>,
    max: Option<i64>,
}
