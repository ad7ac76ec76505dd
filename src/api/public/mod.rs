pub mod product;
pub mod webhook;

use axum::Router;

use product::product_router;
use webhook::webhook_router;

pub fn public_api_router() -> Router {
    Router::new()
        .merge(product_router())
        .merge(webhook_router())
}
