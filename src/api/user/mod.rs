pub mod cart;
pub mod checkout;
pub mod order;

use axum::{middleware::from_fn_with_state, Router};

use crate::middleware::auth::{auth_middleware, AuthState};
use cart::cart_router;
use checkout::checkout_router;
use order::order_router;

pub fn user_api_router(auth: AuthState) -> Router {
    Router::new()
        .merge(cart_router())
        .merge(checkout_router())
        .merge(order_router())
        .route_layer(from_fn_with_state(auth, auth_middleware))
}
