pub mod coupon;
pub mod order;

use axum::{middleware::from_fn_with_state, Router};

use coupon::admin_coupon_router;
use order::admin_order_router;

use crate::middleware::auth::{auth_middleware, AuthState};

pub fn admin_api_router(auth: AuthState) -> Router {
    Router::new()
        .merge(admin_coupon_router())
        .merge(admin_order_router())
        .route_layer(from_fn_with_state(auth, auth_middleware))
}
