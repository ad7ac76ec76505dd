pub mod admin;
pub mod public;
pub mod user;
pub mod vendor;

use axum::{middleware::from_fn, Extension, Router};
use tower_http::trace::TraceLayer;

use crate::entities::user::Role;
use crate::middleware::auth::AuthState;
use crate::middleware::logging::logging_middleware;
use crate::AppState;

use admin::admin_api_router;
use public::public_api_router;
use user::user_api_router;
use vendor::vendor_api_router;

pub fn create_api_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(public_api_router())
        .merge(user_api_router(auth_state(&state, &[Role::User, Role::Vendor, Role::Admin])))
        .nest("/vendor", vendor_api_router(auth_state(&state, &[Role::Vendor, Role::Admin])))
        .nest("/admin", admin_api_router(auth_state(&state, &[Role::Admin])));

    Router::new()
        .nest("/api", api)
        .layer(Extension(state))
        .layer(from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
}

fn auth_state(state: &AppState, roles: &'static [Role]) -> AuthState {
    AuthState {
        db: state.db.clone(),
        secret: state.config.jwt_secret.as_str().into(),
        roles,
    }
}
