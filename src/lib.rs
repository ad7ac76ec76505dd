pub mod api;
pub mod config;
pub mod entities;
pub mod error;
pub mod middleware;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::Config;
use crate::services::payment::PaymentGateway;

/// Shared handles every router gets through an `Extension` layer.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: DatabaseConnection, gateway: Arc<dyn PaymentGateway>, config: Config) -> Self {
        AppState {
            db: Arc::new(db),
            gateway,
            config: Arc::new(config),
        }
    }
}
