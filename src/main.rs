use std::{error::Error, sync::Arc};

use marketplace::api::create_api_router;
use marketplace::config::Config;
use marketplace::entities::{connect, seed_demo_data, setup_schema, user::Role};
use marketplace::middleware::auth::generate_token;
use marketplace::services::payment::StripeGateway;
use marketplace::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("marketplace=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;
    let db = connect(&config.database_url).await?;
    setup_schema(&db).await?;

    if config.seed_demo_data {
        let accounts = seed_demo_data(&db).await?;
        for (role, id) in [
            (Role::Admin, accounts.admin_id),
            (Role::Vendor, accounts.vendor_id),
            (Role::User, accounts.user_id),
        ] {
            let token = generate_token(id, role, &config.jwt_secret)?;
            info!(%role, user_id = id, token = %token, "Demo bearer token");
        }
    }

    let gateway = Arc::new(StripeGateway::new(
        config.stripe_api_base.clone(),
        config.stripe_secret_key.clone(),
    ));
    let bind_addr = config.bind_addr.clone();
    let app = create_api_router(AppState::new(db, gateway, config));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %listener.local_addr()?, "Listening");
    axum::serve(listener, app).await?;
    Ok(())
}
