//! Vigil API Server
//!
//! Main entry point for the Vigil subscription and entitlement service.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil_api::provider::VnpayGateway;
use vigil_api::{AppState, create_router};
use vigil_db::connect;
use vigil_shared::{AppConfig, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vigil=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Connect to database
    let db = connect(&config.database.url).await?;
    info!("Connected to database");

    // Create JWT service
    let jwt_service = JwtService::new(&config.jwt.secret);

    // Create the payment provider gateway
    let vnpay = VnpayGateway::new(config.vnpay.clone())
        .context("Failed to build payment provider client")?;
    info!(
        tmn_code = %config.vnpay.tmn_code,
        payment_url = %config.vnpay.payment_url,
        "Payment gateway configured"
    );

    // Create application state
    let state = AppState {
        db: Arc::new(db),
        jwt_service: Arc::new(jwt_service),
        vnpay: Arc::new(vnpay),
        config: Arc::new(config.clone()),
    };

    // Reconcile stale pending payments in the background
    tokio::spawn(vigil_api::reconcile::run_sweeper(state.clone()));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
