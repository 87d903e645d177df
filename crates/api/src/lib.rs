//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - REST API routes for the plan catalog, subscription lifecycle,
//!   payment reconciliation and quota checks
//! - Authentication middleware
//! - The outbound payment provider gateway
//! - A background sweeper that reconciles stale pending payments

pub mod middleware;
pub mod provider;
pub mod reconcile;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use sea_orm::DatabaseConnection;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use vigil_shared::{AppConfig, JwtService};

use crate::provider::VnpayGateway;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: Arc<DatabaseConnection>,
    /// JWT service for token validation.
    pub jwt_service: Arc<JwtService>,
    /// Outbound gateway to the payment provider.
    pub vnpay: Arc<VnpayGateway>,
    /// Loaded application configuration.
    pub config: Arc<AppConfig>,
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes_with_state(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
