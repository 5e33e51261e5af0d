//! # forge-api: HTTP Service for the Entity Lifecycle Manager
//!
//! Exposes the lifecycle manager of the InnoCap Forge platform over
//! HTTP/JSON. Every state change of a user, project, milestone, escrow
//! account or wallet transaction goes through `POST /transitions`.
//!
//! ## API Surface
//!
//! | Route                    | Module                   |
//! |--------------------------|--------------------------|
//! | `/transitions*`          | [`routes::transitions`]  |
//! | `/entities*`             | [`routes::entities`]     |
//! | `/state-machines`        | [`routes::machines`]     |
//! | `/metrics`               | [`routes::metrics`]      |
//! | `/openapi.json`          | [`openapi`]              |
//! | `/health/*`              | unauthenticated checks   |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::middleware::from_fn;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::middleware::metrics::ApiMetrics;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health checks (`/health/*`) are mounted outside the auth middleware
/// so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let metrics = ApiMetrics::new();

    let api = Router::new()
        .merge(routes::transitions::router())
        .merge(routes::entities::router())
        .merge(routes::machines::router())
        .merge(routes::metrics::router())
        .merge(openapi::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(auth_config))
        .layer(axum::Extension(metrics))
        .with_state(state);

    let health = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));

    Router::new().merge(health).merge(api)
}

/// Liveness check: 200 while the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness check: 200 once the router is serving.
async fn readiness() -> &'static str {
    "ready"
}
