//! # forge-api: Binary Entry Point
//!
//! Starts the Axum HTTP server for the entity lifecycle manager.
//! Binds to a configurable port (default 8080).

use forge_api::config::{AppConfig, LogFormat};
use forge_api::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration first: the log format depends on it.
    let config = AppConfig::from_env()?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    if config.auth_token.is_none() {
        tracing::warn!("AUTH_TOKEN not set; every caller is treated as admin");
    }
    tracing::info!(
        settlement = config.transition_policy.transaction_settlement.as_str(),
        max_attempts = config.dispatch.max_attempts,
        "lifecycle manager configured"
    );

    let port = config.port;
    let state = AppState::start(config);
    let app = forge_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Forge lifecycle API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
