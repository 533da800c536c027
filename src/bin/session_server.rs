//! Local token service for realtime voice sessions
//!
//! Serves `GET /session` on `PORT` (default 5001), minting short-lived
//! credentials with the server's `OPENAI_API_KEY`.

use speakeasy::config::TokenServiceConfig;
use speakeasy::token_service::{create_router, TokenState};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "speakeasy=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = TokenServiceConfig::from_env()?;
    tracing::info!(config = ?config, "Token service configured");

    let port = config.port;
    let app = create_router(TokenState::new(config)?);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("Session server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
