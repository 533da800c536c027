//! Ephemeral-credential service for realtime sessions
//!
//! `GET /session` exchanges the server's long-lived key for a short-lived
//! realtime credential, so the key never reaches the client.

use crate::config::TokenServiceConfig;
use crate::error::ControlError;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for handlers
#[derive(Clone)]
pub struct TokenState {
    config: Arc<TokenServiceConfig>,
    client: reqwest::Client,
}

impl TokenState {
    pub fn new(config: TokenServiceConfig) -> Result<Self, ControlError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ControlError::configuration(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }
}

/// Router with permissive CORS so browser clients may call it
pub fn create_router(state: TokenState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/session", get(create_session))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Serialize)]
struct SessionRequest<'a> {
    model: &'a str,
    voice: &'a str,
}

async fn create_session(State(state): State<TokenState>) -> Result<Json<Value>, AppError> {
    let config = &state.config;
    let response = state
        .client
        .post(config.sessions_url())
        .bearer_auth(&config.api_key)
        .json(&SessionRequest {
            model: &config.model,
            voice: &config.voice,
        })
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("realtime sessions endpoint unreachable: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AppError::Upstream(format!("failed to read upstream response: {e}")))?;

    if !status.is_success() {
        tracing::warn!(status = %status, "Upstream rejected session request");
        return Err(AppError::Upstream(format!("upstream returned {status}: {body}")));
    }

    let session: Value = serde_json::from_str(&body)
        .map_err(|e| AppError::Upstream(format!("invalid upstream response: {e}")))?;
    if session.pointer("/client_secret/value").and_then(Value::as_str).is_none() {
        return Err(AppError::Upstream(
            "upstream response missing client_secret.value".to_string(),
        ));
    }

    tracing::info!(model = %config.model, "Issued realtime session credential");
    Ok(Json(session))
}

// Error handling

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
enum AppError {
    Upstream(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
