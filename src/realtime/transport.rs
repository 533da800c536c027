//! Transport seams for realtime sessions
//!
//! Media and peer-connection mechanics live behind [`PeerTransport`]; the
//! controller only creates, sends on, and closes. Credential issuance and the
//! offer/answer exchange are plain HTTP and have reqwest implementations here.

use crate::config::VoiceConfig;
use crate::error::ControlError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Events delivered by a data channel, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Open,
    Message(String),
    Closed,
}

/// Receiving half of a data channel
pub type ChannelEvents = mpsc::UnboundedReceiver<ChannelEvent>;

/// Structured-event side channel of the transport
pub trait DataChannel: Send + Sync {
    fn send(&self, text: &str) -> Result<(), ControlError>;
    fn close(&self) -> Result<(), ControlError>;
}

/// One local audio capture track
pub trait AudioTrack: Send + Sync {
    fn stop(&mut self) -> Result<(), ControlError>;
}

/// A peer connection to the realtime endpoint
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Capture local audio and attach the tracks
    async fn capture_audio(&mut self) -> Result<Vec<Box<dyn AudioTrack>>, ControlError>;

    async fn create_data_channel(
        &mut self,
        label: &str,
    ) -> Result<(Arc<dyn DataChannel>, ChannelEvents), ControlError>;

    /// Local offer payload
    async fn create_offer(&mut self) -> Result<String, ControlError>;

    /// Apply the remote answer, completing the handshake
    async fn apply_answer(&mut self, answer: &str) -> Result<(), ControlError>;

    async fn close(&mut self) -> Result<(), ControlError>;
}

/// Creates one transport per session
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn PeerTransport>, ControlError>;
}

/// Issues short-lived session credentials
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<String, ControlError>;
}

/// Exchanges an offer for an answer with the realtime endpoint
#[async_trait]
pub trait Signaling: Send + Sync {
    async fn negotiate(&self, token: &str, offer: &str) -> Result<String, ControlError>;
}

// ============================================================================
// HTTP token source
// ============================================================================

#[derive(Debug, Deserialize)]
struct SessionResponse {
    client_secret: ClientSecret,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: String,
}

/// `GET /session` on the local token service
#[derive(Debug, Clone)]
pub struct HttpTokenSource {
    client: Client,
    url: String,
}

impl HttpTokenSource {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn from_config(client: Client, config: &VoiceConfig) -> Self {
        Self::new(client, config.token_url())
    }
}

#[async_trait]
impl TokenSource for HttpTokenSource {
    async fn fetch_token(&self) -> Result<String, ControlError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ControlError::transport(format!("token service unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ControlError::transport(format!(
                "token service returned {status}: {body}"
            )));
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| ControlError::transport(format!("invalid token response: {e}")))?;
        Ok(session.client_secret.value)
    }
}

// ============================================================================
// HTTP signaling
// ============================================================================

/// POSTs the offer to `{realtime_url}?model={model}`
#[derive(Debug, Clone)]
pub struct HttpSignaling {
    client: Client,
    url: String,
}

impl HttpSignaling {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn from_config(client: Client, config: &VoiceConfig) -> Self {
        Self::new(client, config.negotiation_url())
    }
}

#[async_trait]
impl Signaling for HttpSignaling {
    async fn negotiate(&self, token: &str, offer: &str) -> Result<String, ControlError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(token)
            .header(CONTENT_TYPE, "application/sdp")
            .body(offer.to_string())
            .send()
            .await
            .map_err(|e| ControlError::transport(format!("realtime endpoint unreachable: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ControlError::transport(format!("failed to read answer: {e}")))?;

        if !status.is_success() {
            return Err(ControlError::transport(format!(
                "realtime endpoint returned {status}: {body}"
            )));
        }
        Ok(body)
    }
}
