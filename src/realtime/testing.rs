//! Test doubles for the realtime transport seams

use super::transport::{
    AudioTrack, ChannelEvent, ChannelEvents, DataChannel, PeerTransport, Signaling, TokenSource,
    TransportFactory,
};
use crate::error::ControlError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Shared record of everything the mock transport saw
#[derive(Default)]
pub struct TransportLog {
    /// Lifecycle calls in order (`create`, `track.stop`, `channel.close`, ...)
    pub calls: Vec<String>,
    /// Text sent over the data channel
    pub sent: Vec<String>,
    /// Sender feeding the most recently created channel
    pub inbound: Option<mpsc::UnboundedSender<ChannelEvent>>,
}

/// Handle tests keep to drive and inspect mock transports
#[derive(Clone, Default)]
pub struct MockTransportHandle {
    log: Arc<Mutex<TransportLog>>,
}

#[allow(dead_code)]
impl MockTransportHandle {
    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().calls.clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.log.lock().unwrap().sent.clone()
    }

    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }

    pub fn clear_sent(&self) {
        self.log.lock().unwrap().sent.clear();
    }

    /// Deliver an event on the current data channel
    pub fn push(&self, event: ChannelEvent) {
        let log = self.log.lock().unwrap();
        log.inbound
            .as_ref()
            .expect("no data channel created")
            .send(event)
            .unwrap();
    }

    fn record(&self, call: &str) {
        self.log.lock().unwrap().calls.push(call.to_string());
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Factory producing transports that record into one shared log
pub struct MockTransportFactory {
    handle: MockTransportHandle,
    /// Number of audio tracks each transport captures
    tracks: usize,
}

impl MockTransportFactory {
    pub fn new() -> (Self, MockTransportHandle) {
        let factory = Self {
            handle: MockTransportHandle::default(),
            tracks: 1,
        };
        let handle = factory.handle.clone();
        (factory, handle)
    }

    pub fn with_tracks(mut self, tracks: usize) -> Self {
        self.tracks = tracks;
        self
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self) -> Result<Box<dyn PeerTransport>, ControlError> {
        self.handle.record("create");
        Ok(Box::new(MockPeerTransport {
            handle: self.handle.clone(),
            tracks: self.tracks,
        }))
    }
}

struct MockPeerTransport {
    handle: MockTransportHandle,
    tracks: usize,
}

#[async_trait]
impl PeerTransport for MockPeerTransport {
    async fn capture_audio(&mut self) -> Result<Vec<Box<dyn AudioTrack>>, ControlError> {
        self.handle.record("capture_audio");
        Ok((0..self.tracks)
            .map(|i| {
                Box::new(MockAudioTrack {
                    handle: self.handle.clone(),
                    index: i,
                }) as Box<dyn AudioTrack>
            })
            .collect())
    }

    async fn create_data_channel(
        &mut self,
        label: &str,
    ) -> Result<(Arc<dyn DataChannel>, ChannelEvents), ControlError> {
        self.handle.record(&format!("create_data_channel:{label}"));
        let (tx, rx) = mpsc::unbounded_channel();
        self.handle.log.lock().unwrap().inbound = Some(tx);
        Ok((
            Arc::new(MockDataChannel {
                handle: self.handle.clone(),
            }),
            rx,
        ))
    }

    async fn create_offer(&mut self) -> Result<String, ControlError> {
        self.handle.record("create_offer");
        Ok("v=0 mock-offer".to_string())
    }

    async fn apply_answer(&mut self, answer: &str) -> Result<(), ControlError> {
        self.handle.record(&format!("apply_answer:{answer}"));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ControlError> {
        self.handle.record("transport.close");
        Ok(())
    }
}

struct MockDataChannel {
    handle: MockTransportHandle,
}

impl DataChannel for MockDataChannel {
    fn send(&self, text: &str) -> Result<(), ControlError> {
        self.handle.log.lock().unwrap().sent.push(text.to_string());
        Ok(())
    }

    fn close(&self) -> Result<(), ControlError> {
        self.handle.record("channel.close");
        Ok(())
    }
}

struct MockAudioTrack {
    handle: MockTransportHandle,
    index: usize,
}

impl AudioTrack for MockAudioTrack {
    fn stop(&mut self) -> Result<(), ControlError> {
        self.handle.record(&format!("track.stop:{}", self.index));
        Ok(())
    }
}

// ============================================================================
// Token and signaling
// ============================================================================

/// Token source returning a fixed credential or failing
pub struct MockTokenSource {
    token: Option<String>,
}

impl MockTokenSource {
    pub fn ok(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl TokenSource for MockTokenSource {
    async fn fetch_token(&self) -> Result<String, ControlError> {
        self.token
            .clone()
            .ok_or_else(|| ControlError::transport("token service unreachable"))
    }
}

/// Signaling that answers (or rejects) and records the offers it saw
#[derive(Default)]
pub struct MockSignaling {
    reject: Mutex<bool>,
    /// `(token, offer)` pairs
    pub offers: Mutex<Vec<(String, String)>>,
}

#[allow(dead_code)]
impl MockSignaling {
    pub fn rejecting() -> Self {
        Self {
            reject: Mutex::new(true),
            offers: Mutex::new(Vec::new()),
        }
    }

    pub fn set_reject(&self, reject: bool) {
        *self.reject.lock().unwrap() = reject;
    }

    pub fn offer_count(&self) -> usize {
        self.offers.lock().unwrap().len()
    }
}

#[async_trait]
impl Signaling for MockSignaling {
    async fn negotiate(&self, token: &str, offer: &str) -> Result<String, ControlError> {
        self.offers
            .lock()
            .unwrap()
            .push((token.to_string(), offer.to_string()));
        if *self.reject.lock().unwrap() {
            return Err(ControlError::transport("realtime endpoint returned 401"));
        }
        Ok("v=0 mock-answer".to_string())
    }
}
