//! Realtime session states and the context transitions read from

use crate::functions::RealtimeTool;
use serde::{Deserialize, Serialize};

/// Lifecycle of one voice session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No transport resources held
    #[default]
    Idle,
    /// Credential, transport and handshake in progress; `failed` once negotiation errored
    Connecting { failed: bool },
    /// Handshake complete, data channel not yet open
    AwaitingChannelOpen,
    Active,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting { failed: false } => write!(f, "connecting"),
            Self::Connecting { failed: true } => write!(f, "connecting (failed)"),
            Self::AwaitingChannelOpen => write!(f, "awaiting_channel_open"),
            Self::Active => write!(f, "active"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Read-only inputs for a transition
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub instructions: String,
    pub context: String,
    pub tools: Vec<RealtimeTool>,
}
