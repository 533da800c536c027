//! Session events: inputs to transitions, inbound server events, outbound client events

use crate::error::ControlError;
use crate::functions::RealtimeTool;
use serde::{Deserialize, Serialize};

/// Events that trigger session transitions
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    // Caller events
    SetupRequested,
    StopRequested,
    /// Held context changed; push it if active
    ContextChanged,
    /// Push an ad-hoc system item without changing the held context
    ContextPushed { text: String },

    // Setup outcomes
    Negotiated,
    NegotiationFailed { message: String },

    // Data channel events
    ChannelOpened,
    ChannelClosed,
    ServerMessage(ServerEvent),
}

/// Inbound data-channel event, discriminated by `type`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "response.audio_transcript.done")]
    TranscriptDone { transcript: String },
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        name: String,
        #[serde(default)]
        arguments: String,
        call_id: String,
    },
    /// Any other discriminator; not consumed
    #[serde(other)]
    Other,
}

impl ServerEvent {
    pub fn parse(text: &str) -> Result<Self, ControlError> {
        serde_json::from_str(text)
            .map_err(|e| ControlError::protocol(format!("malformed server event: {e}")))
    }
}

/// Outbound data-channel event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionUpdate },
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdate {
    pub modalities: Vec<String>,
    pub tools: Vec<RealtimeTool>,
    pub instructions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    Message {
        role: String,
        content: Vec<ContentPart>,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputText { text: String },
}

impl ClientEvent {
    /// `session.update` advertising text+audio, the tool list and instructions
    pub fn session_update(tools: Vec<RealtimeTool>, instructions: impl Into<String>) -> Self {
        Self::SessionUpdate {
            session: SessionUpdate {
                modalities: vec!["text".to_string(), "audio".to_string()],
                tools,
                instructions: instructions.into(),
            },
        }
    }

    /// Synthetic system-role conversation item
    pub fn system_message(text: impl Into<String>) -> Self {
        Self::ConversationItemCreate {
            item: ConversationItem::Message {
                role: "system".to_string(),
                content: vec![ContentPart::InputText { text: text.into() }],
            },
        }
    }

    pub fn function_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::ConversationItemCreate {
            item: ConversationItem::FunctionCallOutput {
                call_id: call_id.into(),
                output: output.into(),
            },
        }
    }

    pub fn to_json(&self) -> Result<String, ControlError> {
        serde_json::to_string(self)
            .map_err(|e| ControlError::protocol(format!("failed to encode client event: {e}")))
    }
}
