//! Speakeasy - strongly-typed function calling for language-model providers
//!
//! Register tools once in a [`FunctionRegistry`], then drive them from either
//! delivery mode:
//!
//! - [`ConversationOrchestrator`]: request/response over HTTP chat completions,
//!   with tool execution and primary/fallback provider failover.
//! - [`RealtimeSessionController`]: a persistent voice session whose data
//!   channel carries transcripts and tool calls.
//!
//! [`token_service`] provides the local `GET /session` endpoint realtime
//! sessions obtain their short-lived credential from.

pub mod config;
pub mod conversation;
pub mod error;
pub mod functions;
pub mod llm;
pub mod realtime;
pub mod token_service;

#[cfg(test)]
mod testing;

pub use config::{ControlConfig, TokenServiceConfig, VoiceConfig};
pub use conversation::{ConversationOrchestrator, FunctionCallOutcome, HistoryPolicy};
pub use error::ControlError;
pub use functions::{FunctionDescriptor, FunctionRegistry, ToolFunction, UnknownToolPolicy};
pub use realtime::{RealtimeSessionController, SessionHandle, SessionState};
