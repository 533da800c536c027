//! Error taxonomy for the function-dispatch core
//!
//! Nothing here is fatal to the host process: every variant is scoped to the
//! single call (or the single inbound event) that produced it.

use crate::llm::LlmError;
use thiserror::Error;

/// Errors surfaced by registration, orchestration and realtime sessions
#[derive(Debug, Error)]
pub enum ControlError {
    /// Malformed function descriptor; fatal to that `register` call only
    #[error("invalid function descriptor: {}", fields.join(", "))]
    Validation { fields: Vec<String> },

    /// Missing credential or incomplete fallback configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Non-success provider response or transport failure
    #[error("provider error: {0}")]
    Provider(#[from] LlmError),

    /// A tool implementation failed or panicked
    #[error("function `{function}` failed: {message}")]
    ToolExecution { function: String, message: String },

    /// Malformed inbound event or arguments
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Realtime transport, token service or signaling failure
    #[error("transport error: {0}")]
    Transport(String),
}

impl ControlError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn tool_execution(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            function: function.into(),
            message: message.into(),
        }
    }

    /// True when the error came from the provider and should drive failover
    pub fn is_provider(&self) -> bool {
        matches!(self, Self::Provider(_))
    }
}
