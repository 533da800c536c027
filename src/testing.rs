//! Test doubles for the provider seam

use crate::llm::{ChatMessage, LlmError, LlmRequest, LlmResponse, LlmService, Role, ToolCall, Usage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

// ============================================================================
// Mock LLM service
// ============================================================================

/// Mock provider with queued responses
pub struct MockLlmService {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    model_id: String,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

#[allow(dead_code)]
impl MockLlmService {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful response
    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmService for MockLlmService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Response builders
// ============================================================================

pub fn text_response(text: &str) -> LlmResponse {
    LlmResponse {
        message: ChatMessage::assistant(text),
        finish_reason: Some("stop".to_string()),
        usage: Usage::default(),
    }
}

/// Assistant turn requesting `calls` as `(id, name, arguments)`
pub fn tool_call_response(calls: &[(&str, &str, &str)]) -> LlmResponse {
    LlmResponse {
        message: ChatMessage {
            role: Role::Assistant,
            content: None,
            tool_calls: calls
                .iter()
                .map(|(id, name, arguments)| ToolCall::new(*id, *name, *arguments))
                .collect(),
            tool_call_id: None,
        },
        finish_reason: Some("tool_calls".to_string()),
        usage: Usage::default(),
    }
}
