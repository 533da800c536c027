//! Request/response orchestration with tool dispatch and two-tier failover
//!
//! Every external call starts on the primary endpoint. A provider failure
//! switches to the fallback and retries the whole call once; whatever the
//! outcome, the next call starts on the primary again.

use super::state::{ActiveProvider, ConversationState, HistoryPolicy};
use crate::config::{ControlConfig, FallbackConfig};
use crate::error::ControlError;
use crate::functions::{
    function_error_payload, FunctionDescriptor, FunctionRegistry, ToolError, UnknownToolPolicy,
};
use crate::llm::{
    ChatMessage, LlmRequest, LlmResponse, LlmService, LoggingService, OpenAIService,
    ProviderEndpoint, ToolCall,
};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Result of [`ConversationOrchestrator::get_function_call_name`]
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionCallOutcome {
    /// Raw tool calls requested by the provider, in provider order
    ToolCalls(Vec<ToolCall>),
    /// Direct text answer
    Text(String),
    /// Neither tool calls nor text
    Empty,
}

enum Fallback {
    Unconfigured,
    Incomplete { missing: Vec<&'static str> },
    Ready(Arc<dyn LlmService>),
}

/// Drives one HTTP-mode conversation
pub struct ConversationOrchestrator {
    state: ConversationState,
    registry: FunctionRegistry,
    primary: Arc<dyn LlmService>,
    fallback: Fallback,
    active: ActiveProvider,
    history_policy: HistoryPolicy,
    unknown_tool_policy: UnknownToolPolicy,
}

impl ConversationOrchestrator {
    /// Build OpenAI-compatible services for the configured endpoints
    pub fn new(config: &ControlConfig) -> Result<Self, ControlError> {
        config.check_browser_exposure()?;

        let primary = build_service(config.primary_endpoint()?, config)?;
        let fallback = match config.fallback() {
            FallbackConfig::Unconfigured => Fallback::Unconfigured,
            FallbackConfig::Incomplete { missing } => Fallback::Incomplete { missing },
            FallbackConfig::Ready(endpoint) => Fallback::Ready(build_service(endpoint, config)?),
        };

        Ok(Self::assemble(config, primary, fallback))
    }

    /// Use caller-supplied services.
    ///
    /// Without an explicit fallback service, an incomplete fallback
    /// configuration still reports its missing fields on failover.
    pub fn with_services(
        config: &ControlConfig,
        primary: Arc<dyn LlmService>,
        fallback: Option<Arc<dyn LlmService>>,
    ) -> Self {
        let fallback = match (fallback, config.fallback()) {
            (Some(service), _) => Fallback::Ready(service),
            (None, FallbackConfig::Incomplete { missing }) => Fallback::Incomplete { missing },
            (None, _) => Fallback::Unconfigured,
        };
        Self::assemble(config, primary, fallback)
    }

    fn assemble(config: &ControlConfig, primary: Arc<dyn LlmService>, fallback: Fallback) -> Self {
        Self {
            state: ConversationState::new(config.instructions.clone()),
            registry: FunctionRegistry::new(),
            primary,
            fallback,
            active: ActiveProvider::Primary,
            history_policy: config.history_policy,
            unknown_tool_policy: config.unknown_tool_policy,
        }
    }

    /// Register a tool; a later registration under the same name replaces it
    pub fn add_function<F, Fut>(
        &mut self,
        descriptor: FunctionDescriptor,
        func: F,
    ) -> Result<(), ControlError>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        self.registry.register(descriptor, func)
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.registry
    }

    pub fn history(&self) -> &[ChatMessage] {
        self.state.messages()
    }

    pub fn active_provider(&self) -> ActiveProvider {
        self.active
    }

    /// Explicitly clear history back to the system prompt
    pub fn reset_to_system_prompt(&mut self) {
        self.state.reset_to_system_prompt();
    }

    /// Send `user_text`, executing any requested tools, and return the final answer
    pub async fn send_request(&mut self, user_text: &str) -> Result<String, ControlError> {
        self.active = ActiveProvider::Primary;
        loop {
            let service = self.active_service()?;
            match self.exchange(service.as_ref(), user_text).await {
                Ok(answer) => {
                    self.active = ActiveProvider::Primary;
                    return Ok(answer);
                }
                Err(e) => self.fail_over(e)?,
            }
        }
    }

    /// Ask the provider which tools it would call, without executing them
    pub async fn get_function_call_name(
        &mut self,
        user_text: &str,
    ) -> Result<FunctionCallOutcome, ControlError> {
        self.active = ActiveProvider::Primary;
        loop {
            let service = self.active_service()?;
            match self.inspect(service.as_ref(), user_text).await {
                Ok(outcome) => {
                    self.active = ActiveProvider::Primary;
                    return Ok(outcome);
                }
                Err(e) => self.fail_over(e)?,
            }
        }
    }

    fn active_service(&self) -> Result<Arc<dyn LlmService>, ControlError> {
        match (self.active, &self.fallback) {
            (ActiveProvider::Primary, _) => Ok(Arc::clone(&self.primary)),
            (ActiveProvider::Fallback, Fallback::Ready(service)) => Ok(Arc::clone(service)),
            (ActiveProvider::Fallback, _) => {
                Err(ControlError::configuration("fallback provider not configured"))
            }
        }
    }

    /// Decide what a failed attempt means: `Ok` retries on the fallback, `Err` surfaces
    fn fail_over(&mut self, error: ControlError) -> Result<(), ControlError> {
        let failed_on = self.active;
        self.active = ActiveProvider::Primary;

        if !error.is_provider() || failed_on == ActiveProvider::Fallback {
            tracing::error!(provider = %failed_on, error = %error, "Request failed");
            return Err(error);
        }

        match &self.fallback {
            Fallback::Unconfigured => {
                tracing::warn!(error = %error, "Primary provider failed, no fallback configured");
                Err(error)
            }
            Fallback::Incomplete { missing } => {
                tracing::error!(error = %error, missing = ?missing, "Primary provider failed, fallback incomplete");
                Err(ControlError::configuration(format!(
                    "fallback provider not configured: missing {}",
                    missing.join(", ")
                )))
            }
            Fallback::Ready(service) => {
                let retry_after = match &error {
                    ControlError::Provider(e) => e.retry_after.map(|d| d.as_secs()),
                    _ => None,
                };
                tracing::warn!(
                    error = %error,
                    retry_after_secs = ?retry_after,
                    fallback_model = %service.model_id(),
                    "Primary provider failed, switching to fallback"
                );
                self.active = ActiveProvider::Fallback;
                Ok(())
            }
        }
    }

    /// One attempt: request, optional tool round, follow-up request
    async fn exchange(&mut self, service: &dyn LlmService, user_text: &str) -> Result<String, ControlError> {
        let messages = self.state.with_user(user_text);
        let request = LlmRequest {
            messages: messages.clone(),
            tools: self.registry.provider_tools(),
        };
        let response = service.complete(&request).await?;

        if !response.has_tool_calls() {
            let answer = response.text().unwrap_or_default().to_string();
            self.state
                .extend([ChatMessage::user(user_text), ChatMessage::assistant(answer.clone())]);
            return Ok(answer);
        }

        let LlmResponse { message: assistant, .. } = response;
        let mut tool_results = Vec::with_capacity(assistant.tool_calls.len());
        for call in &assistant.tool_calls {
            if let Some(payload) = self.tool_result_payload(call).await {
                tool_results.push(ChatMessage::tool_result(call.id.clone(), payload));
            }
        }

        tracing::debug!(
            requested = assistant.tool_calls.len(),
            answered = tool_results.len(),
            "Sending tool results"
        );

        let mut follow_up = messages;
        follow_up.push(assistant.clone());
        follow_up.extend(tool_results.iter().cloned());
        let final_response = service
            .complete(&LlmRequest {
                messages: follow_up,
                tools: Vec::new(),
            })
            .await?;
        let answer = final_response.text().unwrap_or_default().to_string();

        match self.history_policy {
            HistoryPolicy::ResetAfterToolTurn => self.state.reset_to_system_prompt(),
            HistoryPolicy::Retain => {
                self.state.extend([ChatMessage::user(user_text), assistant]);
                self.state.extend(tool_results);
                self.state.extend([final_response.message]);
            }
        }

        Ok(answer)
    }

    /// Payload for one tool call; `None` when the call is skipped
    async fn tool_result_payload(&self, call: &ToolCall) -> Option<String> {
        let name = call.name();
        if self.registry.resolve(name).is_none() {
            return self
                .registry
                .dispatch(name, &Value::Null, self.unknown_tool_policy)
                .await;
        }

        match call.parse_arguments() {
            Ok(arguments) => {
                self.registry
                    .dispatch(name, &arguments, self.unknown_tool_policy)
                    .await
            }
            Err(e) => {
                tracing::warn!(function = %name, call_id = %call.id, error = %e, "Malformed tool arguments");
                Some(function_error_payload(&format!("malformed arguments: {e}")))
            }
        }
    }

    async fn inspect(
        &self,
        service: &dyn LlmService,
        user_text: &str,
    ) -> Result<FunctionCallOutcome, ControlError> {
        let request = LlmRequest {
            messages: self.state.with_user(user_text),
            tools: self.registry.provider_tools(),
        };
        let response = service.complete(&request).await?;

        if response.has_tool_calls() {
            return Ok(FunctionCallOutcome::ToolCalls(response.message.tool_calls));
        }
        Ok(match response.message.content {
            Some(text) if !text.is_empty() => FunctionCallOutcome::Text(text),
            _ => FunctionCallOutcome::Empty,
        })
    }
}

/// Logged `OpenAI`-compatible service; a bad endpoint is a configuration problem
fn build_service(
    endpoint: ProviderEndpoint,
    config: &ControlConfig,
) -> Result<Arc<dyn LlmService>, ControlError> {
    let service = OpenAIService::new(endpoint, config.request_timeout)
        .map_err(|e| ControlError::configuration(e.message))?;
    Ok(Arc::new(LoggingService::new(Arc::new(service))))
}

impl std::fmt::Debug for ConversationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationOrchestrator")
            .field("model", &self.primary.model_id())
            .field("active", &self.active)
            .field("history_len", &self.state.len())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
