//! Function registry: name -> validated descriptor + implementation
//!
//! Pure in-memory. Registration validates; invocation never fails the caller,
//! it reports [`InvokeOutcome`] instead.

use super::descriptor::{FunctionDescriptor, ProviderTool, RealtimeTool};
use crate::error::ControlError;
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{json, Value};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// Error type returned by tool implementations
pub type ToolError = Box<dyn std::error::Error + Send + Sync>;

/// A callable tool implementation.
///
/// Arguments arrive positionally, in the insertion order of the provider's
/// argument object (not schema order).
#[async_trait]
pub trait ToolFunction: Send + Sync {
    async fn call(&self, args: Vec<Value>) -> Result<Value, ToolError>;
}

/// Adapter for async closures
pub struct FnTool<F>(F);

#[async_trait]
impl<F, Fut> ToolFunction for FnTool<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send,
{
    async fn call(&self, args: Vec<Value>) -> Result<Value, ToolError> {
        (self.0)(args).await
    }
}

/// What to do with a call naming an unregistered function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownToolPolicy {
    /// Drop the call; no result is sent back
    #[default]
    Skip,
    /// Send back a failed function result naming the unknown function
    ReportError,
}

/// Result of invoking a registered function
#[derive(Debug, Clone, PartialEq)]
pub enum InvokeOutcome {
    Completed(Value),
    Failed(String),
    NotFound,
}

impl InvokeOutcome {
    /// JSON payload sent back to the provider; `None` for [`InvokeOutcome::NotFound`]
    pub fn result_payload(&self) -> Option<String> {
        match self {
            Self::Completed(value) => Some(function_result_payload(value)),
            Self::Failed(message) => Some(function_error_payload(message)),
            Self::NotFound => None,
        }
    }

    fn failed(error: ControlError) -> Self {
        match error {
            ControlError::ToolExecution { message, .. } => Self::Failed(message),
            other => Self::Failed(other.to_string()),
        }
    }
}

/// `{"functionResult": <value>}`
pub fn function_result_payload(value: &Value) -> String {
    json!({ "functionResult": value }).to_string()
}

/// `{"functionResult": null, "error": "<message>"}`
pub fn function_error_payload(message: &str) -> String {
    json!({ "functionResult": Value::Null, "error": message }).to_string()
}

/// Argument values in object-key insertion order
pub fn positional_arguments(arguments: &Value) -> Vec<Value> {
    match arguments {
        Value::Object(map) => map.values().cloned().collect(),
        Value::Array(items) => items.clone(),
        _ => Vec::new(),
    }
}

/// One descriptor paired with its implementation
#[derive(Clone)]
pub struct FunctionBinding {
    descriptor: FunctionDescriptor,
    implementation: Arc<dyn ToolFunction>,
}

impl FunctionBinding {
    pub fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Apply `arguments` positionally; errors and panics become [`InvokeOutcome::Failed`]
    pub async fn invoke(&self, arguments: &Value) -> InvokeOutcome {
        let args = positional_arguments(arguments);
        let start = Instant::now();
        let result = AssertUnwindSafe(self.implementation.call(args))
            .catch_unwind()
            .await;
        let duration_ms = start.elapsed().as_millis();

        match result {
            Ok(Ok(value)) => {
                tracing::info!(function = %self.name(), duration_ms = %duration_ms, "Function completed");
                InvokeOutcome::Completed(value)
            }
            Ok(Err(e)) => {
                let error = ControlError::tool_execution(self.name(), e.to_string());
                tracing::warn!(duration_ms = %duration_ms, error = %error, "Function failed");
                InvokeOutcome::failed(error)
            }
            Err(panic) => {
                let error = ControlError::tool_execution(self.name(), panic_message(panic.as_ref()));
                tracing::error!(error = %error, "Function panicked");
                InvokeOutcome::failed(error)
            }
        }
    }
}

impl std::fmt::Debug for FunctionBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionBinding")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Ordered set of registered functions, unique by name
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    bindings: Vec<FunctionBinding>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async closure taking positional arguments.
    ///
    /// Re-registering a name replaces the earlier binding and moves it to the end.
    pub fn register<F, Fut>(&mut self, descriptor: FunctionDescriptor, func: F) -> Result<(), ControlError>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        self.register_tool(descriptor, Arc::new(FnTool(func)))
    }

    /// Register a [`ToolFunction`] implementation
    pub fn register_tool(
        &mut self,
        descriptor: FunctionDescriptor,
        implementation: Arc<dyn ToolFunction>,
    ) -> Result<(), ControlError> {
        descriptor.validate()?;

        if let Some(index) = self.position(&descriptor.name) {
            tracing::debug!(function = %descriptor.name, "Replacing registered function");
            self.bindings.remove(index);
        }
        self.bindings.push(FunctionBinding {
            descriptor,
            implementation,
        });
        Ok(())
    }

    /// Register from the JSON wire form
    pub fn register_json<F, Fut>(&mut self, descriptor: &Value, func: F) -> Result<(), ControlError>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        let descriptor = FunctionDescriptor::from_value(descriptor)?;
        self.register(descriptor, func)
    }

    /// Remove a function; returns whether it was registered
    pub fn unregister(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(index) => {
                self.bindings.remove(index);
                true
            }
            None => false,
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.bindings.iter().position(|b| b.name() == name)
    }

    /// Registered descriptors in registration order
    pub fn list(&self) -> Vec<&FunctionDescriptor> {
        self.bindings.iter().map(FunctionBinding::descriptor).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.bindings.iter().map(FunctionBinding::name).collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn resolve(&self, name: &str) -> Option<&FunctionBinding> {
        self.bindings.iter().find(|b| b.name() == name)
    }

    /// Tool list for a chat-completions request
    pub fn provider_tools(&self) -> Vec<ProviderTool> {
        self.bindings
            .iter()
            .map(|b| b.descriptor.to_provider_tool())
            .collect()
    }

    /// Tool list for a realtime `session.update`
    pub fn realtime_tools(&self) -> Vec<RealtimeTool> {
        self.bindings
            .iter()
            .map(|b| b.descriptor.to_realtime_tool())
            .collect()
    }

    pub async fn invoke(&self, name: &str, arguments: &Value) -> InvokeOutcome {
        match self.resolve(name) {
            Some(binding) => binding.invoke(arguments).await,
            None => InvokeOutcome::NotFound,
        }
    }

    /// Invoke and render the payload to send back, honoring `policy` for unknown names
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: &Value,
        policy: UnknownToolPolicy,
    ) -> Option<String> {
        match self.invoke(name, arguments).await {
            InvokeOutcome::NotFound => match policy {
                UnknownToolPolicy::Skip => {
                    tracing::warn!(function = %name, "Skipping call to unregistered function");
                    None
                }
                UnknownToolPolicy::ReportError => {
                    tracing::warn!(function = %name, "Reporting call to unregistered function");
                    Some(function_error_payload(&format!("unknown function: {name}")))
                }
            },
            outcome => outcome.result_payload(),
        }
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}
