//! Function descriptors and the registry that binds them to implementations
//!
//! Both the HTTP conversation and the realtime voice session dispatch
//! provider-requested calls through a [`FunctionRegistry`].

mod descriptor;
mod registry;

#[cfg(test)]
mod proptests;

pub use descriptor::{
    FunctionDescriptor, ProviderFunction, ProviderTool, RealtimeTool, ReturnSpec, UsageExample,
};
pub use registry::{
    function_error_payload, function_result_payload, positional_arguments, FnTool,
    FunctionBinding, FunctionRegistry, InvokeOutcome, ToolError, ToolFunction, UnknownToolPolicy,
};
