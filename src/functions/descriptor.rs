//! Function descriptors and their provider-facing projections
//!
//! A descriptor is validated once, at registration. The wire form accepted by
//! [`FunctionDescriptor::from_value`] is the chat-completions tool shape:
//!
//! ```json
//! { "type": "function",
//!   "function": { "name": "...", "description": "...", "parameters": { ... } },
//!   "strict": true,
//!   "return": { "type": "...", "description": "..." },
//!   "usageExamples": [ { "command": "...", "trigger": "...", "description": "..." } ] }
//! ```

use crate::error::ControlError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Declared return type; documentation only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

/// Usage example; documentation only, never consulted by dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageExample {
    pub command: String,
    pub trigger: String,
    pub description: String,
}

/// Immutable description of one callable tool
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDescriptor {
    pub name: String,
    pub description: String,
    /// JSON-schema object describing the arguments
    pub parameters: Value,
    pub strict: Option<bool>,
    pub returns: Option<ReturnSpec>,
    pub usage_examples: Vec<UsageExample>,
}

impl FunctionDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: json!({ "type": "object", "properties": {} }),
            strict: None,
            returns: None,
            usage_examples: Vec::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    pub fn with_return(mut self, kind: impl Into<String>, description: impl Into<String>) -> Self {
        self.returns = Some(ReturnSpec {
            kind: kind.into(),
            description: description.into(),
        });
        self
    }

    pub fn with_usage_example(
        mut self,
        command: impl Into<String>,
        trigger: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.usage_examples.push(UsageExample {
            command: command.into(),
            trigger: trigger.into(),
            description: description.into(),
        });
        self
    }

    /// Check the descriptor, listing every violated field
    pub fn validate(&self) -> Result<(), ControlError> {
        let mut violations = Vec::new();
        if self.name.trim().is_empty() {
            violations.push("function.name".to_string());
        }
        validate_parameters(&self.parameters, &mut violations);
        into_result(violations)
    }

    /// Parse and validate the wire form
    pub fn from_value(value: &Value) -> Result<Self, ControlError> {
        let mut violations = Vec::new();

        let Some(root) = value.as_object() else {
            return Err(ControlError::Validation {
                fields: vec!["descriptor".to_string()],
            });
        };

        if root.get("type").and_then(Value::as_str) != Some("function") {
            violations.push("type".to_string());
        }

        let function = root.get("function").and_then(Value::as_object);
        if function.is_none() {
            violations.push("function".to_string());
        }
        let empty = Map::new();
        let function = function.unwrap_or(&empty);

        let name = required_string(function, "name", "function.name", &mut violations);
        if name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            violations.push("function.name".to_string());
        }
        let description =
            required_string(function, "description", "function.description", &mut violations);

        let parameters = function.get("parameters").cloned().unwrap_or(Value::Null);
        validate_parameters(&parameters, &mut violations);

        let strict = match root.get("strict") {
            None | Some(Value::Null) => None,
            Some(Value::Bool(b)) => Some(*b),
            Some(_) => {
                violations.push("strict".to_string());
                None
            }
        };

        let returns = match root.get("return") {
            None | Some(Value::Null) => None,
            Some(Value::Object(spec)) => {
                let kind = required_string(spec, "type", "return.type", &mut violations);
                let description =
                    required_string(spec, "description", "return.description", &mut violations);
                kind.zip(description)
                    .map(|(kind, description)| ReturnSpec { kind, description })
            }
            Some(_) => {
                violations.push("return".to_string());
                None
            }
        };

        let usage_examples = match root.get("usageExamples") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => parse_usage_examples(items, &mut violations),
            Some(_) => {
                violations.push("usageExamples".to_string());
                Vec::new()
            }
        };

        into_result(violations)?;

        Ok(Self {
            name: name.unwrap_or_default(),
            description: description.unwrap_or_default(),
            parameters,
            strict,
            returns,
            usage_examples,
        })
    }

    /// Render the wire form accepted by [`Self::from_value`]
    pub fn to_value(&self) -> Value {
        let mut root = json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        });
        if let Some(obj) = root.as_object_mut() {
            if let Some(strict) = self.strict {
                obj.insert("strict".to_string(), Value::Bool(strict));
            }
            if let Some(returns) = &self.returns {
                obj.insert("return".to_string(), json!(returns));
            }
            if !self.usage_examples.is_empty() {
                obj.insert("usageExamples".to_string(), json!(self.usage_examples));
            }
        }
        root
    }

    /// Chat-completions `tools[]` entry
    pub fn to_provider_tool(&self) -> ProviderTool {
        ProviderTool {
            kind: "function".to_string(),
            function: ProviderFunction {
                name: self.name.clone(),
                description: self.description.clone(),
                parameters: self.parameters.clone(),
                strict: self.strict,
            },
        }
    }

    /// Recover a descriptor from a provider tool entry
    pub fn from_provider_tool(tool: &ProviderTool) -> Self {
        Self {
            name: tool.function.name.clone(),
            description: tool.function.description.clone(),
            parameters: tool.function.parameters.clone(),
            strict: tool.function.strict,
            returns: None,
            usage_examples: Vec::new(),
        }
    }

    /// Flattened `session.update` tool entry
    pub fn to_realtime_tool(&self) -> RealtimeTool {
        RealtimeTool {
            kind: "function".to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

impl TryFrom<Value> for FunctionDescriptor {
    type Error = ControlError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(&value)
    }
}

/// Tool entry in a chat-completions request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ProviderFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

/// Tool entry in a realtime `session.update` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

fn into_result(mut violations: Vec<String>) -> Result<(), ControlError> {
    if violations.is_empty() {
        return Ok(());
    }
    violations.dedup();
    Err(ControlError::Validation { fields: violations })
}

fn required_string(
    obj: &Map<String, Value>,
    key: &str,
    field: &str,
    violations: &mut Vec<String>,
) -> Option<String> {
    if let Some(s) = obj.get(key).and_then(Value::as_str) {
        Some(s.to_string())
    } else {
        violations.push(field.to_string());
        None
    }
}

/// Parameters must be an object schema; declared properties need a type and a description
fn validate_parameters(parameters: &Value, violations: &mut Vec<String>) {
    let Some(schema) = parameters.as_object() else {
        violations.push("function.parameters".to_string());
        return;
    };

    match schema.get("type") {
        None => {}
        Some(Value::String(t)) if t == "object" => {}
        Some(_) => violations.push("function.parameters.type".to_string()),
    }

    match schema.get("properties") {
        None => {}
        Some(Value::Object(properties)) => {
            for (key, property) in properties {
                let Some(property) = property.as_object() else {
                    violations.push(format!("function.parameters.properties.{key}"));
                    continue;
                };
                if !property.get("type").is_some_and(Value::is_string) {
                    violations.push(format!("function.parameters.properties.{key}.type"));
                }
                if !property.get("description").is_some_and(Value::is_string) {
                    violations.push(format!("function.parameters.properties.{key}.description"));
                }
            }
        }
        Some(_) => violations.push("function.parameters.properties".to_string()),
    }
}

fn parse_usage_examples(items: &[Value], violations: &mut Vec<String>) -> Vec<UsageExample> {
    let mut examples = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            violations.push(format!("usageExamples[{i}]"));
            continue;
        };
        let command = required_string(obj, "command", &format!("usageExamples[{i}].command"), violations);
        let trigger = required_string(obj, "trigger", &format!("usageExamples[{i}].trigger"), violations);
        let description = required_string(
            obj,
            "description",
            &format!("usageExamples[{i}].description"),
            violations,
        );
        if let (Some(command), Some(trigger), Some(description)) = (command, trigger, description) {
            examples.push(UsageExample {
                command,
                trigger,
                description,
            });
        }
    }
    examples
}
