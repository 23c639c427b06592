//! Tool System - Describes, validates and executes the tools the host exposes
//!
//! Information Hiding:
//! - Tool execution details hidden behind trait
//! - Argument coercion shared by every tool through `Arguments`
//! - Failures reported as values (`ToolResult`), never as panics or transport errors

pub mod arguments;
pub mod error;
pub mod github;
pub mod greet;
pub mod host;

pub use arguments::Arguments;
pub use error::ToolError;
pub use host::ToolHost;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::fmt;

/// Parameter types understood by the argument validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Boolean,
    /// A list of strings
    Array,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool parameter schema definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub description: String,
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    /// Lower bound for integer parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i64>,
}

impl ToolParameter {
    pub fn required(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
            default: None,
            minimum: None,
        }
    }

    /// Optional parameter; `default` is substituted when the caller omits it
    pub fn optional(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
        default: Option<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: false,
            default,
            minimum: None,
        }
    }

    pub fn with_minimum(mut self, minimum: i64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    fn json_schema(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".to_string(), json!(self.param_type.as_str()));
        if !self.description.is_empty() {
            schema.insert("description".to_string(), json!(self.description));
        }
        if self.param_type == ParamType::Array {
            schema.insert("items".to_string(), json!({"type": "string"}));
        }
        if let Some(minimum) = self.minimum {
            schema.insert("minimum".to_string(), json!(minimum));
        }
        if let Some(default) = &self.default {
            schema.insert("default".to_string(), default.clone());
        }
        Value::Object(schema)
    }
}

/// Tool descriptor - describes what the tool does and how to call it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<ToolParameter>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&ToolParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn required_parameters(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect()
    }

    /// JSON schema of the parameters, as function-calling models expect it
    pub fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.json_schema()))
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": self.required_parameters(),
        })
    }
}

impl fmt::Display for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.description)
    }
}

/// Outcome of one tool invocation: a payload or a structured failure, never both
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    Success(Value),
    Failure(ToolError),
}

impl ToolResult {
    pub fn success(payload: impl Into<Value>) -> Self {
        ToolResult::Success(payload.into())
    }

    pub fn failure(error: ToolError) -> Self {
        ToolResult::Failure(error)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Success(_))
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            ToolResult::Success(payload) => Some(payload),
            ToolResult::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ToolError> {
        match self {
            ToolResult::Success(_) => None,
            ToolResult::Failure(error) => Some(error),
        }
    }

    /// `{ok: true, payload}` or `{ok: false, kind, message, ...}`
    pub fn to_wire(&self) -> Value {
        match self {
            ToolResult::Success(payload) => json!({"ok": true, "payload": payload}),
            ToolResult::Failure(error) => error.to_wire(),
        }
    }

    pub fn from_wire(value: &Value) -> Result<Self, String> {
        match value.get("ok").and_then(Value::as_bool) {
            Some(true) => Ok(ToolResult::Success(
                value.get("payload").cloned().unwrap_or(Value::Null),
            )),
            Some(false) => ToolError::from_wire(value).map(ToolResult::Failure),
            None => Err("tool result is missing the boolean 'ok' flag".to_string()),
        }
    }

    /// Text block handed to the model
    pub fn to_model_text(&self) -> String {
        match self {
            ToolResult::Success(Value::String(text)) => text.clone(),
            ToolResult::Success(payload) => {
                serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string())
            }
            ToolResult::Failure(error) => {
                let wire = error.to_wire();
                serde_json::to_string_pretty(&wire).unwrap_or_else(|_| wire.to_string())
            }
        }
    }
}

impl Serialize for ToolResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ToolResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        ToolResult::from_wire(&value).map_err(serde::de::Error::custom)
    }
}

/// Tool trait - All tools must implement this
///
/// The host validates arguments against `descriptor()` before calling
/// `validate`, and only calls `execute` when both pass.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description and parameter schema
    fn descriptor(&self) -> ToolDescriptor;

    /// Tool-specific checks on already coerced arguments (optional)
    fn validate(&self, _args: &Arguments) -> Result<(), ToolError> {
        Ok(())
    }

    /// Execute the tool and return its payload
    async fn execute(&self, args: Arguments) -> Result<Value, ToolError>;
}
