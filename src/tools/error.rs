//! Tool failure taxonomy
//!
//! Every failure a tool invocation can produce is one of these variants. They
//! travel across the channel as `{ "ok": false, "kind": ..., "message": ... }`
//! objects, so the agent loop can show them to the model instead of aborting.

use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    #[error("Tool '{name}' is not registered")]
    UnknownTool { name: String },

    #[error("Invalid arguments: {reason}")]
    InvalidArguments { reason: String },

    #[error("{variable} is not set; repository tools need a bearer credential")]
    MissingCredential { variable: String },

    #[error("Remote API error{}: {}", status_suffix(.status), detail_text(.detail))]
    RemoteApi { status: Option<u16>, detail: Value },

    #[error("Tool execution failed: {reason}")]
    ExecutionFailed { reason: String },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|code| format!(" [{}]", code)).unwrap_or_default()
}

fn detail_text(detail: &Value) -> String {
    match detail {
        Value::String(text) => text.clone(),
        Value::Object(map) => match map.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => detail.to_string(),
        },
        other => other.to_string(),
    }
}

impl ToolError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            reason: reason.into(),
        }
    }

    pub fn execution(reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            reason: reason.into(),
        }
    }

    /// Stable kind name used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool { .. } => "UnknownTool",
            Self::InvalidArguments { .. } => "InvalidArguments",
            Self::MissingCredential { .. } => "MissingCredential",
            Self::RemoteApi { .. } => "RemoteAPIError",
            Self::ExecutionFailed { .. } => "ExecutionFailed",
        }
    }

    /// Encode as a failure result object
    pub fn to_wire(&self) -> Value {
        let mut object = Map::new();
        object.insert("ok".to_string(), Value::Bool(false));
        object.insert("kind".to_string(), json!(self.kind()));
        object.insert("message".to_string(), json!(self.to_string()));

        match self {
            Self::UnknownTool { name } => {
                object.insert("name".to_string(), json!(name));
            }
            Self::InvalidArguments { reason } | Self::ExecutionFailed { reason } => {
                object.insert("reason".to_string(), json!(reason));
            }
            Self::MissingCredential { variable } => {
                object.insert("variable".to_string(), json!(variable));
            }
            Self::RemoteApi { status, detail } => {
                object.insert("status".to_string(), json!(status));
                object.insert("detail".to_string(), detail.clone());
            }
        }

        Value::Object(object)
    }

    /// Decode a failure result object. Unrecognised kinds are kept as
    /// `ExecutionFailed` carrying the sender's message.
    pub fn from_wire(value: &Value) -> Result<Self, String> {
        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| "failure result is missing 'kind'".to_string())?;
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_string);

        Ok(match kind {
            "UnknownTool" => Self::UnknownTool {
                name: field("name").unwrap_or_default(),
            },
            "InvalidArguments" => Self::InvalidArguments {
                reason: field("reason").unwrap_or(message),
            },
            "MissingCredential" => Self::MissingCredential {
                variable: field("variable").unwrap_or_else(|| "GITHUB_TOKEN".to_string()),
            },
            "RemoteAPIError" => Self::RemoteApi {
                status: value
                    .get("status")
                    .and_then(Value::as_u64)
                    .and_then(|code| u16::try_from(code).ok()),
                detail: value.get("detail").cloned().unwrap_or(Value::Null),
            },
            "ExecutionFailed" => Self::ExecutionFailed {
                reason: field("reason").unwrap_or(message),
            },
            other => Self::ExecutionFailed {
                reason: format!("{}: {}", other, message),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_wire_shape() {
        let error = ToolError::RemoteApi {
            status: Some(404),
            detail: json!({"message": "Not Found"}),
        };

        let wire = error.to_wire();
        assert_eq!(wire["ok"], json!(false));
        assert_eq!(wire["kind"], json!("RemoteAPIError"));
        assert_eq!(wire["status"], json!(404));
        assert_eq!(wire["message"], json!("Remote API error [404]: Not Found"));

        assert_eq!(ToolError::from_wire(&wire).unwrap(), error);
    }

    #[test]
    fn test_timeout_has_no_status() {
        let error = ToolError::RemoteApi {
            status: None,
            detail: json!({"message": "request timed out after 30s"}),
        };

        let wire = error.to_wire();
        assert!(wire["status"].is_null());
        assert_eq!(error.to_string(), "Remote API error: request timed out after 30s");
    }

    #[test]
    fn test_unknown_kind_is_preserved_as_execution_failure() {
        let wire = json!({"ok": false, "kind": "Exploded", "message": "boom"});
        let error = ToolError::from_wire(&wire).unwrap();

        assert_eq!(error, ToolError::execution("Exploded: boom"));
    }

    #[test]
    fn test_missing_kind_is_rejected() {
        assert!(ToolError::from_wire(&json!({"ok": false})).is_err());
    }
}
