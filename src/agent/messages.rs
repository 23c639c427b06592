//! Conversation history types
//!
//! History is append-only. A `tool` message answers exactly one earlier
//! tool-call request, linked by the request's id.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::tools::ToolResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// One tool invocation the model asked for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// Usually an object; a string when the model's arguments were not valid JSON
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    ToolCalls { calls: Vec<ToolCallRequest> },
    ToolResult { result: ToolResult },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text { text: text.into() },
            tool_call_id: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text { text: text.into() },
            tool_call_id: None,
        }
    }

    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::ToolCalls { calls },
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, result: ToolResult) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::ToolResult { result },
            tool_call_id: Some(call_id.into()),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Requested calls; empty unless this is a tool-call message
    pub fn requested_calls(&self) -> &[ToolCallRequest] {
        match &self.content {
            MessageContent::ToolCalls { calls } => calls,
            _ => &[],
        }
    }

    pub fn result(&self) -> Option<&ToolResult> {
        match &self.content {
            MessageContent::ToolResult { result } => Some(result),
            _ => None,
        }
    }
}

/// Check role/content pairing and that every tool message answers an earlier,
/// still unanswered call
pub fn validate_history(history: &[Message]) -> Result<(), String> {
    let mut unanswered: HashSet<&str> = HashSet::new();

    for (index, message) in history.iter().enumerate() {
        match (message.role, &message.content) {
            (Role::User, MessageContent::Text { .. }) => {}
            (Role::Assistant, MessageContent::Text { .. }) => {}
            (Role::Assistant, MessageContent::ToolCalls { calls }) => {
                for call in calls {
                    if !unanswered.insert(call.id.as_str()) {
                        return Err(format!(
                            "message {}: duplicate tool call id '{}'",
                            index, call.id
                        ));
                    }
                }
            }
            (Role::Tool, MessageContent::ToolResult { .. }) => {
                let Some(id) = message.tool_call_id.as_deref() else {
                    return Err(format!("message {}: tool message without a call id", index));
                };
                if !unanswered.remove(id) {
                    return Err(format!(
                        "message {}: tool message answers unknown or already answered call '{}'",
                        index, id
                    ));
                }
            }
            (role, _) => {
                return Err(format!(
                    "message {}: content not allowed for role {:?}",
                    index, role
                ))
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str) -> ToolCallRequest {
        ToolCallRequest::new(id, "greet", json!({"name": "x"}))
    }

    #[test]
    fn test_valid_history() {
        let history = vec![
            Message::user("hi"),
            Message::tool_calls(vec![call("a"), call("b")]),
            Message::tool_result("a", ToolResult::success("one")),
            Message::tool_result("b", ToolResult::success("two")),
            Message::assistant("done"),
        ];

        assert!(validate_history(&history).is_ok());
    }

    #[test]
    fn test_tool_message_must_match_a_pending_call() {
        let orphan = vec![
            Message::user("hi"),
            Message::tool_result("zzz", ToolResult::success("x")),
        ];
        assert!(validate_history(&orphan).is_err());

        let answered_twice = vec![
            Message::tool_calls(vec![call("a")]),
            Message::tool_result("a", ToolResult::success("x")),
            Message::tool_result("a", ToolResult::success("y")),
        ];
        assert!(validate_history(&answered_twice).is_err());
    }

    #[test]
    fn test_role_content_mismatch() {
        let mut message = Message::user("hi");
        message.content = MessageContent::ToolCalls { calls: vec![] };

        assert!(validate_history(&[message]).is_err());
    }

    #[test]
    fn test_message_serialization() {
        let message = Message::tool_result("call_1", ToolResult::success(json!({"number": 1})));
        let wire = serde_json::to_value(&message).unwrap();

        assert_eq!(wire["role"], json!("tool"));
        assert_eq!(wire["tool_call_id"], json!("call_1"));
        assert_eq!(wire["content"]["type"], json!("tool_result"));
        assert_eq!(wire["content"]["result"]["ok"], json!(true));

        let decoded: Message = serde_json::from_value(wire).unwrap();
        assert_eq!(decoded, message);
    }
}
