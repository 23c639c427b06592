use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::agent::messages::{Message, MessageContent, Role, ToolCallRequest};
use crate::config::LLMConfig;
use crate::tools::ToolDescriptor;

/// Anything that can produce the next assistant message for a history
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<Message>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON text, as the API transmits it
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// OpenAI-compatible chat completions client with function calling
pub struct LLMClient {
    client: Client,
    api_key: String,
    config: LLMConfig,
}

impl LLMClient {
    pub fn new(api_key: String, config: LLMConfig) -> Self {
        Self {
            client: Client::new(),
            api_key,
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let attempts = self.config.max_retries.saturating_add(1);

        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = retry_delay_ms(attempt);
                tracing::warn!(
                    "[LLMClient] Retrying API call (attempt {}/{}) after {}ms delay",
                    attempt + 1,
                    attempts,
                    delay
                );
                tokio::time::sleep(tokio::time::Duration::from_millis(delay)).await;
            }

            let response = match self
                .client
                .post(self.endpoint())
                .bearer_auth(&self.api_key)
                .json(request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!("[LLMClient] HTTP request failed: {}", e);
                    last_error = Some(anyhow::anyhow!("HTTP request failed: {}", e));
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                tracing::warn!(
                    "[LLMClient] API returned error status {}: {}",
                    status,
                    error_text
                );
                last_error = Some(anyhow::anyhow!("API error {}: {}", status, error_text));
                continue;
            }

            match response.json::<ChatResponse>().await {
                Ok(chat_response) => return Ok(chat_response),
                Err(e) => {
                    tracing::warn!("[LLMClient] Failed to decode response body: {}", e);
                    last_error = Some(anyhow::anyhow!("Response decode error: {}", e));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("All retry attempts failed")))
    }
}

#[async_trait]
impl ModelProvider for LLMClient {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<Message> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: to_chat_messages(system_prompt, history),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            tools: tools.iter().map(function_spec).collect(),
        };

        tracing::debug!(
            "[LLMClient] Sending {} messages, {} tools",
            request.messages.len(),
            request.tools.len()
        );

        let response = self.send(&request).await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Model returned no choices"))?;

        Ok(from_chat_message(choice.message))
    }
}

fn function_spec(descriptor: &ToolDescriptor) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": descriptor.name,
            "description": descriptor.description,
            "parameters": descriptor.input_schema(),
        }
    })
}

fn to_chat_messages(system_prompt: &str, history: &[Message]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    if !system_prompt.is_empty() {
        messages.push(ChatMessage::text("system", system_prompt));
    }

    for message in history {
        let converted = match (&message.role, &message.content) {
            (Role::User, MessageContent::Text { text }) => ChatMessage::text("user", text.as_str()),
            (Role::Assistant, MessageContent::Text { text }) => {
                ChatMessage::text("assistant", text.as_str())
            }
            (_, MessageContent::ToolCalls { calls }) => ChatMessage {
                role: "assistant".to_string(),
                content: None,
                tool_calls: Some(calls.iter().map(to_wire_call).collect()),
                tool_call_id: None,
            },
            (_, MessageContent::ToolResult { result }) => ChatMessage {
                role: "tool".to_string(),
                content: Some(result.to_model_text()),
                tool_calls: None,
                tool_call_id: message.tool_call_id.clone(),
            },
            (Role::Tool, MessageContent::Text { text }) => ChatMessage {
                role: "tool".to_string(),
                content: Some(text.clone()),
                tool_calls: None,
                tool_call_id: message.tool_call_id.clone(),
            },
        };
        messages.push(converted);
    }

    messages
}

fn to_wire_call(call: &ToolCallRequest) -> WireToolCall {
    let arguments = match &call.arguments {
        // Undecodable arguments go back exactly as the model sent them
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    };

    WireToolCall {
        id: call.id.clone(),
        call_type: function_type(),
        function: WireFunctionCall {
            name: call.name.clone(),
            arguments,
        },
    }
}

fn from_chat_message(message: ChatMessage) -> Message {
    match message.tool_calls {
        Some(calls) if !calls.is_empty() => Message::tool_calls(
            calls
                .into_iter()
                .map(|call| {
                    let arguments = parse_arguments(&call.function.arguments);
                    ToolCallRequest::new(call.id, call.function.name, arguments)
                })
                .collect(),
        ),
        _ => Message::assistant(message.content.unwrap_or_default()),
    }
}

fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| {
        tracing::warn!("[LLMClient] Model sent arguments that are not JSON: {}", raw);
        Value::String(raw.to_string())
    })
}

const BASE_DELAY_MS: u64 = 1000;
const MAX_DELAY_MS: u64 = 30_000;

/// Exponential backoff before retry number `attempt` (1-based), capped
fn retry_delay_ms(attempt: u32) -> u64 {
    let factor = 2_u64.checked_pow(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    BASE_DELAY_MS.saturating_mul(factor).min(MAX_DELAY_MS)
}
