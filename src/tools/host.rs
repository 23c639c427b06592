//! Tool Host
//!
//! Information Hiding:
//! - Tool storage and lookup implementation hidden
//! - Argument validation applied uniformly before dispatch
//! - Tool failures and panics converted into `ToolResult` values
//!
//! The host is built once at startup and shared behind an `Arc` afterwards, so
//! the advertised tool set cannot change during a conversation.

use super::github::{CreateIssueTool, ListOpenIssuesTool, OpenPullRequestTool};
use super::greet::GreetTool;
use super::{Arguments, Tool, ToolDescriptor, ToolError, ToolResult};
use crate::config::{Settings, GITHUB_TOKEN_VAR};
use crate::core::github::GitHubClient;
use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

struct Registration {
    descriptor: ToolDescriptor,
    tool: Arc<dyn Tool>,
}

/// Ordered registry of tools plus the invocation entry point
pub struct ToolHost {
    tools: Vec<Registration>,
    index: HashMap<String, usize>,
}

impl ToolHost {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a new tool. Names must be unique.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let descriptor = tool.descriptor();
        if self.index.contains_key(&descriptor.name) {
            anyhow::bail!("Tool '{}' is already registered", descriptor.name);
        }

        tracing::info!("Registering tool: {}", descriptor.name);
        self.index.insert(descriptor.name.clone(), self.tools.len());
        self.tools.push(Registration { descriptor, tool });
        Ok(())
    }

    /// Greeting plus the repository tools, all sharing one API client
    pub fn with_defaults(github: Arc<GitHubClient>) -> Result<Self> {
        let mut host = Self::new();

        host.register(Arc::new(GreetTool))?;
        host.register(Arc::new(CreateIssueTool::new(Arc::clone(&github))))?;
        host.register(Arc::new(OpenPullRequestTool::new(Arc::clone(&github))))?;
        host.register(Arc::new(ListOpenIssuesTool::new(github)))?;

        Ok(host)
    }

    /// Default tools wired to the configured API. A missing token is not fatal
    /// here; the repository tools report it on every call instead.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let token = Settings::github_token();
        if token.is_none() {
            tracing::warn!(
                "{} is not set; repository tools will fail with MissingCredential",
                GITHUB_TOKEN_VAR
            );
        }

        let client = GitHubClient::new(&settings.github, token)?;
        Self::with_defaults(Arc::new(client))
    }

    /// Tool names in registration order
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|r| r.descriptor.name.clone()).collect()
    }

    /// Descriptors in registration order
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|r| r.descriptor.clone()).collect()
    }

    /// Human-readable listing for terminals and logs
    pub fn tools_description(&self) -> String {
        describe_tools(&self.list_tools())
    }

    /// Validate and run one tool call. Never fails: every problem becomes a
    /// `ToolResult::Failure`.
    pub async fn invoke(&self, name: &str, arguments: Value) -> ToolResult {
        let Some(&slot) = self.index.get(name) else {
            tracing::warn!(tool = name, "Call for unknown tool");
            return ToolResult::failure(ToolError::UnknownTool {
                name: name.to_string(),
            });
        };
        let registration = &self.tools[slot];

        let args = match Arguments::validate(&registration.descriptor, arguments)
            .and_then(|args| registration.tool.validate(&args).map(|_| args))
        {
            Ok(args) => args,
            Err(error) => {
                tracing::info!(tool = name, %error, "Rejected tool arguments");
                return ToolResult::failure(error);
            }
        };

        let started = Instant::now();
        let tool = Arc::clone(&registration.tool);
        // A separate task keeps a panicking tool from taking the host down.
        let outcome = tokio::spawn(async move { tool.execute(args).await }).await;

        let result = match outcome {
            Ok(Ok(payload)) => ToolResult::success(payload),
            Ok(Err(error)) => ToolResult::failure(error),
            Err(join_error) if join_error.is_panic() => {
                tracing::error!(tool = name, "Tool panicked");
                ToolResult::failure(ToolError::execution(format!("tool '{}' panicked", name)))
            }
            Err(_) => ToolResult::failure(ToolError::execution(format!(
                "tool '{}' was cancelled",
                name
            ))),
        };

        tracing::info!(
            tool = name,
            ok = result.is_success(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Tool invocation finished"
        );
        result
    }
}

impl Default for ToolHost {
    fn default() -> Self {
        Self::new()
    }
}

/// Format descriptors the way the CLI and logs show them
pub fn describe_tools(tools: &[ToolDescriptor]) -> String {
    let mut descriptions = Vec::new();
    for descriptor in tools {
        let params = descriptor
            .parameters
            .iter()
            .map(|p| {
                let required = if p.required { "required" } else { "optional" };
                let default = p
                    .default
                    .as_ref()
                    .map(|d| format!(", default {}", d))
                    .unwrap_or_default();
                format!(
                    "  - {} ({}): {} [{}{}]",
                    p.name, p.param_type, p.description, required, default
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        descriptions.push(format!(
            "Tool: {}\nDescription: {}\nParameters:\n{}",
            descriptor.name, descriptor.description, params
        ));
    }
    descriptions.join("\n\n")
}
