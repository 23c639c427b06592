//! repotools - conversational agent over a JSON-RPC tool host
//!
//! The agent sends the conversation to a function-calling model, runs the
//! tool calls it asks for through a tool host (greeting plus GitHub issue and
//! pull request tools) and feeds the results back until the model answers.

pub mod agent;
mod config;
pub mod core;
pub mod errors;
pub mod tools;
pub mod utils;

pub mod api;
pub mod cli;

pub use agent::{Agent, AgentOptions, Message, ToolCallRequest, TurnOutcome};
pub use api::*;
pub use config::{AgentConfig, GitHubConfig, LLMConfig, Settings, ToolServerConfig};
pub use errors::{AgentError, ChannelError};

use crate::config::GITHUB_TOKEN_VAR;
use crate::core::{ChannelSource, LLMClient};
use once_cell::sync::OnceCell;

static SYSTEM: OnceCell<System> = OnceCell::new();

pub struct System {
    agent: Agent<LLMClient>,
    source: ChannelSource,
}

impl System {
    fn new(settings: &Settings, api_key: String) -> anyhow::Result<Self> {
        let source = ChannelSource::from_settings(&settings.tool_server)?;
        let agent = Agent::new(
            LLMClient::new(api_key, settings.llm.clone()),
            source.clone(),
            AgentOptions::from(&settings.agent),
        );

        Ok(Self { agent, source })
    }

    fn global() -> anyhow::Result<&'static System> {
        SYSTEM
            .get()
            .ok_or_else(|| anyhow::anyhow!("System not initialized. Call init() first"))
    }
}

/// Initialize the system
/// Must be called before using any API functions
pub async fn init() -> anyhow::Result<()> {
    init_with_settings(Settings::new()?).await
}

/// Initialize from already loaded settings. Both credentials must be present:
/// the model key for the agent, the GitHub token for the tools it will call.
pub async fn init_with_settings(settings: Settings) -> anyhow::Result<()> {
    let api_key = Settings::api_key()?;
    if Settings::github_token().is_none() {
        return Err(AgentError::MissingCredential {
            variable: GITHUB_TOKEN_VAR.to_string(),
        }
        .into());
    }

    let system = System::new(&settings, api_key)?;
    SYSTEM
        .set(system)
        .map_err(|_| anyhow::anyhow!("System already initialized"))?;

    tracing::info!("repotools initialized (model {})", settings.llm.model);
    Ok(())
}
