use anyhow::Result;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use config::builder::DefaultState;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::errors::AgentError;

pub const GITHUB_TOKEN_VAR: &str = "GITHUB_TOKEN";
pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub llm: LLMConfig,
    pub agent: AgentConfig,
    pub github: GitHubConfig,
    pub tool_server: ToolServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_retries: u32,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            max_tokens: 1024,
            temperature: 0.0,
            max_retries: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub max_rounds: usize,
    pub system_prompt: String,
    pub parallel_tool_calls: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: 10,
            system_prompt: "You are a helpful assistant. Use tools when they are relevant."
                .to_string(),
            parallel_tool_calls: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    pub api_url: String,
    pub api_version: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            api_version: "2022-11-28".to_string(),
            timeout_secs: 30,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// How the agent launches the tool host. Without a command the agent re-runs
/// its own executable with `serve`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolServerConfig {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_env = env::var("CONFIG_ENV").unwrap_or_else(|_| "default".to_string());

        Self::finish(
            Self::builder()?
                .add_source(File::with_name(&format!("config/{}", config_env)).required(false)),
        )
    }

    /// Load from an explicit file instead of `config/{CONFIG_ENV}`
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::finish(Self::builder()?.add_source(File::from(path)))
    }

    /// Layers shared by every entry point: `APP__*` variables, then `OPENAI_MODEL`
    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder
            .add_source(Self::environment())
            .set_override_option("llm.model", env::var("OPENAI_MODEL").ok())?
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Ok(Config::builder().add_source(Config::try_from(&Settings::default())?))
    }

    fn environment() -> Environment {
        Environment::with_prefix("APP")
            .separator("__")
            .try_parsing(true)
    }

    /// Model API key; required before the agent starts
    pub fn api_key() -> Result<String, AgentError> {
        non_empty_var(OPENAI_API_KEY_VAR).ok_or_else(|| AgentError::MissingCredential {
            variable: OPENAI_API_KEY_VAR.to_string(),
        })
    }

    /// Repository API bearer credential, if configured
    pub fn github_token() -> Option<String> {
        non_empty_var(GITHUB_TOKEN_VAR)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
