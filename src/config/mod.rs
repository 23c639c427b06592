mod settings;

pub use settings::{
    AgentConfig, GitHubConfig, LLMConfig, Settings, ToolServerConfig, GITHUB_TOKEN_VAR,
};
