pub mod github;
pub mod llm;
pub mod mcp;
pub mod mock;
pub mod protocol;
pub mod server;

pub use llm::{LLMClient, ModelProvider};
pub use mcp::{ChannelSource, ToolChannel};
pub use mock::MockModel;
