//! Simple async API facade
//!
//! Each call opens its own tool channel and closes it before returning, so no
//! state is shared between conversations apart from the configuration.

use crate::agent::{Message, TurnOutcome};
use crate::System;
use anyhow::Result;

/// One conversational turn from a single prompt
///
/// # Example
/// ```no_run
/// use repotools::{init, converse};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     init().await?;
///     let answer = converse("List open bugs in rust-lang/rust").await?;
///     println!("{}", answer);
///     Ok(())
/// }
/// ```
pub async fn converse(prompt: impl Into<String>) -> Result<String> {
    let system = System::global()?;
    let prompt: String = prompt.into();
    Ok(system.agent.converse(&prompt).await?)
}

/// Continue a conversation; returns the answer and the extended history
pub async fn converse_with_history(history: Vec<Message>) -> Result<TurnOutcome> {
    let system = System::global()?;
    Ok(system.agent.converse_with_history(history).await?)
}

/// Multi-turn conversation that keeps its history between turns
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    history: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Run one turn. On failure the history is left as it was before the call.
    pub async fn send(&mut self, message: impl Into<String>) -> Result<String> {
        let mut history = self.history.clone();
        history.push(Message::user(message));

        let outcome = converse_with_history(history).await?;
        self.history = outcome.history;
        Ok(outcome.answer)
    }
}

/// Direct access to the tool host, without the model
pub mod tools {
    use super::*;
    use crate::core::ChannelSource;
    use crate::tools::{ToolDescriptor, ToolResult};
    use serde_json::Value;

    pub async fn list() -> Result<Vec<ToolDescriptor>> {
        list_from(&System::global()?.source).await
    }

    pub async fn call(name: &str, arguments: Value) -> Result<ToolResult> {
        call_via(&System::global()?.source, name, arguments).await
    }

    /// Discover tools from a specific host
    pub async fn list_from(source: &ChannelSource) -> Result<Vec<ToolDescriptor>> {
        let channel = source.open()?;
        let listed = match channel.initialize().await {
            Ok(_) => channel.discover().await,
            Err(e) => Err(e),
        };
        channel.close().await;

        Ok(listed?)
    }

    /// Invoke one tool on a specific host
    pub async fn call_via(
        source: &ChannelSource,
        name: &str,
        arguments: Value,
    ) -> Result<ToolResult> {
        let channel = source.open()?;
        let result = match channel.initialize().await {
            Ok(_) => channel.call(name, arguments).await,
            Err(e) => Err(e),
        };
        channel.close().await;

        Ok(result?)
    }
}
