use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::llm::ModelProvider;
use crate::agent::messages::Message;
use crate::tools::ToolDescriptor;

/// Scripted model for tests and offline demos: replays the given responses in
/// order and records each history it was shown
pub struct MockModel {
    responses: Mutex<VecDeque<Message>>,
    seen: Mutex<Vec<Vec<Message>>>,
    tools_seen: Mutex<Vec<String>>,
}

impl MockModel {
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            seen: Mutex::new(Vec::new()),
            tools_seen: Mutex::new(Vec::new()),
        }
    }

    /// Histories passed to each `complete` call, oldest first
    pub fn histories(&self) -> Vec<Vec<Message>> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }

    /// Tool names advertised on the most recent call
    pub fn advertised_tools(&self) -> Vec<String> {
        self.tools_seen
            .lock()
            .map(|tools| tools.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().map(|seen| seen.len()).unwrap_or_default()
    }
}

#[async_trait]
impl ModelProvider for MockModel {
    async fn complete(
        &self,
        _system_prompt: &str,
        history: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<Message> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(history.to_vec());
        }
        if let Ok(mut tools_seen) = self.tools_seen.lock() {
            *tools_seen = tools.iter().map(|t| t.name.clone()).collect();
        }

        let next = self
            .responses
            .lock()
            .map_err(|_| anyhow::anyhow!("mock model state poisoned"))?
            .pop_front();

        // Out of script: answer with empty text, like a model with nothing to add
        Ok(next.unwrap_or_else(|| Message::assistant("")))
    }
}
