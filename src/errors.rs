//! Errors that end a channel or a conversation
//!
//! Tool failures are not here: those are values (`tools::ToolError`) that the
//! model gets to see. These errors are the ones that abort.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Tool channel used before the initialize exchange completed")]
    NotReady,

    #[error("Failed to spawn tool host '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Tool channel transport error: {message}")]
    Transport { message: String },

    #[error("Tool host sent an invalid response: {message}")]
    Protocol { message: String },

    #[error("Tool host returned JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl ChannelError {
    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("{variable} is not set")]
    MissingCredential { variable: String },

    #[error("Tool channel is not ready")]
    ChannelNotReady,

    #[error("Tool channel failed: {0}")]
    ChannelTransport(String),

    #[error("Conversation exceeded the maximum of {max_rounds} tool rounds")]
    MaxRoundsExceeded { max_rounds: usize },

    #[error("Model call failed: {0}")]
    Model(String),

    #[error("Invalid conversation history: {0}")]
    InvalidHistory(String),
}

impl From<ChannelError> for AgentError {
    fn from(error: ChannelError) -> Self {
        match error {
            ChannelError::NotReady => AgentError::ChannelNotReady,
            other => AgentError::ChannelTransport(other.to_string()),
        }
    }
}
