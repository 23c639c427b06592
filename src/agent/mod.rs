pub mod messages;
pub mod runner;

pub use messages::{validate_history, Message, MessageContent, Role, ToolCallRequest};
pub use runner::{Agent, AgentOptions, TurnOutcome};
