//! Agent loop
//!
//! Thinking: the model sees the full history plus the discovered tools.
//! Acting: every requested call goes through the channel; results are
//! appended in request order, whatever order they finish in.
//! Terminal: a reply without tool calls is the answer.

use futures::future::join_all;

use super::messages::{validate_history, Message, ToolCallRequest};
use crate::config::AgentConfig;
use crate::core::llm::ModelProvider;
use crate::core::mcp::{ChannelSource, ToolChannel};
use crate::errors::{AgentError, ChannelError};
use crate::tools::{ToolDescriptor, ToolError, ToolResult};

#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub system_prompt: String,
    /// Tool rounds allowed per turn; 0 means the model may not use tools
    pub max_rounds: usize,
    pub parallel_tool_calls: bool,
}

impl From<&AgentConfig> for AgentOptions {
    fn from(config: &AgentConfig) -> Self {
        Self {
            system_prompt: config.system_prompt.clone(),
            max_rounds: config.max_rounds,
            parallel_tool_calls: config.parallel_tool_calls,
        }
    }
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

/// Result of one conversational turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub answer: String,
    /// Input history plus every message this turn appended
    pub history: Vec<Message>,
    /// Tool rounds used
    pub rounds: usize,
}

pub struct Agent<P: ModelProvider> {
    provider: P,
    source: ChannelSource,
    options: AgentOptions,
}

impl<P: ModelProvider> Agent<P> {
    pub fn new(provider: P, source: ChannelSource, options: AgentOptions) -> Self {
        Self {
            provider,
            source,
            options,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// One turn from a single user message
    pub async fn converse(&self, text: &str) -> Result<String, AgentError> {
        let outcome = self.converse_with_history(vec![Message::user(text)]).await?;
        Ok(outcome.answer)
    }

    /// One turn continuing an existing history. The channel is opened for this
    /// turn and closed on the way out, error or not.
    pub async fn converse_with_history(
        &self,
        history: Vec<Message>,
    ) -> Result<TurnOutcome, AgentError> {
        if history.is_empty() {
            return Err(AgentError::InvalidHistory(
                "history must contain at least one message".to_string(),
            ));
        }
        validate_history(&history).map_err(AgentError::InvalidHistory)?;

        let channel = self.source.open()?;
        let outcome = self.start_and_run(&channel, history).await;
        channel.close().await;

        outcome
    }

    async fn start_and_run(
        &self,
        channel: &ToolChannel,
        history: Vec<Message>,
    ) -> Result<TurnOutcome, AgentError> {
        channel.initialize().await?;
        let tools = channel.discover().await?;
        tracing::info!("Conversation started with {} tools", tools.len());

        self.run_with_channel(channel, &tools, history).await
    }

    /// Drive the loop over an already initialized channel
    pub async fn run_with_channel(
        &self,
        channel: &ToolChannel,
        tools: &[ToolDescriptor],
        mut history: Vec<Message>,
    ) -> Result<TurnOutcome, AgentError> {
        let mut rounds = 0;

        loop {
            tracing::info!("Model round {} ({} messages)", rounds + 1, history.len());

            let reply = self
                .provider
                .complete(&self.options.system_prompt, &history, tools)
                .await
                .map_err(|e| AgentError::Model(format!("{:#}", e)))?;

            let calls = reply.requested_calls().to_vec();
            if calls.is_empty() {
                let answer = reply.text().unwrap_or_default().to_string();
                history.push(reply);
                tracing::info!("Turn finished after {} tool rounds", rounds);
                return Ok(TurnOutcome {
                    answer,
                    history,
                    rounds,
                });
            }

            if rounds >= self.options.max_rounds {
                tracing::warn!(
                    "Model asked for tools after {} rounds, giving up",
                    self.options.max_rounds
                );
                return Err(AgentError::MaxRoundsExceeded {
                    max_rounds: self.options.max_rounds,
                });
            }
            rounds += 1;
            history.push(reply);

            let results = self.dispatch(channel, &calls).await?;
            for (call, result) in calls.iter().zip(results) {
                history.push(Message::tool_result(call.id.clone(), result));
            }
        }
    }

    async fn dispatch(
        &self,
        channel: &ToolChannel,
        calls: &[ToolCallRequest],
    ) -> Result<Vec<ToolResult>, AgentError> {
        tracing::info!("Dispatching {} tool calls", calls.len());

        let outcomes = if self.options.parallel_tool_calls {
            join_all(
                calls
                    .iter()
                    .map(|call| channel.call(&call.name, call.arguments.clone())),
            )
            .await
        } else {
            let mut outcomes = Vec::with_capacity(calls.len());
            for call in calls {
                outcomes.push(channel.call(&call.name, call.arguments.clone()).await);
            }
            outcomes
        };

        calls
            .iter()
            .zip(outcomes)
            .map(|(call, outcome)| match outcome {
                Ok(result) => {
                    tracing::info!(
                        tool = %call.name,
                        ok = result.is_success(),
                        "Tool call resolved"
                    );
                    Ok(result)
                }
                // The host refused this one call; the model can still react to it
                Err(ChannelError::Rpc { code, message }) => {
                    tracing::warn!(tool = %call.name, code, "Tool host rejected call: {}", message);
                    Ok(ToolResult::failure(ToolError::execution(format!(
                        "tool host rejected the call ({}): {}",
                        code, message
                    ))))
                }
                Err(fatal) => {
                    tracing::error!(tool = %call.name, "Tool channel failed: {}", fatal);
                    Err(fatal.into())
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mock::MockModel;
    use crate::tools::greet::GreetTool;
    use crate::tools::{Arguments, ParamType, Tool, ToolHost, ToolParameter};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    struct DelayTool;

    #[async_trait]
    impl Tool for DelayTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::new(
                "delay",
                "Wait, then echo the tag",
                vec![
                    ToolParameter::required("tag", ParamType::String, "value to echo"),
                    ToolParameter::required("ms", ParamType::Integer, "delay in ms"),
                ],
            )
        }

        async fn execute(&self, args: Arguments) -> Result<Value, ToolError> {
            let ms = args.get("ms").and_then(Value::as_u64).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(args.get("tag").cloned().unwrap_or(Value::Null))
        }
    }

    fn agent(script: Vec<Message>, options: AgentOptions) -> Agent<MockModel> {
        let mut host = ToolHost::new();
        host.register(Arc::new(GreetTool)).unwrap();
        host.register(Arc::new(DelayTool)).unwrap();

        Agent::new(
            MockModel::new(script),
            ChannelSource::InProcess(Arc::new(host)),
            options,
        )
    }

    /// What a scripted host does with `tools/call`
    #[derive(Clone, Copy)]
    enum OnCall {
        Reject,
        HangUp,
    }

    /// Channel to a hand-written host that answers `initialize` and
    /// `tools/list` normally and misbehaves on `tools/call`
    async fn scripted_channel(on_call: OnCall) -> (ToolChannel, Vec<ToolDescriptor>) {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

        let (agent_side, host_side) = tokio::io::duplex(64 * 1024);
        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(host_side);
            let mut lines = BufReader::new(read).lines();

            while let Ok(Some(line)) = lines.next_line().await {
                let frame: Value = serde_json::from_str(&line).unwrap();
                let Some(id) = frame.get("id").cloned() else {
                    continue;
                };
                let response = match (frame["method"].as_str(), on_call) {
                    (Some("initialize"), _) => json!({"jsonrpc": "2.0", "id": id, "result": {
                        "protocolVersion": "2024-11-05",
                        "serverInfo": {"name": "scripted", "version": "0"},
                        "capabilities": {},
                    }}),
                    (Some("tools/list"), _) => json!({"jsonrpc": "2.0", "id": id, "result": {
                        "tools": [GreetTool.descriptor()],
                    }}),
                    (_, OnCall::Reject) => json!({"jsonrpc": "2.0", "id": id, "error": {
                        "code": -32000,
                        "message": "tool quota exhausted",
                    }}),
                    // Dropping both halves ends the agent's input mid-call
                    (_, OnCall::HangUp) => return,
                };
                let line = format!("{}\n", response);
                write.write_all(line.as_bytes()).await.unwrap();
            }
        });

        let (read, write) = tokio::io::split(agent_side);
        let channel = ToolChannel::connect(read, write, "scripted");
        channel.initialize().await.unwrap();
        let tools = channel.discover().await.unwrap();
        (channel, tools)
    }

    fn greet(id: &str, name: &str) -> ToolCallRequest {
        ToolCallRequest::new(id, "greet", json!({ "name": name }))
    }

    #[tokio::test]
    async fn test_answer_without_tools_takes_one_step() {
        let agent = agent(vec![Message::assistant("Hello!")], AgentOptions::default());

        let outcome = agent
            .converse_with_history(vec![Message::user("hi")])
            .await
            .unwrap();

        assert_eq!(outcome.answer, "Hello!");
        assert_eq!(outcome.rounds, 0);
        assert_eq!(outcome.history.len(), 2);
        assert_eq!(agent.provider().calls(), 1);
        assert_eq!(agent.provider().advertised_tools(), vec!["greet", "delay"]);
    }

    #[tokio::test]
    async fn test_two_calls_give_two_ordered_tool_messages() {
        let agent = agent(
            vec![
                Message::tool_calls(vec![greet("c1", "Ada"), greet("c2", "Bob")]),
                Message::assistant("Greeted both."),
            ],
            AgentOptions::default(),
        );

        let outcome = agent
            .converse_with_history(vec![Message::user("greet Ada and Bob")])
            .await
            .unwrap();

        assert_eq!(outcome.answer, "Greeted both.");
        assert_eq!(outcome.rounds, 1);
        let history = &outcome.history;
        assert_eq!(history.len(), 5);
        assert_eq!(history[2].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(history[2].result(), Some(&ToolResult::success("Hello, Ada! 👋")));
        assert_eq!(history[3].tool_call_id.as_deref(), Some("c2"));
        assert_eq!(history[3].result(), Some(&ToolResult::success("Hello, Bob! 👋")));

        // The second model call saw both results
        let seen = agent.provider().histories();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].len(), 4);
    }

    #[tokio::test]
    async fn test_failing_call_becomes_tool_message() {
        let agent = agent(
            vec![
                Message::tool_calls(vec![
                    ToolCallRequest::new("c1", "drop_database", json!({})),
                    ToolCallRequest::new("c2", "greet", json!("{broken")),
                ]),
                Message::assistant("Sorry, that did not work."),
            ],
            AgentOptions::default(),
        );

        let outcome = agent
            .converse_with_history(vec![Message::user("do it")])
            .await
            .unwrap();

        let unknown = outcome.history[2].result().unwrap();
        assert_eq!(unknown.error().map(ToolError::kind), Some("UnknownTool"));
        let invalid = outcome.history[3].result().unwrap();
        assert_eq!(invalid.error().map(ToolError::kind), Some("InvalidArguments"));
        assert_eq!(outcome.answer, "Sorry, that did not work.");
    }

    #[tokio::test]
    async fn test_max_rounds_exceeded() {
        let options = AgentOptions {
            max_rounds: 2,
            ..AgentOptions::default()
        };
        let agent = agent(
            vec![
                Message::tool_calls(vec![greet("c1", "a")]),
                Message::tool_calls(vec![greet("c2", "b")]),
                Message::tool_calls(vec![greet("c3", "c")]),
            ],
            options,
        );

        let err = agent.converse("loop forever").await.unwrap_err();

        assert!(matches!(err, AgentError::MaxRoundsExceeded { max_rounds: 2 }));
        assert_eq!(agent.provider().calls(), 3);
    }

    #[tokio::test]
    async fn test_parallel_results_keep_request_order() {
        let agent = agent(
            vec![
                Message::tool_calls(vec![
                    ToolCallRequest::new("slow", "delay", json!({"tag": "slow", "ms": 200})),
                    ToolCallRequest::new("fast", "delay", json!({"tag": "fast", "ms": 0})),
                ]),
                Message::assistant("ok"),
            ],
            AgentOptions::default(),
        );

        let outcome = agent
            .converse_with_history(vec![Message::user("go")])
            .await
            .unwrap();

        assert_eq!(outcome.history[2].tool_call_id.as_deref(), Some("slow"));
        assert_eq!(outcome.history[2].result(), Some(&ToolResult::success("slow")));
        assert_eq!(outcome.history[3].tool_call_id.as_deref(), Some("fast"));
    }

    #[tokio::test]
    async fn test_sequential_dispatch() {
        let options = AgentOptions {
            parallel_tool_calls: false,
            ..AgentOptions::default()
        };
        let agent = agent(
            vec![
                Message::tool_calls(vec![greet("c1", "Ada"), greet("c2", "Bob")]),
                Message::assistant("done"),
            ],
            options,
        );

        let outcome = agent
            .converse_with_history(vec![Message::user("go")])
            .await
            .unwrap();
        assert_eq!(outcome.history[3].tool_call_id.as_deref(), Some("c2"));
    }

    #[tokio::test]
    async fn test_history_is_continued() {
        let agent = agent(vec![Message::assistant("Your name is Ada.")], AgentOptions::default());
        let history = vec![
            Message::user("I'm Ada"),
            Message::assistant("Nice to meet you"),
            Message::user("what is my name?"),
        ];

        let outcome = agent.converse_with_history(history).await.unwrap();

        assert_eq!(outcome.history.len(), 4);
        assert_eq!(agent.provider().histories()[0].len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_history_rejected_before_model_call() {
        let agent = agent(vec![Message::assistant("unused")], AgentOptions::default());

        let err = agent
            .converse_with_history(vec![Message::tool_result("x", ToolResult::success("?"))])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidHistory(_)));

        let err = agent.converse_with_history(vec![]).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidHistory(_)));
        assert_eq!(agent.provider().calls(), 0);
    }

    #[tokio::test]
    async fn test_rejected_call_becomes_execution_failure() {
        let agent = agent(
            vec![
                Message::tool_calls(vec![greet("c1", "Ada")]),
                Message::assistant("The tool host is out of quota."),
            ],
            AgentOptions::default(),
        );
        let (channel, tools) = scripted_channel(OnCall::Reject).await;

        let outcome = agent
            .run_with_channel(&channel, &tools, vec![Message::user("greet Ada")])
            .await
            .unwrap();

        assert_eq!(outcome.answer, "The tool host is out of quota.");
        assert_eq!(outcome.history[2].tool_call_id.as_deref(), Some("c1"));
        match outcome.history[2].result().and_then(ToolResult::error) {
            Some(ToolError::ExecutionFailed { reason }) => {
                assert!(reason.contains("-32000"), "{}", reason);
                assert!(reason.contains("tool quota exhausted"), "{}", reason);
            }
            other => panic!("expected ExecutionFailed, got {:?}", other),
        }
        assert_eq!(agent.provider().calls(), 2);
    }

    #[tokio::test]
    async fn test_host_hang_up_mid_call_aborts_turn() {
        let agent = agent(
            vec![
                Message::tool_calls(vec![greet("c1", "Ada")]),
                Message::assistant("unreachable"),
            ],
            AgentOptions::default(),
        );
        let (channel, tools) = scripted_channel(OnCall::HangUp).await;

        let err = agent
            .run_with_channel(&channel, &tools, vec![Message::user("greet Ada")])
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::ChannelTransport(_)), "{:?}", err);
        // The model is not asked again after a fatal channel error
        assert_eq!(agent.provider().calls(), 1);
    }
}
