//! Integration tests for repotools
//!
//! These tests run without API keys: GitHub is stubbed with wiremock and the
//! model is scripted.

use repotools::core::github::GitHubClient;
use repotools::core::{ChannelSource, MockModel, ToolChannel};
use repotools::tools::{ToolError, ToolHost, ToolResult};
use repotools::{Agent, AgentOptions, GitHubConfig, Message, Settings, ToolCallRequest};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn host_for(server: &MockServer) -> Arc<ToolHost> {
    let config = GitHubConfig {
        api_url: server.uri(),
        ..GitHubConfig::default()
    };
    let client = GitHubClient::new(&config, Some("ghp_test".to_string())).unwrap();
    Arc::new(ToolHost::with_defaults(Arc::new(client)).unwrap())
}

fn agent_for(host: Arc<ToolHost>, script: Vec<Message>) -> Agent<MockModel> {
    Agent::new(
        MockModel::new(script),
        ChannelSource::InProcess(host),
        AgentOptions::default(),
    )
}

#[tokio::test]
async fn test_create_issue_conversation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/octo/demo/issues"))
        .and(header("authorization", "Bearer ghp_test"))
        .and(body_json(json!({"title": "Login button broken", "labels": ["bug"]})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "number": 1,
            "html_url": "https://github.com/octo/demo/issues/1",
            "id": 9,
            "state": "open",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let agent = agent_for(
        host_for(&server),
        vec![
            Message::tool_calls(vec![ToolCallRequest::new(
                "call_1",
                "gh_create_issue",
                json!({"owner": "octo", "repo": "demo", "title": "Login button broken", "labels": ["bug"]}),
            )]),
            Message::assistant("Created issue #1."),
        ],
    );

    let outcome = agent
        .converse_with_history(vec![Message::user("File a bug: login button broken")])
        .await
        .unwrap();

    assert_eq!(outcome.answer, "Created issue #1.");
    assert_eq!(outcome.rounds, 1);
    assert_eq!(
        outcome.history[2].result(),
        Some(&ToolResult::success(json!({
            "number": 1,
            "url": "https://github.com/octo/demo/issues/1",
            "id": 9,
            "state": "open",
        })))
    );
}

#[tokio::test]
async fn test_remote_error_is_shown_to_the_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/octo/missing/issues"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
        .mount(&server)
        .await;

    let agent = agent_for(
        host_for(&server),
        vec![
            Message::tool_calls(vec![ToolCallRequest::new(
                "call_1",
                "gh_create_issue",
                json!({"owner": "octo", "repo": "missing", "title": "t"}),
            )]),
            Message::assistant("That repository does not exist."),
        ],
    );

    let outcome = agent
        .converse_with_history(vec![Message::user("open an issue")])
        .await
        .unwrap();

    let seen = agent.provider().histories();
    let failure = seen[1][2].result().unwrap();
    assert_eq!(
        failure.error(),
        Some(&ToolError::RemoteApi {
            status: Some(404),
            detail: json!({"message": "Not Found"}),
        })
    );
    assert_eq!(outcome.answer, "That repository does not exist.");
}

#[tokio::test]
async fn test_list_open_issues_through_channel() {
    let server = MockServer::start().await;
    let mut page = vec![json!({"number": 99, "title": "PR", "pull_request": {}})];
    page.extend((1..=9).map(|n| {
        json!({
            "number": n,
            "title": format!("Issue {}", n),
            "html_url": format!("https://github.com/octo/demo/issues/{}", n),
            "state": "open",
            "labels": [{"name": "bug"}],
            "assignees": [],
        })
    }));
    Mock::given(method("GET"))
        .and(path("/repos/octo/demo/issues"))
        .and(query_param("state", "open"))
        .and(query_param("per_page", "5"))
        .and(query_param("labels", "bug"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page))
        .expect(1)
        .mount(&server)
        .await;

    let channel = ToolChannel::in_process(host_for(&server));
    channel.initialize().await.unwrap();

    let result = channel
        .call(
            "gh_list_open_issues",
            json!({"owner": "octo", "repo": "demo", "labels": ["bug"], "limit": 5}),
        )
        .await
        .unwrap();
    channel.close().await;

    let issues = result.payload().unwrap().as_array().unwrap().clone();
    assert_eq!(issues.len(), 5);
    assert_eq!(issues[0]["number"], json!(1));
    assert_eq!(issues[0]["labels"], json!(["bug"]));
}

#[tokio::test]
async fn test_discover_matches_registry() {
    let server = MockServer::start().await;
    let host = host_for(&server);

    let channel = ToolChannel::in_process(Arc::clone(&host));
    channel.initialize().await.unwrap();
    let discovered = channel.discover().await.unwrap();
    channel.close().await;

    assert_eq!(discovered, host.list_tools());
    let names: Vec<_> = discovered.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["greet", "gh_create_issue", "gh_open_pull_request", "gh_list_open_issues"]
    );
}

#[tokio::test]
async fn test_stdio_host_process_from_config_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        "[tool_server]\ncommand = {:?}\nargs = [\"serve\"]",
        env!("CARGO_BIN_EXE_repotools")
    )
    .unwrap();

    let settings = Settings::from_file(file.path()).unwrap();
    let source = ChannelSource::from_settings(&settings.tool_server).unwrap();

    let tools = repotools::api::tools::list_from(&source).await.unwrap();
    assert_eq!(tools.len(), 4);

    let result = repotools::api::tools::call_via(&source, "greet", json!({"name": "Ada"}))
        .await
        .unwrap();
    assert_eq!(result, ToolResult::success("Hello, Ada! 👋"));

    let unknown = repotools::api::tools::call_via(&source, "nope", json!({}))
        .await
        .unwrap();
    assert_eq!(unknown.error().map(ToolError::kind), Some("UnknownTool"));
}

#[tokio::test]
async fn test_spawned_host_exits_when_channel_closes() {
    let source = ChannelSource::Process {
        command: env!("CARGO_BIN_EXE_repotools").to_string(),
        args: vec!["serve".to_string()],
    };

    let channel = source.open().unwrap();
    channel.initialize().await.unwrap();
    assert_eq!(channel.discover().await.unwrap().len(), 4);

    // Closing stdin must be enough; the 2 s grace period before a kill is never reached
    let started = Instant::now();
    channel.close().await;
    let elapsed = started.elapsed();
    assert!(elapsed < Duration::from_millis(1500), "close took {:?}", elapsed);
}
