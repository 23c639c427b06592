//! Repository tools backed by the GitHub REST API
//!
//! Each tool checks its identifiers, then hands typed arguments to the shared
//! `GitHubClient`. Failures come back as `ToolError` values.

use super::{Arguments, ParamType, Tool, ToolDescriptor, ToolError, ToolParameter};
use crate::core::github::{
    GitHubClient, NewIssue, NewPullRequest, OpenIssuesQuery, DEFAULT_ISSUE_LIMIT,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

static REPO_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("valid segment pattern"));

/// Owner and repo are spliced into the request path, so they must be single
/// path segments
fn check_segment(args: &Arguments, field: &str) -> Result<(), ToolError> {
    let value = args.get_str(field).unwrap_or_default();
    if value.trim().is_empty() {
        return Err(ToolError::invalid(format!("'{}' must not be empty", field)));
    }
    if value == "." || value == ".." || !REPO_SEGMENT.is_match(value) {
        return Err(ToolError::invalid(format!(
            "'{}' is not a valid repository name segment: {:?}",
            field, value
        )));
    }
    Ok(())
}

fn check_non_empty(args: &Arguments, field: &str) -> Result<(), ToolError> {
    match args.get_str(field) {
        Some(value) if !value.trim().is_empty() => Ok(()),
        _ => Err(ToolError::invalid(format!("'{}' must not be empty", field))),
    }
}

fn to_payload<T: Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::execution(e.to_string()))
}

fn owner_param() -> ToolParameter {
    ToolParameter::required("owner", ParamType::String, "Repository owner (user or organization)")
}

fn repo_param() -> ToolParameter {
    ToolParameter::required("repo", ParamType::String, "Repository name")
}

pub struct CreateIssueTool {
    client: Arc<GitHubClient>,
}

impl CreateIssueTool {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for CreateIssueTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "gh_create_issue",
            "Create a GitHub issue in owner/repo. Returns the issue number, URL, id and state.",
            vec![
                owner_param(),
                repo_param(),
                ToolParameter::required("title", ParamType::String, "Issue title"),
                ToolParameter::optional(
                    "body",
                    ParamType::String,
                    "Issue body (Markdown)",
                    Some(json!("")),
                ),
                ToolParameter::optional(
                    "labels",
                    ParamType::Array,
                    "Label names to apply",
                    Some(json!([])),
                ),
                ToolParameter::optional(
                    "assignees",
                    ParamType::Array,
                    "Usernames to assign",
                    Some(json!([])),
                ),
            ],
        )
    }

    fn validate(&self, args: &Arguments) -> Result<(), ToolError> {
        check_segment(args, "owner")?;
        check_segment(args, "repo")?;
        check_non_empty(args, "title")
    }

    async fn execute(&self, args: Arguments) -> Result<Value, ToolError> {
        let issue: NewIssue = args.parse()?;
        let created = self.client.create_issue(&issue).await?;
        to_payload(&created)
    }
}

pub struct OpenPullRequestTool {
    client: Arc<GitHubClient>,
}

impl OpenPullRequestTool {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for OpenPullRequestTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "gh_open_pull_request",
            "Open a pull request in owner/repo from head into base. Returns the PR number, URL, id and state.",
            vec![
                owner_param(),
                repo_param(),
                ToolParameter::required(
                    "head",
                    ParamType::String,
                    "Branch with the changes; use 'user:branch' for a fork",
                ),
                ToolParameter::required("base", ParamType::String, "Branch to merge into"),
                ToolParameter::required("title", ParamType::String, "Pull request title"),
                ToolParameter::optional(
                    "body",
                    ParamType::String,
                    "Pull request description",
                    Some(json!("")),
                ),
                ToolParameter::optional(
                    "draft",
                    ParamType::Boolean,
                    "Open as a draft",
                    Some(json!(false)),
                ),
                ToolParameter::optional(
                    "maintainer_can_modify",
                    ParamType::Boolean,
                    "Allow maintainers to push to the head branch",
                    Some(json!(true)),
                ),
            ],
        )
    }

    fn validate(&self, args: &Arguments) -> Result<(), ToolError> {
        check_segment(args, "owner")?;
        check_segment(args, "repo")?;
        check_non_empty(args, "head")?;
        check_non_empty(args, "base")?;
        check_non_empty(args, "title")
    }

    async fn execute(&self, args: Arguments) -> Result<Value, ToolError> {
        let pull: NewPullRequest = args.parse()?;
        let created = self.client.open_pull_request(&pull).await?;
        to_payload(&created)
    }
}

pub struct ListOpenIssuesTool {
    client: Arc<GitHubClient>,
}

impl ListOpenIssuesTool {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for ListOpenIssuesTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "gh_list_open_issues",
            "List open issues (pull requests excluded) in owner/repo, optionally filtered by labels or assignee.",
            vec![
                owner_param(),
                repo_param(),
                ToolParameter::optional(
                    "labels",
                    ParamType::Array,
                    "Only issues carrying all of these labels",
                    Some(json!([])),
                ),
                ToolParameter::optional(
                    "assignee",
                    ParamType::String,
                    "Username, or '*' for issues with any assignee",
                    None,
                ),
                ToolParameter::optional(
                    "limit",
                    ParamType::Integer,
                    "Maximum number of issues to return",
                    Some(json!(DEFAULT_ISSUE_LIMIT)),
                )
                .with_minimum(1),
            ],
        )
    }

    fn validate(&self, args: &Arguments) -> Result<(), ToolError> {
        check_segment(args, "owner")?;
        check_segment(args, "repo")
    }

    async fn execute(&self, args: Arguments) -> Result<Value, ToolError> {
        let query: OpenIssuesQuery = args.parse()?;
        let issues = self.client.list_open_issues(&query).await?;
        to_payload(&issues)
    }
}
