//! GitHub REST client
//!
//! Information Hiding:
//! - Header set, credential handling and timeouts hidden from tools
//! - HTTP failures normalized into `ToolError::RemoteApi`
//! - Responses projected into small read-only views; absent fields become null
//!
//! No retries and no caching: every call is exactly one request.

use crate::config::{GitHubConfig, GITHUB_TOKEN_VAR};
use crate::tools::ToolError;
use anyhow::Result;
use reqwest::header::ACCEPT;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Largest page size the listing endpoint accepts
pub const MAX_PAGE_SIZE: usize = 100;

pub const DEFAULT_ISSUE_LIMIT: usize = 50;

const MEDIA_TYPE: &str = "application/vnd.github+json";

#[derive(Debug, Clone, Deserialize)]
pub struct NewIssue {
    pub owner: String,
    pub repo: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub assignees: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPullRequest {
    pub owner: String,
    pub repo: String,
    /// Branch name, or `user:branch` when the branch lives on a fork
    pub head: String,
    pub base: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub draft: bool,
    #[serde(default = "default_true")]
    pub maintainer_can_modify: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenIssuesQuery {
    pub owner: String,
    pub repo: String,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Username, or `*` for issues with any assignee
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_true() -> bool {
    true
}

fn default_limit() -> usize {
    DEFAULT_ISSUE_LIMIT
}

/// Created issue or pull request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepositoryItem {
    pub number: Option<u64>,
    pub url: Option<String>,
    pub id: Option<u64>,
    pub state: Option<String>,
}

impl RepositoryItem {
    fn from_response(body: &Value) -> Self {
        Self {
            number: body.get("number").and_then(Value::as_u64),
            url: string_field(body, "html_url"),
            id: body.get("id").and_then(Value::as_u64),
            state: string_field(body, "state"),
        }
    }
}

/// Open issue as returned by the listing tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepositoryIssue {
    pub number: Option<u64>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub state: Option<String>,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
}

impl RepositoryIssue {
    fn from_item(item: &Value) -> Self {
        Self {
            number: item.get("number").and_then(Value::as_u64),
            title: string_field(item, "title"),
            url: string_field(item, "html_url"),
            state: string_field(item, "state"),
            labels: names(item, "labels", "name"),
            assignees: names(item, "assignees", "login"),
        }
    }

    /// The listing endpoint mixes pull requests in; they carry this key
    fn is_pull_request(item: &Value) -> bool {
        item.get("pull_request").is_some()
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn names(item: &Value, list: &str, key: &str) -> Vec<String> {
    item.get(list)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| string_field(entry, key))
                .collect()
        })
        .unwrap_or_default()
}

pub struct GitHubClient {
    client: Client,
    api_url: String,
    api_version: String,
    token: Option<String>,
    timeout_secs: u64,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            token: token.filter(|t| !t.trim().is_empty()),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn has_credential(&self) -> bool {
        self.token.is_some()
    }

    pub async fn create_issue(&self, issue: &NewIssue) -> Result<RepositoryItem, ToolError> {
        let mut payload = json!({ "title": issue.title });
        if !issue.body.is_empty() {
            payload["body"] = json!(issue.body);
        }
        if !issue.labels.is_empty() {
            payload["labels"] = json!(issue.labels);
        }
        if !issue.assignees.is_empty() {
            payload["assignees"] = json!(issue.assignees);
        }

        let path = format!("/repos/{}/{}/issues", issue.owner, issue.repo);
        let body = self.request(Method::POST, &path, Some(&payload), &[]).await?;
        Ok(RepositoryItem::from_response(&body))
    }

    pub async fn open_pull_request(
        &self,
        pull: &NewPullRequest,
    ) -> Result<RepositoryItem, ToolError> {
        let payload = json!({
            "title": pull.title,
            "head": pull.head,
            "base": pull.base,
            "body": pull.body,
            "draft": pull.draft,
            "maintainer_can_modify": pull.maintainer_can_modify,
        });

        let path = format!("/repos/{}/{}/pulls", pull.owner, pull.repo);
        let body = self.request(Method::POST, &path, Some(&payload), &[]).await?;
        Ok(RepositoryItem::from_response(&body))
    }

    /// One page of open issues, pull requests removed, cut at `limit`.
    ///
    /// The page size is clamped to 1..=100 while the cut uses the caller's
    /// limit, so a limit above 100 still yields at most one page.
    pub async fn list_open_issues(
        &self,
        query: &OpenIssuesQuery,
    ) -> Result<Vec<RepositoryIssue>, ToolError> {
        let per_page = query.limit.clamp(1, MAX_PAGE_SIZE);
        let mut params = vec![
            ("state", "open".to_string()),
            ("per_page", per_page.to_string()),
        ];
        if !query.labels.is_empty() {
            params.push(("labels", query.labels.join(",")));
        }
        if let Some(assignee) = query.assignee.as_deref().filter(|a| !a.is_empty()) {
            params.push(("assignee", assignee.to_string()));
        }

        let path = format!("/repos/{}/{}/issues", query.owner, query.repo);
        let body = self.request(Method::GET, &path, None, &params).await?;

        let Value::Array(items) = body else {
            return Err(ToolError::execution(
                "issue listing did not return a JSON array",
            ));
        };

        Ok(items
            .iter()
            .filter(|item| !RepositoryIssue::is_pull_request(item))
            .take(query.limit)
            .map(RepositoryIssue::from_item)
            .collect())
    }

    fn credential(&self) -> Result<&str, ToolError> {
        self.token
            .as_deref()
            .ok_or_else(|| ToolError::MissingCredential {
                variable: GITHUB_TOKEN_VAR.to_string(),
            })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        query: &[(&str, String)],
    ) -> Result<Value, ToolError> {
        // Checked before anything touches the network
        let token = self.credential()?;
        let url = format!("{}{}", self.api_url, path);

        tracing::debug!("GitHub API {} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(token)
            .header(ACCEPT, MEDIA_TYPE)
            .header("X-GitHub-Api-Version", &self.api_version);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;

        if status.as_u16() >= 400 {
            tracing::warn!("GitHub API {} {} failed [{}]", method, path, status);
            let detail = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
            return Err(ToolError::RemoteApi {
                status: Some(status.as_u16()),
                detail,
            });
        }

        Ok(serde_json::from_str(&text)
            .unwrap_or_else(|_| json!({ "ok": true, "status": status.as_u16() })))
    }

    fn transport_error(&self, error: reqwest::Error) -> ToolError {
        if error.is_timeout() {
            return ToolError::RemoteApi {
                status: None,
                detail: json!({
                    "message": format!("request timed out after {}s", self.timeout_secs),
                    "timeout": true,
                }),
            };
        }

        ToolError::RemoteApi {
            status: error.status().map(|s| s.as_u16()),
            detail: json!({ "message": error.to_string() }),
        }
    }
}
