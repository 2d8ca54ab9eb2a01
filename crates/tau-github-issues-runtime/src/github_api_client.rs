use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tau_forum_sync::{CreatedIssue, IssueUpdate, TrackerComment, TrackerIssue, TrackerTransport};
use tau_github_issues::github_transport_helpers::{
    parse_retry_after, retry_delay, truncate_for_error, RetryPolicy,
};
use tau_github_issues::issue_event_collection::{
    GithubCommentCreateResponse, GithubIssue, GithubIssueComment, GithubIssueCreateResponse,
};

const GITHUB_PAGE_SIZE: usize = 100;
const DELETE_ISSUE_MUTATION: &str =
    "mutation($issueId: ID!) { deleteIssue(input: {issueId: $issueId}) { clientMutationId } }";

#[derive(Debug, Clone, PartialEq, Eq)]
/// `owner/repo` pair the bridge mirrors into.
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let (owner, name) = trimmed
            .split_once('/')
            .ok_or_else(|| anyhow!("invalid --github-repo '{raw}', expected owner/repo"))?;
        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            bail!("invalid --github-repo '{raw}', expected owner/repo");
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn as_slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone)]
pub struct GithubApiClientConfig {
    pub api_base: String,
    pub token: String,
    pub repo: RepoRef,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

#[derive(Clone)]
/// GitHub REST/GraphQL client scoped to one repository.
pub struct GithubApiClient {
    http: reqwest::Client,
    api_base: String,
    repo: RepoRef,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl GithubApiClient {
    pub fn new(config: GithubApiClientConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("tau-forum-bridge"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", config.token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header)
                .context("invalid github authorization header")?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .context("failed to create github api client")?;
        Ok(Self {
            http: client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            repo: config.repo,
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms.max(1),
        })
    }

    pub fn repo(&self) -> &RepoRef {
        &self.repo
    }

    fn repo_url(&self, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}/{suffix}",
            self.api_base, self.repo.owner, self.repo.name
        )
    }

    /// Every issue in the repository, open and closed, excluding pull requests.
    pub async fn list_all_issues(&self) -> Result<Vec<GithubIssue>> {
        let url = self.repo_url("issues");
        let rows: Vec<GithubIssue> = self
            .list_paginated("list issues", &url, &[("state", "all")])
            .await?;
        Ok(rows
            .into_iter()
            .filter(|issue| !issue.is_pull_request())
            .collect())
    }

    /// Every issue comment in the repository.
    pub async fn list_repo_comments(&self) -> Result<Vec<GithubIssueComment>> {
        let url = self.repo_url("issues/comments");
        self.list_paginated(
            "list issue comments",
            &url,
            &[("sort", "created"), ("direction", "asc")],
        )
        .await
    }

    async fn list_paginated<T>(
        &self,
        operation: &str,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut page = 1_u32;
        let mut rows = Vec::new();
        let page_size = GITHUB_PAGE_SIZE.to_string();
        loop {
            let page_value = page.to_string();
            let chunk: Vec<T> = self
                .request_json(operation, || {
                    self.http
                        .get(url)
                        .query(query)
                        .query(&[
                            ("per_page", page_size.as_str()),
                            ("page", page_value.as_str()),
                        ])
                })
                .await?;
            let chunk_len = chunk.len();
            rows.extend(chunk);
            if chunk_len < GITHUB_PAGE_SIZE {
                break;
            }
            page = page.saturating_add(1);
        }
        Ok(rows)
    }

    pub async fn create_issue(
        &self,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<GithubIssueCreateResponse> {
        let payload = json!({ "title": title, "body": body, "labels": labels });
        let url = self.repo_url("issues");
        self.create_json("create issue", || self.http.post(&url).json(&payload))
            .await
    }

    pub async fn update_issue(&self, issue_number: u64, update: &IssueUpdate) -> Result<()> {
        let mut payload = Map::new();
        if let Some(state) = update.state {
            payload.insert("state".to_string(), Value::from(state.as_str()));
        }
        if let Some(labels) = update.labels.as_ref() {
            payload.insert("labels".to_string(), json!(labels));
        }
        if payload.is_empty() {
            return Ok(());
        }
        let payload = Value::Object(payload);
        let url = self.repo_url(&format!("issues/{issue_number}"));
        let _: Value = self
            .request_json("update issue", || self.http.patch(&url).json(&payload))
            .await?;
        Ok(())
    }

    pub async fn lock_issue(&self, issue_number: u64) -> Result<()> {
        let url = self.repo_url(&format!("issues/{issue_number}/lock"));
        self.request_no_content("lock issue", || {
            self.http.put(&url).json(&json!({ "lock_reason": "resolved" }))
        })
        .await
    }

    pub async fn unlock_issue(&self, issue_number: u64) -> Result<()> {
        let url = self.repo_url(&format!("issues/{issue_number}/lock"));
        self.request_no_content("unlock issue", || self.http.delete(&url))
            .await
    }

    pub async fn create_issue_comment(
        &self,
        issue_number: u64,
        body: &str,
    ) -> Result<GithubCommentCreateResponse> {
        let payload = json!({ "body": body });
        let url = self.repo_url(&format!("issues/{issue_number}/comments"));
        self.create_json("create issue comment", || self.http.post(&url).json(&payload))
            .await
    }

    pub async fn delete_issue_comment(&self, comment_id: u64) -> Result<()> {
        let url = self.repo_url(&format!("issues/comments/{comment_id}"));
        self.request_no_content("delete issue comment", || self.http.delete(&url))
            .await
    }

    /// Issues can only be deleted through GraphQL.
    pub async fn delete_issue_by_node_id(&self, node_id: &str) -> Result<()> {
        #[derive(Deserialize)]
        struct GraphqlError {
            message: String,
        }

        #[derive(Deserialize)]
        struct GraphqlResponse {
            #[serde(default)]
            errors: Vec<GraphqlError>,
        }

        let payload = json!({
            "query": DELETE_ISSUE_MUTATION,
            "variables": { "issueId": node_id },
        });
        let url = format!("{}/graphql", self.api_base);
        let response: GraphqlResponse = self
            .request_json("delete issue", || self.http.post(&url).json(&payload))
            .await?;
        if !response.errors.is_empty() {
            let messages = response
                .errors
                .iter()
                .map(|error| error.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            bail!(
                "github graphql delete issue failed: {}",
                truncate_for_error(&messages, 800)
            );
        }
        Ok(())
    }

    async fn send_with_retry<F>(
        &self,
        operation: &str,
        policy: RetryPolicy,
        mut request_builder: F,
    ) -> Result<reqwest::Response>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = request_builder()
                .header("x-tau-retry-attempt", attempt.saturating_sub(1).to_string())
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts && policy.retries_status(status.as_u16())
                    {
                        tracing::debug!(
                            operation,
                            attempt,
                            status = status.as_u16(),
                            "retrying github api request"
                        );
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }

                    bail!(
                        "github api {operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, 800)
                    );
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && policy.retries_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("github api {operation} request failed"));
                }
            }
        }
    }

    async fn request_json<T, F>(&self, operation: &str, request_builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let response = self
            .send_with_retry(operation, RetryPolicy::Idempotent, request_builder)
            .await?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("failed to decode github {operation}"))
    }

    async fn create_json<T, F>(&self, operation: &str, request_builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let response = self
            .send_with_retry(operation, RetryPolicy::CreateOnce, request_builder)
            .await?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("failed to decode github {operation}"))
    }

    async fn request_no_content<F>(&self, operation: &str, request_builder: F) -> Result<()>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        self.send_with_retry(operation, RetryPolicy::Idempotent, request_builder)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TrackerTransport for GithubApiClient {
    async fn list_issues(&self) -> Result<Vec<TrackerIssue>> {
        Ok(self
            .list_all_issues()
            .await?
            .iter()
            .map(GithubIssue::to_tracker_issue)
            .collect())
    }

    async fn list_comments(&self) -> Result<Vec<TrackerComment>> {
        Ok(self
            .list_repo_comments()
            .await?
            .iter()
            .map(GithubIssueComment::to_tracker_comment)
            .collect())
    }

    async fn create_issue(
        &self,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<CreatedIssue> {
        let created = GithubApiClient::create_issue(self, title, body, labels).await?;
        Ok(CreatedIssue {
            number: created.number,
            node_id: created.node_id,
            body: created.body,
        })
    }

    async fn update_issue(&self, number: u64, update: &IssueUpdate) -> Result<()> {
        GithubApiClient::update_issue(self, number, update).await
    }

    async fn lock_issue(&self, number: u64) -> Result<()> {
        GithubApiClient::lock_issue(self, number).await
    }

    async fn unlock_issue(&self, number: u64) -> Result<()> {
        GithubApiClient::unlock_issue(self, number).await
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<u64> {
        Ok(self.create_issue_comment(number, body).await?.id)
    }

    async fn delete_comment(&self, comment_id: u64) -> Result<()> {
        self.delete_issue_comment(comment_id).await
    }

    async fn delete_issue(&self, node_id: &str) -> Result<()> {
        self.delete_issue_by_node_id(node_id).await
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;
    use tau_forum_sync::{IssueState, IssueUpdate, TrackerTransport};

    use super::{GithubApiClient, GithubApiClientConfig, RepoRef};

    fn test_client(base_url: &str, retry_max_attempts: usize) -> GithubApiClient {
        GithubApiClient::new(GithubApiClientConfig {
            api_base: base_url.to_string(),
            token: "test-token".to_string(),
            repo: RepoRef::parse("owner/repo").expect("repo"),
            request_timeout_ms: 5_000,
            retry_max_attempts,
            retry_base_delay_ms: 1,
        })
        .expect("client")
    }

    fn issue_row(number: u64) -> serde_json::Value {
        json!({
            "number": number,
            "node_id": format!("I_{number}"),
            "title": format!("Issue {number}"),
            "body": "body",
            "state": "open",
            "locked": false,
            "html_url": format!("https://github.com/owner/repo/issues/{number}"),
            "user": {"login": "octo"},
            "labels": []
        })
    }

    #[test]
    fn unit_repo_ref_parse_validates_owner_and_name() {
        let repo = RepoRef::parse(" owner/repo ").expect("repo");
        assert_eq!(repo.as_slug(), "owner/repo");
        for raw in ["owner", "/repo", "owner/", "owner/repo/extra"] {
            assert!(RepoRef::parse(raw).is_err(), "{raw}");
        }
    }

    #[tokio::test]
    async fn functional_list_issues_pages_and_skips_pull_requests() {
        let server = MockServer::start();
        let first_page = (1..=100)
            .map(|number| {
                let mut row = issue_row(number);
                if number == 7 {
                    row["pull_request"] = json!({"url": "https://api.github.com/pulls/7"});
                }
                row
            })
            .collect::<Vec<_>>();
        let page_one = server.mock(|when, then| {
            when.method(GET)
                .path("/repos/owner/repo/issues")
                .query_param("state", "all")
                .query_param("page", "1")
                .header("authorization", "Bearer test-token");
            then.status(200).json_body(json!(first_page));
        });
        let page_two = server.mock(|when, then| {
            when.method(GET)
                .path("/repos/owner/repo/issues")
                .query_param("state", "all")
                .query_param("page", "2");
            then.status(200).json_body(json!([issue_row(101)]));
        });

        let client = test_client(&server.base_url(), 1);
        let issues = TrackerTransport::list_issues(&client).await.expect("issues");
        assert_eq!(issues.len(), 100);
        assert!(issues.iter().all(|issue| issue.number != 7));
        assert_eq!(issues.last().map(|issue| issue.number), Some(101));
        page_one.assert_calls(1);
        page_two.assert_calls(1);
    }

    #[tokio::test]
    async fn functional_create_issue_and_comment_return_identifiers() {
        let server = MockServer::start();
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/repos/owner/repo/issues")
                .body_includes("\"title\":\"Crash\"")
                .body_includes("\"labels\":[\"bug\"]");
            then.status(201).json_body(json!({
                "number": 42,
                "node_id": "I_42",
                "body": "rendered"
            }));
        });
        let comment = server.mock(|when, then| {
            when.method(POST)
                .path("/repos/owner/repo/issues/42/comments")
                .body_includes("world");
            then.status(201).json_body(json!({"id": 900, "html_url": "https://example.test/c/900"}));
        });

        let client = test_client(&server.base_url(), 1);
        let created = TrackerTransport::create_issue(&client, "Crash", "rendered", &["bug".to_string()])
            .await
            .expect("create issue");
        assert_eq!(created.number, 42);
        assert_eq!(created.node_id, "I_42");
        assert_eq!(created.body.as_deref(), Some("rendered"));
        let comment_id = client.create_comment(42, "world").await.expect("comment");
        assert_eq!(comment_id, 900);
        create.assert_calls(1);
        comment.assert_calls(1);
    }

    #[tokio::test]
    async fn functional_state_labels_and_lock_use_expected_endpoints() {
        let server = MockServer::start();
        let close = server.mock(|when, then| {
            when.method(PATCH)
                .path("/repos/owner/repo/issues/42")
                .json_body(json!({"state": "closed"}));
            then.status(200).json_body(json!({"number": 42}));
        });
        let labels = server.mock(|when, then| {
            when.method(PATCH)
                .path("/repos/owner/repo/issues/42")
                .json_body(json!({"labels": ["bug", "feature"]}));
            then.status(200).json_body(json!({"number": 42}));
        });
        let lock = server.mock(|when, then| {
            when.method(PUT).path("/repos/owner/repo/issues/42/lock");
            then.status(204);
        });
        let unlock = server.mock(|when, then| {
            when.method(DELETE).path("/repos/owner/repo/issues/42/lock");
            then.status(204);
        });

        let client = test_client(&server.base_url(), 1);
        TrackerTransport::update_issue(
            &client,
            42,
            &IssueUpdate {
                state: Some(IssueState::Closed),
                labels: None,
            },
        )
        .await
        .expect("close");
        TrackerTransport::update_issue(
            &client,
            42,
            &IssueUpdate {
                state: None,
                labels: Some(vec!["bug".to_string(), "feature".to_string()]),
            },
        )
        .await
        .expect("labels");
        TrackerTransport::lock_issue(&client, 42).await.expect("lock");
        TrackerTransport::unlock_issue(&client, 42).await.expect("unlock");
        close.assert_calls(1);
        labels.assert_calls(1);
        lock.assert_calls(1);
        unlock.assert_calls(1);
    }

    #[tokio::test]
    async fn functional_delete_issue_uses_graphql_and_surfaces_errors() {
        let server = MockServer::start();
        let ok = server.mock(|when, then| {
            when.method(POST)
                .path("/graphql")
                .body_includes("deleteIssue")
                .body_includes("\"issueId\":\"I_42\"");
            then.status(200)
                .json_body(json!({"data": {"deleteIssue": {"clientMutationId": null}}}));
        });
        let denied = server.mock(|when, then| {
            when.method(POST)
                .path("/graphql")
                .body_includes("\"issueId\":\"I_43\"");
            then.status(200).json_body(json!({
                "data": null,
                "errors": [{"message": "must have admin rights"}]
            }));
        });

        let client = test_client(&server.base_url(), 1);
        client.delete_issue("I_42").await.expect("delete");
        let error = client.delete_issue("I_43").await.expect_err("denied");
        assert!(error.to_string().contains("must have admin rights"));
        ok.assert_calls(1);
        denied.assert_calls(1);
    }

    #[tokio::test]
    async fn regression_retries_server_errors_but_not_client_errors() {
        let server = MockServer::start();
        let unavailable = server.mock(|when, then| {
            when.method(DELETE).path("/repos/owner/repo/issues/comments/1");
            then.status(503).body("unavailable");
        });
        let missing = server.mock(|when, then| {
            when.method(DELETE).path("/repos/owner/repo/issues/comments/2");
            then.status(404).body("not found");
        });

        let client = test_client(&server.base_url(), 3);
        let error = client.delete_comment(1).await.expect_err("503");
        assert!(error.to_string().contains("status 503"));
        unavailable.assert_calls(3);

        let error = client.delete_comment(2).await.expect_err("404");
        assert!(error.to_string().contains("status 404"));
        missing.assert_calls(1);
    }

    #[tokio::test]
    async fn regression_create_requests_are_not_repeated_after_server_errors() {
        let server = MockServer::start();
        let issues = server.mock(|when, then| {
            when.method(POST).path("/repos/owner/repo/issues");
            then.status(502).body("bad gateway");
        });
        let comments = server.mock(|when, then| {
            when.method(POST).path("/repos/owner/repo/issues/42/comments");
            then.status(500).body("boom");
        });

        let client = test_client(&server.base_url(), 3);
        let error = client
            .create_issue("Title", "body", &[])
            .await
            .expect_err("502");
        assert!(error.to_string().contains("status 502"));
        issues.assert_calls(1);

        let error = client
            .create_issue_comment(42, "body")
            .await
            .expect_err("500");
        assert!(error.to_string().contains("status 500"));
        comments.assert_calls(1);
    }

    #[tokio::test]
    async fn functional_create_requests_still_retry_rate_limits() {
        let server = MockServer::start();
        let limited = server.mock(|when, then| {
            when.method(POST).path("/repos/owner/repo/issues/42/comments");
            then.status(429).body("slow down");
        });
        let client = test_client(&server.base_url(), 3);
        let error = client
            .create_issue_comment(42, "body")
            .await
            .expect_err("429");
        assert!(error.to_string().contains("status 429"));
        limited.assert_calls(3);
    }

    #[tokio::test]
    async fn unit_empty_update_sends_nothing() {
        let server = MockServer::start();
        let any = server.mock(|when, then| {
            when.any_request();
            then.status(500);
        });
        let client = test_client(&server.base_url(), 1);
        client
            .update_issue(42, &IssueUpdate::default())
            .await
            .expect("no-op");
        any.assert_calls(0);
    }
}
