use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tau_forum_sync::{ChatChannel, ChatThread, ChatTransport, ForumTag};
use tau_github_issues::github_transport_helpers::{
    parse_retry_after, retry_delay, truncate_for_error, RetryPolicy,
};

pub const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";
const DISCORD_FORUM_CHANNEL_TYPE: u8 = 15;
/// Announcement, public and private thread channel types.
const DISCORD_THREAD_CHANNEL_TYPES: [u8; 3] = [10, 11, 12];

#[derive(Debug, Clone)]
pub struct DiscordApiClientConfig {
    pub api_base: String,
    pub bot_token: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

#[derive(Debug, Deserialize)]
struct DiscordIdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DiscordForumTag {
    id: String,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct DiscordThreadMetadata {
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    locked: bool,
}

#[derive(Debug, Deserialize)]
struct DiscordChannelResponse {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    available_tags: Vec<DiscordForumTag>,
    #[serde(default)]
    applied_tags: Vec<String>,
    #[serde(default)]
    thread_metadata: Option<DiscordThreadMetadata>,
}

#[derive(Clone)]
/// Discord REST client for forum threads and messages.
pub struct DiscordApiClient {
    http: reqwest::Client,
    api_base: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl DiscordApiClient {
    pub fn new(config: DiscordApiClientConfig) -> Result<Self> {
        let token = config.bot_token.trim();
        if token.is_empty() {
            bail!("discord bot token cannot be empty");
        }
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("DiscordBot (tau-forum-bridge, 0.1)"),
        );
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bot {token}"))
                .context("invalid discord authorization header")?,
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .context("failed to create discord api client")?;
        Ok(Self {
            http: client,
            api_base: config.api_base.trim().trim_end_matches('/').to_string(),
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms.max(1),
        })
    }

    fn channel_url(&self, channel_id: &str) -> String {
        format!("{}/channels/{}", self.api_base, channel_id.trim())
    }

    async fn patch_channel(&self, operation: &str, channel_id: &str, payload: Value) -> Result<()> {
        let url = self.channel_url(channel_id);
        let _: Value = self
            .request_json(operation, RetryPolicy::Idempotent, || {
                self.http.patch(&url).json(&payload)
            })
            .await?;
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
            match request_builder().send().await {
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
                            "retrying discord api request"
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
                        "discord api {operation} failed with status {}: {}",
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
                        .with_context(|| format!("discord api {operation} request failed"));
                }
            }
        }
    }

    async fn request_json<T, F>(
        &self,
        operation: &str,
        policy: RetryPolicy,
        request_builder: F,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let response = self
            .send_with_retry(operation, policy, request_builder)
            .await?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("failed to decode discord {operation}"))
    }
}

#[async_trait]
impl ChatTransport for DiscordApiClient {
    async fn create_thread(
        &self,
        channel_id: &str,
        title: &str,
        content: &str,
        tag_ids: &[String],
    ) -> Result<String> {
        let payload = json!({
            "name": title,
            "applied_tags": tag_ids,
            "message": {
                "content": content,
                "allowed_mentions": {"parse": []},
            },
        });
        let url = format!("{}/threads", self.channel_url(channel_id));
        let created: DiscordIdResponse = self
            .request_json("create forum thread", RetryPolicy::CreateOnce, || {
                self.http.post(&url).json(&payload)
            })
            .await?;
        Ok(created.id)
    }

    async fn set_thread_tags(&self, thread_id: &str, tag_ids: &[String]) -> Result<()> {
        self.patch_channel("set thread tags", thread_id, json!({ "applied_tags": tag_ids }))
            .await
    }

    async fn set_thread_name(&self, thread_id: &str, name: &str) -> Result<()> {
        self.patch_channel("rename thread", thread_id, json!({ "name": name }))
            .await
    }

    async fn set_archived(&self, thread_id: &str, archived: bool) -> Result<()> {
        self.patch_channel("archive thread", thread_id, json!({ "archived": archived }))
            .await
    }

    async fn set_locked(&self, thread_id: &str, locked: bool) -> Result<()> {
        self.patch_channel("lock thread", thread_id, json!({ "locked": locked }))
            .await
    }

    async fn post_message(&self, thread_id: &str, content: &str) -> Result<String> {
        let payload = json!({
            "content": content,
            "allowed_mentions": {"parse": []},
        });
        let url = format!("{}/messages", self.channel_url(thread_id));
        let created: DiscordIdResponse = self
            .request_json("post message", RetryPolicy::CreateOnce, || {
                self.http.post(&url).json(&payload)
            })
            .await?;
        Ok(created.id)
    }

    async fn delete_message(&self, thread_id: &str, message_id: &str) -> Result<()> {
        let url = format!(
            "{}/messages/{}",
            self.channel_url(thread_id),
            message_id.trim()
        );
        self.send_with_retry("delete message", RetryPolicy::Idempotent, || {
            self.http.delete(&url)
        })
            .await?;
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let url = self.channel_url(thread_id);
        self.send_with_retry("delete thread", RetryPolicy::Idempotent, || {
            self.http.delete(&url)
        })
            .await?;
        Ok(())
    }

    async fn fetch_channel(&self, channel_id: &str) -> Result<ChatChannel> {
        let url = self.channel_url(channel_id);
        let channel: DiscordChannelResponse = self
            .request_json("fetch channel", RetryPolicy::Idempotent, || self.http.get(&url))
            .await?;
        Ok(ChatChannel {
            id: channel.id,
            is_forum: channel.kind == DISCORD_FORUM_CHANNEL_TYPE,
            available_tags: channel
                .available_tags
                .into_iter()
                .map(|tag| ForumTag {
                    id: tag.id,
                    name: tag.name,
                })
                .collect(),
        })
    }

    async fn fetch_thread(&self, thread_id: &str) -> Result<Option<ChatThread>> {
        let url = self.channel_url(thread_id);
        let channel: DiscordChannelResponse = self
            .request_json("fetch thread", RetryPolicy::Idempotent, || self.http.get(&url))
            .await?;
        if !DISCORD_THREAD_CHANNEL_TYPES.contains(&channel.kind) {
            return Ok(None);
        }
        let metadata = channel.thread_metadata.unwrap_or_default();
        Ok(Some(ChatThread {
            id: channel.id,
            parent_id: channel.parent_id,
            name: channel.name.unwrap_or_default(),
            applied_tags: channel.applied_tags,
            archived: metadata.archived,
            locked: metadata.locked,
        }))
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;
    use tau_forum_sync::{ChatTransport, ForumTag};

    use super::{DiscordApiClient, DiscordApiClientConfig};

    fn test_client(base_url: &str, retry_max_attempts: usize) -> DiscordApiClient {
        DiscordApiClient::new(DiscordApiClientConfig {
            api_base: base_url.to_string(),
            bot_token: "discord-token".to_string(),
            request_timeout_ms: 5_000,
            retry_max_attempts,
            retry_base_delay_ms: 1,
        })
        .expect("client")
    }

    #[test]
    fn regression_empty_token_is_rejected() {
        let result = DiscordApiClient::new(DiscordApiClientConfig {
            api_base: "http://localhost".to_string(),
            bot_token: "  ".to_string(),
            request_timeout_ms: 1_000,
            retry_max_attempts: 1,
            retry_base_delay_ms: 1,
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn functional_create_thread_posts_forum_thread_with_tags() {
        let server = MockServer::start();
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/channels/500/threads")
                .header("authorization", "Bot discord-token")
                .body_includes("\"name\":\"#42: Crash\"")
                .body_includes("\"applied_tags\":[\"10\"]")
                .body_includes("\"content\":\"starter\"");
            then.status(201).json_body(json!({"id": "7001", "type": 11}));
        });

        let client = test_client(&server.base_url(), 1);
        let thread_id = client
            .create_thread("500", "#42: Crash", "starter", &["10".to_string()])
            .await
            .expect("create thread");
        assert_eq!(thread_id, "7001");
        create.assert_calls(1);
    }

    #[tokio::test]
    async fn functional_thread_flags_patch_the_channel() {
        let server = MockServer::start();
        let archive = server.mock(|when, then| {
            when.method(PATCH)
                .path("/channels/7001")
                .json_body(json!({"archived": true}));
            then.status(200).json_body(json!({"id": "7001"}));
        });
        let lock = server.mock(|when, then| {
            when.method(PATCH)
                .path("/channels/7001")
                .json_body(json!({"locked": false}));
            then.status(200).json_body(json!({"id": "7001"}));
        });
        let tags = server.mock(|when, then| {
            when.method(PATCH)
                .path("/channels/7001")
                .json_body(json!({"applied_tags": ["10", "20"]}));
            then.status(200).json_body(json!({"id": "7001"}));
        });

        let client = test_client(&server.base_url(), 1);
        client.set_archived("7001", true).await.expect("archive");
        client.set_locked("7001", false).await.expect("unlock");
        client
            .set_thread_tags("7001", &["10".to_string(), "20".to_string()])
            .await
            .expect("tags");
        archive.assert_calls(1);
        lock.assert_calls(1);
        tags.assert_calls(1);
    }

    #[tokio::test]
    async fn functional_messages_and_deletes_use_expected_routes() {
        let server = MockServer::start();
        let post = server.mock(|when, then| {
            when.method(POST)
                .path("/channels/7001/messages")
                .body_includes("\"content\":\"hello\"");
            then.status(200).json_body(json!({"id": "9001"}));
        });
        let delete_message = server.mock(|when, then| {
            when.method(DELETE).path("/channels/7001/messages/9001");
            then.status(204);
        });
        let delete_thread = server.mock(|when, then| {
            when.method(DELETE).path("/channels/7001");
            then.status(200).json_body(json!({"id": "7001"}));
        });

        let client = test_client(&server.base_url(), 1);
        let message_id = client.post_message("7001", "hello").await.expect("post");
        assert_eq!(message_id, "9001");
        client
            .delete_message("7001", "9001")
            .await
            .expect("delete message");
        client.delete_thread("7001").await.expect("delete thread");
        post.assert_calls(1);
        delete_message.assert_calls(1);
        delete_thread.assert_calls(1);
    }

    #[tokio::test]
    async fn functional_fetch_channel_reads_forum_tags() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/channels/500");
            then.status(200).json_body(json!({
                "id": "500",
                "type": 15,
                "available_tags": [
                    {"id": "10", "name": "bug", "moderated": false},
                    {"id": "20", "name": "feature", "moderated": false}
                ]
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/channels/600");
            then.status(200).json_body(json!({"id": "600", "type": 0}));
        });

        let client = test_client(&server.base_url(), 1);
        let forum = client.fetch_channel("500").await.expect("forum");
        assert!(forum.is_forum);
        assert_eq!(
            forum.available_tags,
            vec![
                ForumTag {
                    id: "10".to_string(),
                    name: "bug".to_string(),
                },
                ForumTag {
                    id: "20".to_string(),
                    name: "feature".to_string(),
                },
            ]
        );
        let text = client.fetch_channel("600").await.expect("text channel");
        assert!(!text.is_forum);
        assert!(text.available_tags.is_empty());
    }

    #[tokio::test]
    async fn functional_fetch_thread_reads_parent_tags_and_flags() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/channels/7001");
            then.status(200).json_body(json!({
                "id": "7001",
                "type": 11,
                "name": "Printer on fire",
                "parent_id": "500",
                "applied_tags": ["20", "10"],
                "thread_metadata": {"archived": false, "locked": true}
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/channels/600");
            then.status(200).json_body(json!({"id": "600", "type": 0, "name": "general"}));
        });

        let client = test_client(&server.base_url(), 1);
        let thread = client
            .fetch_thread("7001")
            .await
            .expect("thread")
            .expect("is a thread");
        assert_eq!(thread.parent_id.as_deref(), Some("500"));
        assert_eq!(thread.name, "Printer on fire");
        assert_eq!(thread.applied_tags, vec!["20".to_string(), "10".to_string()]);
        assert!(!thread.archived);
        assert!(thread.locked);
        assert_eq!(client.fetch_thread("600").await.expect("text channel"), None);
    }

    #[tokio::test]
    async fn regression_create_requests_are_not_repeated_after_server_errors() {
        let server = MockServer::start();
        let threads = server.mock(|when, then| {
            when.method(POST).path("/channels/500/threads");
            then.status(502).body("bad gateway");
        });
        let messages = server.mock(|when, then| {
            when.method(POST).path("/channels/7001/messages");
            then.status(500).body("boom");
        });
        let fetch = server.mock(|when, then| {
            when.method(GET).path("/channels/7002");
            then.status(503).body("unavailable");
        });

        let client = test_client(&server.base_url(), 3);
        client
            .create_thread("500", "Title", "starter", &[])
            .await
            .expect_err("502");
        client.post_message("7001", "hi").await.expect_err("500");
        client.fetch_thread("7002").await.expect_err("503");
        threads.assert_calls(1);
        messages.assert_calls(1);
        fetch.assert_calls(3);
    }

    #[tokio::test]
    async fn regression_rate_limits_are_retried_then_reported() {
        let server = MockServer::start();
        let limited = server.mock(|when, then| {
            when.method(POST).path("/channels/7001/messages");
            then.status(429)
                .header("retry-after", "0.001")
                .json_body(json!({"message": "You are being rate limited.", "retry_after": 0.001}));
        });
        let forbidden = server.mock(|when, then| {
            when.method(DELETE).path("/channels/7002");
            then.status(403).json_body(json!({"message": "Missing Permissions"}));
        });

        let client = test_client(&server.base_url(), 2);
        let error = client.post_message("7001", "hi").await.expect_err("limited");
        assert!(error.to_string().contains("status 429"));
        limited.assert_calls(2);

        let error = client.delete_thread("7002").await.expect_err("forbidden");
        assert!(error.to_string().contains("Missing Permissions"));
        forbidden.assert_calls(1);
    }
}
