use std::{sync::Arc, time::Duration};

use httpmock::prelude::*;
use httpmock::Mock;
use serde_json::{json, Value};
use tau_discord_runtime::{DiscordApiClient, DiscordApiClientConfig};
use tau_forum_sync::{
    render_issue_body, ChatAuthor, ChatEvent, ChatMessage, ChatThread, ChatTransport,
    SyncContext, SyncEngine, SyncOutcome, TrackerTransport,
};
use tau_github_issues::webhook_signature::sign_github_payload;
use tau_github_issues_runtime::{
    build_github_webhook_router, GithubApiClient, GithubApiClientConfig,
    GithubWebhookServerState, RepoRef, DEFAULT_GITHUB_WEBHOOK_PATH,
};
use tokio::net::TcpListener;

const FORUM_ID: &str = "500";
const GUILD_ID: &str = "100";
const THREAD_ID: &str = "7001";
const WEBHOOK_SECRET: &str = "hook-secret";

fn build_engine(discord: &MockServer, github: &MockServer) -> Arc<SyncEngine> {
    let chat = DiscordApiClient::new(DiscordApiClientConfig {
        api_base: discord.base_url(),
        bot_token: "discord-token".to_string(),
        request_timeout_ms: 5_000,
        retry_max_attempts: 1,
        retry_base_delay_ms: 1,
    })
    .expect("discord client");
    let tracker = GithubApiClient::new(GithubApiClientConfig {
        api_base: github.base_url(),
        token: "gh-token".to_string(),
        repo: RepoRef::parse("owner/repo").expect("repo"),
        request_timeout_ms: 5_000,
        retry_max_attempts: 1,
        retry_base_delay_ms: 1,
    })
    .expect("github client");
    let context = SyncContext::new(
        FORUM_ID,
        Arc::new(chat) as Arc<dyn ChatTransport>,
        Arc::new(tracker) as Arc<dyn TrackerTransport>,
    );
    Arc::new(SyncEngine::new(context))
}

async fn spawn_webhook_server(engine: Arc<SyncEngine>) -> (String, tokio::task::JoinHandle<()>) {
    let state = Arc::new(GithubWebhookServerState {
        engine,
        webhook_secret: Some(WEBHOOK_SECRET.to_string()),
    });
    let app = build_github_webhook_router(state, DEFAULT_GITHUB_WEBHOOK_PATH);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (
        format!("http://{addr}{DEFAULT_GITHUB_WEBHOOK_PATH}"),
        handle,
    )
}

async fn deliver(url: &str, event: &str, payload: &Value) -> reqwest::StatusCode {
    let body = payload.to_string();
    let signature = sign_github_payload(body.as_bytes(), WEBHOOK_SECRET).expect("sign");
    reqwest::Client::new()
        .post(url)
        .header("content-type", "application/json")
        .header("x-github-event", event)
        .header("x-hub-signature-256", signature)
        .body(body)
        .send()
        .await
        .expect("deliver webhook")
        .status()
}

async fn wait_for_calls(mock: &Mock<'_>, expected: usize) {
    for _ in 0..200 {
        if mock.calls() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    mock.assert_calls(expected);
}

fn user_message(message_id: &str, content: &str) -> ChatMessage {
    ChatMessage {
        id: message_id.to_string(),
        guild_id: GUILD_ID.to_string(),
        channel_id: THREAD_ID.to_string(),
        author: ChatAuthor {
            id: "900".to_string(),
            display_name: "Alice".to_string(),
            avatar: Some("abc".to_string()),
            bot: false,
        },
        content: content.to_string(),
        attachments: Vec::new(),
    }
}

fn issue_payload(action: &str, body: &str, state: &str) -> Value {
    json!({
        "action": action,
        "issue": {
            "number": 42,
            "node_id": "I_42",
            "title": "Printer on fire",
            "body": body,
            "state": state,
            "locked": false,
            "html_url": "https://github.com/owner/repo/issues/42",
            "user": {"login": "bridge-bot"},
            "labels": []
        }
    })
}

#[tokio::test]
async fn integration_forum_thread_round_trips_through_issue_and_webhooks() {
    let discord = MockServer::start();
    let github = MockServer::start();

    let create_issue = github.mock(|when, then| {
        when.method(POST)
            .path("/repos/owner/repo/issues")
            .body_includes("\"title\":\"Printer on fire\"")
            .body_includes("https://discord.com/channels/100/7001/8001)");
        then.status(201).json_body(json!({
            "number": 42,
            "node_id": "I_42",
            "body": null
        }));
    });
    let create_comment = github.mock(|when, then| {
        when.method(POST)
            .path("/repos/owner/repo/issues/42/comments")
            .body_includes("world");
        then.status(201).json_body(json!({"id": 900}));
    });
    let rename = discord.mock(|when, then| {
        when.method(PATCH)
            .path("/channels/7001")
            .json_body(json!({"name": "#42: Printer on fire"}));
        then.status(200).json_body(json!({"id": THREAD_ID}));
    });
    let acknowledge = discord.mock(|when, then| {
        when.method(POST)
            .path("/channels/7001/messages")
            .body_includes("Thank you for your report!");
        then.status(200).json_body(json!({"id": "9100"}));
    });
    let any_post = discord.mock(|when, then| {
        when.method(POST)
            .path("/channels/7001/messages")
            .body_includes("`GitHub`");
        then.status(200).json_body(json!({"id": "9200"}));
    });
    let archive = discord.mock(|when, then| {
        when.method(PATCH)
            .path("/channels/7001")
            .json_body(json!({"archived": true}));
        then.status(200).json_body(json!({"id": THREAD_ID}));
    });

    let engine = build_engine(&discord, &github);
    let (webhook_url, server) = spawn_webhook_server(Arc::clone(&engine)).await;

    let outcome = engine
        .handle_chat_event(ChatEvent::ThreadCreated(ChatThread {
            id: THREAD_ID.to_string(),
            parent_id: Some(FORUM_ID.to_string()),
            name: "Printer on fire".to_string(),
            applied_tags: Vec::new(),
            archived: false,
            locked: false,
        }))
        .await
        .expect("thread created");
    assert_eq!(outcome, SyncOutcome::Applied("thread_registered"));

    let first = engine.dispatch_chat_event(ChatEvent::MessageCreated(user_message("8001", "hello")));
    let second = engine.dispatch_chat_event(ChatEvent::MessageCreated(user_message("8002", "world")));
    assert_eq!(
        first.await.expect("receipt").expect("first"),
        SyncOutcome::Applied("issue_created")
    );
    assert_eq!(
        second.await.expect("receipt").expect("second"),
        SyncOutcome::Applied("comment_created")
    );
    create_issue.assert_calls(1);
    create_comment.assert_calls(1);

    // GitHub announces the issue the bridge just created.
    let body = render_issue_body(&user_message("8001", "hello"));
    let status = deliver(&webhook_url, "issues", &issue_payload("opened", &body, "open")).await;
    assert_eq!(status, reqwest::StatusCode::ACCEPTED);
    wait_for_calls(&acknowledge, 1).await;
    rename.assert_calls(1);

    // The mirrored comment echoes back and must not reach the forum.
    let comment_body = render_issue_body(&user_message("8002", "world"));
    let mut echo = issue_payload("created", &body, "open");
    echo["comment"] = json!({
        "id": 900,
        "body": comment_body,
        "html_url": "https://github.com/owner/repo/issues/42#issuecomment-900",
        "user": {"login": "bridge-bot"}
    });
    let status = deliver(&webhook_url, "issue_comment", &echo).await;
    assert_eq!(status, reqwest::StatusCode::ACCEPTED);

    let status = deliver(&webhook_url, "issues", &issue_payload("closed", &body, "closed")).await;
    assert_eq!(status, reqwest::StatusCode::ACCEPTED);
    wait_for_calls(&archive, 1).await;
    any_post.assert_calls(0);
    acknowledge.assert_calls(1);

    let record = engine.context().registry.get(THREAD_ID).expect("record");
    assert_eq!(record.issue_number, Some(42));
    assert!(record.archived);
    assert_eq!(record.comments.len(), 1);

    server.abort();
}

#[tokio::test]
async fn integration_ready_rebuilds_registry_from_issue_history() {
    let discord = MockServer::start();
    let github = MockServer::start();

    let linked_body = render_issue_body(&user_message("8001", "original report"));
    let issues = github.mock(|when, then| {
        when.method(GET)
            .path("/repos/owner/repo/issues")
            .query_param("state", "all");
        then.status(200).json_body(json!([
            {
                "number": 42,
                "node_id": "I_42",
                "title": "Printer on fire",
                "body": linked_body,
                "state": "closed",
                "locked": true,
                "html_url": "https://github.com/owner/repo/issues/42",
                "user": {"login": "bridge-bot"},
                "labels": [{"name": "bug"}]
            },
            {
                "number": 43,
                "node_id": "I_43",
                "title": "Filed on GitHub",
                "body": "no back-link here",
                "state": "open",
                "locked": false,
                "html_url": "https://github.com/owner/repo/issues/43",
                "user": {"login": "octo"},
                "labels": []
            }
        ]));
    });
    let comments = github.mock(|when, then| {
        when.method(GET).path("/repos/owner/repo/issues/comments");
        then.status(200).json_body(json!([
            {
                "id": 901,
                "body": render_issue_body(&user_message("8003", "follow up")),
                "html_url": "https://github.com/owner/repo/issues/42#issuecomment-901",
                "user": {"login": "bridge-bot"}
            }
        ]));
    });
    let channel = discord.mock(|when, then| {
        when.method(GET).path("/channels/500");
        then.status(200).json_body(json!({
            "id": FORUM_ID,
            "type": 15,
            "available_tags": [{"id": "10", "name": "bug"}]
        }));
    });

    let engine = build_engine(&discord, &github);
    let outcome = engine
        .handle_chat_event(ChatEvent::Ready)
        .await
        .expect("ready");
    assert_eq!(outcome, SyncOutcome::Applied("registry_reconciled"));
    issues.assert_calls(1);
    comments.assert_calls(1);
    channel.assert_calls(1);

    let registry = &engine.context().registry;
    assert_eq!(registry.len(), 1);
    let record = registry.get(THREAD_ID).expect("record");
    assert_eq!(record.issue_node_id.as_deref(), Some("I_42"));
    assert_eq!(record.applied_tags, vec!["10".to_string()]);
    assert!(record.archived);
    assert!(record.locked);
    assert_eq!(record.comments.len(), 1);
    assert_eq!(record.comments[0].message_id, "8003");
    assert_eq!(record.comments[0].comment_id, 901);
}
