//! Axum server receiving GitHub issue webhooks and handing them to the sync engine.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tau_forum_sync::SyncEngine;
use tau_github_issues::issue_webhook::{
    decode_github_webhook, GithubWebhookDecision, GITHUB_DELIVERY_HEADER, GITHUB_EVENT_HEADER,
};
use tau_github_issues::webhook_signature::{
    verify_github_sha256_signature, GITHUB_SIGNATURE_HEADER,
};
use tokio::net::TcpListener;

pub const DEFAULT_GITHUB_WEBHOOK_PATH: &str = "/webhooks/github";

pub struct GithubWebhookServerState {
    pub engine: Arc<SyncEngine>,
    pub webhook_secret: Option<String>,
}

pub fn build_github_webhook_router(state: Arc<GithubWebhookServerState>, path: &str) -> Router {
    Router::new()
        .route(path, post(handle_github_webhook))
        .route("/healthz", get(handle_webhook_health))
        .with_state(state)
}

/// Serves webhooks until ctrl-c.
pub async fn run_github_webhook_server(
    bind: &str,
    path: &str,
    state: Arc<GithubWebhookServerState>,
) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve github webhook bound address")?;
    tracing::info!(
        addr = %local_addr,
        path,
        signature_check = state.webhook_secret.is_some(),
        "github webhook server listening"
    );

    let app = build_github_webhook_router(state, path);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("github webhook server exited unexpectedly")
}

async fn handle_webhook_health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status":"ok"})))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or("")
}

async fn handle_github_webhook(
    State(state): State<Arc<GithubWebhookServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let delivery = header_value(&headers, GITHUB_DELIVERY_HEADER);
    if let Some(secret) = state.webhook_secret.as_deref() {
        let signature = header_value(&headers, GITHUB_SIGNATURE_HEADER);
        if let Err(error) = verify_github_sha256_signature(&body, signature, secret) {
            tracing::warn!(delivery, error = %error, "rejected github webhook");
            return (
                StatusCode::UNAUTHORIZED,
                Json(
                    json!({"error":{"code":"invalid_signature","message":"github webhook signature verification failed"}}),
                ),
            );
        }
    }

    let event_name = header_value(&headers, GITHUB_EVENT_HEADER);
    let decision = match decode_github_webhook(event_name, &body) {
        Ok(decision) => decision,
        Err(error) => {
            tracing::warn!(delivery, event = event_name, error = %error, "malformed github webhook");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error":{"code":error.code(),"message":error.to_string()}})),
            );
        }
    };

    match decision {
        GithubWebhookDecision::Ping => {
            tracing::info!(delivery, "github webhook ping");
            (StatusCode::OK, Json(json!({"status":"pong"})))
        }
        GithubWebhookDecision::Ignored { reason } => {
            tracing::debug!(delivery, event = event_name, reason = %reason, "github webhook ignored");
            (
                StatusCode::ACCEPTED,
                Json(json!({"status":"ignored","reason":reason})),
            )
        }
        GithubWebhookDecision::Event(event) => {
            let kind = event.kind();
            let key = state.engine.tracker_event_key(&event);
            tracing::debug!(delivery, event = kind, key = %key, "github webhook accepted");
            // The receipt is dropped; outcomes are logged by the engine.
            let _ = state.engine.dispatch_tracker_event(event);
            (
                StatusCode::ACCEPTED,
                Json(json!({"status":"accepted","event":kind,"key":key})),
            )
        }
    }
}
