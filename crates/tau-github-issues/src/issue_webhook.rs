//! Decodes GitHub `issues` / `issue_comment` webhook deliveries into tracker events.

use serde::Deserialize;
use tau_forum_sync::TrackerEvent;
use thiserror::Error;

use crate::issue_event_collection::{GithubIssue, GithubIssueComment, GithubIssueLabel};

pub const GITHUB_EVENT_HEADER: &str = "x-github-event";
pub const GITHUB_DELIVERY_HEADER: &str = "x-github-delivery";

#[derive(Debug, Clone, PartialEq, Eq)]
/// What a webhook delivery means for the bridge.
pub enum GithubWebhookDecision {
    Ping,
    Event(TrackerEvent),
    Ignored { reason: String },
}

#[derive(Debug, Error)]
/// Enumerates webhook decoding failures.
pub enum GithubWebhookError {
    #[error("missing {GITHUB_EVENT_HEADER} header")]
    MissingEventName,
    #[error("invalid {event} payload: {source}")]
    InvalidPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{event}.{action} payload is missing its label")]
    MissingLabel { event: String, action: String },
}

impl GithubWebhookError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingEventName => "missing_event_name",
            Self::InvalidPayload { .. } => "parse_failed",
            Self::MissingLabel { .. } => "missing_label",
        }
    }
}

#[derive(Debug, Deserialize)]
struct IssuesWebhookPayload {
    action: String,
    issue: GithubIssue,
    #[serde(default)]
    label: Option<GithubIssueLabel>,
}

#[derive(Debug, Deserialize)]
struct IssueCommentWebhookPayload {
    action: String,
    issue: GithubIssue,
    comment: GithubIssueComment,
}

pub fn decode_github_webhook(
    event_name: &str,
    body: &[u8],
) -> Result<GithubWebhookDecision, GithubWebhookError> {
    let event_name = event_name.trim();
    match event_name {
        "" => Err(GithubWebhookError::MissingEventName),
        "ping" => Ok(GithubWebhookDecision::Ping),
        "issues" => {
            let payload: IssuesWebhookPayload =
                serde_json::from_slice(body).map_err(|source| {
                    GithubWebhookError::InvalidPayload {
                        event: event_name.to_string(),
                        source,
                    }
                })?;
            decode_issues_payload(payload)
        }
        "issue_comment" => {
            let payload: IssueCommentWebhookPayload =
                serde_json::from_slice(body).map_err(|source| {
                    GithubWebhookError::InvalidPayload {
                        event: event_name.to_string(),
                        source,
                    }
                })?;
            Ok(decode_issue_comment_payload(payload))
        }
        other => Ok(ignored(format!("unsupported_event:{other}"))),
    }
}

fn ignored(reason: impl Into<String>) -> GithubWebhookDecision {
    GithubWebhookDecision::Ignored {
        reason: reason.into(),
    }
}

fn decode_issues_payload(
    payload: IssuesWebhookPayload,
) -> Result<GithubWebhookDecision, GithubWebhookError> {
    let issue = payload.issue.to_tracker_issue();
    let event = match payload.action.as_str() {
        "opened" => TrackerEvent::IssueOpened(issue),
        "closed" => TrackerEvent::IssueClosed(issue),
        "reopened" => TrackerEvent::IssueReopened(issue),
        "locked" => TrackerEvent::IssueLocked(issue),
        "unlocked" => TrackerEvent::IssueUnlocked(issue),
        "deleted" => TrackerEvent::IssueDeleted(issue),
        "labeled" | "unlabeled" => {
            let Some(label) = payload.label else {
                return Err(GithubWebhookError::MissingLabel {
                    event: "issues".to_string(),
                    action: payload.action,
                });
            };
            if payload.action == "labeled" {
                TrackerEvent::IssueLabeled {
                    issue,
                    label: label.name,
                }
            } else {
                TrackerEvent::IssueUnlabeled {
                    issue,
                    label: label.name,
                }
            }
        }
        other => return Ok(ignored(format!("unsupported_action:issues.{other}"))),
    };
    Ok(GithubWebhookDecision::Event(event))
}

fn decode_issue_comment_payload(payload: IssueCommentWebhookPayload) -> GithubWebhookDecision {
    if payload.issue.is_pull_request() {
        return ignored("pull_request_comment");
    }
    let issue = payload.issue.to_tracker_issue();
    let comment = payload.comment.to_tracker_comment();
    match payload.action.as_str() {
        "created" => GithubWebhookDecision::Event(TrackerEvent::CommentCreated { issue, comment }),
        "deleted" => GithubWebhookDecision::Event(TrackerEvent::CommentDeleted { issue, comment }),
        other => ignored(format!("unsupported_action:issue_comment.{other}")),
    }
}
