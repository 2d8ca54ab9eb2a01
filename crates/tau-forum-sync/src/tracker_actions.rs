//! Tracker-side mutations driven by chat events, plus startup reconciliation.
//!
//! Every action checks its identifier precondition first and no-ops without it. Registry
//! writes derived from a tracker response happen only after the call succeeds.

use std::collections::HashSet;

use crate::issue_backlink::{extract_message_ref, render_issue_body};
use crate::sync_engine::{SyncContext, SyncOutcome};
use crate::sync_error::SyncError;
use crate::sync_transport::{ChatMessage, IssueState, IssueUpdate};
use crate::thread_registry::{CommentLink, ThreadRecord};

fn issue_labels(context: &SyncContext, tag_ids: &[String]) -> Vec<String> {
    // Stale tag ids translate to "", which the tracker rejects as a label name.
    context
        .vocabulary
        .labels_for_tags(tag_ids)
        .into_iter()
        .filter(|label| !label.trim().is_empty())
        .collect()
}

/// Creates the issue for a thread from its first message. Refuses if an issue is bound.
pub async fn create_issue(
    context: &SyncContext,
    thread: &ThreadRecord,
    message: &ChatMessage,
) -> Result<SyncOutcome, SyncError> {
    if thread.has_issue() {
        return Ok(SyncOutcome::Ignored("issue_already_created"));
    }
    let labels = issue_labels(context, &thread.applied_tags);
    let body = render_issue_body(message);
    let mut created = context
        .tracker
        .create_issue(&thread.title, &body, &labels)
        .await?;
    if created.body.is_none() {
        created.body = Some(body);
    }
    if !context.registry.bind_issue(&thread.thread_id, &created) {
        tracing::warn!(
            thread_id = %thread.thread_id,
            issue_number = created.number,
            "thread was removed or bound while the issue was being created"
        );
        return Ok(SyncOutcome::Degraded("issue_created_unbound"));
    }
    tracing::info!(
        thread_id = %thread.thread_id,
        issue_number = created.number,
        "created issue"
    );
    Ok(SyncOutcome::Applied("issue_created"))
}

pub async fn create_issue_comment(
    context: &SyncContext,
    thread: &ThreadRecord,
    message: &ChatMessage,
) -> Result<SyncOutcome, SyncError> {
    let Some(number) = thread.issue_number else {
        return Ok(SyncOutcome::Ignored("issue_not_created"));
    };
    let body = render_issue_body(message);
    let comment_id = context.tracker.create_comment(number, &body).await?;
    context.registry.push_comment(
        &thread.thread_id,
        CommentLink {
            message_id: message.id.clone(),
            comment_id,
        },
    );
    tracing::info!(
        thread_id = %thread.thread_id,
        issue_number = number,
        comment_id,
        "commented on issue"
    );
    Ok(SyncOutcome::Applied("comment_created"))
}

/// Replaces the issue's labels with the thread's applied tags.
pub async fn sync_issue_labels(
    context: &SyncContext,
    thread: &ThreadRecord,
) -> Result<SyncOutcome, SyncError> {
    let Some(number) = thread.issue_number else {
        return Ok(SyncOutcome::Ignored("issue_not_created"));
    };
    let update = IssueUpdate {
        state: None,
        labels: Some(issue_labels(context, &thread.applied_tags)),
    };
    context.tracker.update_issue(number, &update).await?;
    tracing::info!(thread_id = %thread.thread_id, issue_number = number, "updated issue labels");
    Ok(SyncOutcome::Applied("labels_synced"))
}

pub async fn set_issue_state(
    context: &SyncContext,
    thread: &ThreadRecord,
    state: IssueState,
) -> Result<SyncOutcome, SyncError> {
    let Some(number) = thread.issue_number else {
        return Ok(SyncOutcome::Ignored("issue_not_created"));
    };
    let update = IssueUpdate {
        state: Some(state),
        labels: None,
    };
    context.tracker.update_issue(number, &update).await?;
    context.registry.update(&thread.thread_id, |record| {
        record.archived = state == IssueState::Closed;
    });
    tracing::info!(
        thread_id = %thread.thread_id,
        issue_number = number,
        state = state.as_str(),
        "updated issue state"
    );
    Ok(match state {
        IssueState::Closed => SyncOutcome::Applied("issue_closed"),
        IssueState::Open => SyncOutcome::Applied("issue_reopened"),
    })
}

pub async fn set_issue_locked(
    context: &SyncContext,
    thread: &ThreadRecord,
    locked: bool,
) -> Result<SyncOutcome, SyncError> {
    let Some(number) = thread.issue_number else {
        return Ok(SyncOutcome::Ignored("issue_not_created"));
    };
    if locked {
        context.tracker.lock_issue(number).await?;
    } else {
        context.tracker.unlock_issue(number).await?;
    }
    context.registry.update(&thread.thread_id, |record| {
        record.locked = locked;
    });
    tracing::info!(thread_id = %thread.thread_id, issue_number = number, locked, "updated issue lock");
    Ok(if locked {
        SyncOutcome::Applied("issue_locked")
    } else {
        SyncOutcome::Applied("issue_unlocked")
    })
}

/// Deletes the issue by node id. Failures are logged only; callers already dropped the record.
pub async fn delete_issue(
    context: &SyncContext,
    thread: &ThreadRecord,
) -> Result<SyncOutcome, SyncError> {
    let Some(node_id) = thread.issue_node_id.as_deref() else {
        return Ok(SyncOutcome::Ignored("issue_not_created"));
    };
    match context.tracker.delete_issue(node_id).await {
        Ok(()) => {
            tracing::info!(thread_id = %thread.thread_id, node_id, "deleted issue");
            Ok(SyncOutcome::Applied("issue_deleted"))
        }
        Err(error) => {
            tracing::warn!(
                thread_id = %thread.thread_id,
                node_id,
                error = %error,
                "failed to delete issue"
            );
            Ok(SyncOutcome::Degraded("issue_delete_failed"))
        }
    }
}

/// Deletes a mirrored comment. Failures are logged only; the correlation is already gone.
pub async fn delete_issue_comment(
    context: &SyncContext,
    thread: &ThreadRecord,
    comment_id: u64,
) -> Result<SyncOutcome, SyncError> {
    match context.tracker.delete_comment(comment_id).await {
        Ok(()) => {
            tracing::info!(thread_id = %thread.thread_id, comment_id, "deleted issue comment");
            Ok(SyncOutcome::Applied("comment_deleted"))
        }
        Err(error) => {
            tracing::warn!(
                thread_id = %thread.thread_id,
                comment_id,
                error = %error,
                "failed to delete issue comment"
            );
            Ok(SyncOutcome::Degraded("comment_delete_failed"))
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub threads_loaded: usize,
    pub comments_linked: usize,
    pub issues_skipped: usize,
}

/// Rebuilds thread records from tracker history.
///
/// Issues without a resolvable back-link are unrelated to the bridge and skipped. Comments
/// are linked in a second pass; failing to list them keeps the threads already built.
/// Records already present in the registry are left untouched.
pub async fn reconcile_threads(context: &SyncContext) -> Result<ReconcileReport, SyncError> {
    let issues = context.tracker.list_issues().await?;
    let mut report = ReconcileReport::default();
    let mut seen = HashSet::new();
    for issue in issues {
        let Some(body) = issue.body.as_deref().filter(|body| !body.trim().is_empty()) else {
            report.issues_skipped += 1;
            continue;
        };
        let Some(reference) = extract_message_ref(body) else {
            report.issues_skipped += 1;
            continue;
        };
        if !seen.insert(reference.channel_id.clone()) {
            report.issues_skipped += 1;
            continue;
        }
        let record = ThreadRecord {
            thread_id: reference.channel_id,
            issue_number: Some(issue.number),
            issue_node_id: Some(issue.node_id.clone()),
            title: issue.title.clone(),
            applied_tags: context
                .vocabulary
                .tags_for_labels(issue.labels.iter().map(String::as_str)),
            archived: issue.state == IssueState::Closed,
            locked: issue.locked,
            body: Some(body.to_string()),
            comments: Vec::new(),
        };
        if context.registry.insert_if_absent(record) {
            report.threads_loaded += 1;
        }
    }

    match context.tracker.list_comments().await {
        Ok(comments) => {
            for comment in comments {
                let Some(reference) = comment.body.as_deref().and_then(extract_message_ref) else {
                    continue;
                };
                let linked = context.registry.push_comment(
                    &reference.channel_id,
                    CommentLink {
                        message_id: reference.message_id,
                        comment_id: comment.id,
                    },
                );
                if linked {
                    report.comments_linked += 1;
                }
            }
        }
        Err(error) => {
            tracing::warn!(error = %error, "failed to list issue comments during reconciliation");
        }
    }

    Ok(report)
}
