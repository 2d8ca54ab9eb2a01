//! Handlers for tracker webhook events. Issues not bound to a thread are ignored.

use crate::chat_actions;
use crate::issue_backlink::{extract_message_ref, has_backlink};
use crate::sync_engine::{SyncContext, SyncOutcome};
use crate::sync_error::SyncError;
use crate::sync_transport::{TrackerComment, TrackerEvent, TrackerIssue};
use crate::thread_registry::ThreadRecord;

pub async fn handle_tracker_event(
    context: &SyncContext,
    event: TrackerEvent,
) -> Result<SyncOutcome, SyncError> {
    match event {
        TrackerEvent::IssueOpened(issue) => handle_issue_opened(context, &issue).await,
        TrackerEvent::CommentCreated { issue, comment } => {
            handle_comment_created(context, &issue, &comment).await
        }
        TrackerEvent::CommentDeleted { issue, comment } => {
            handle_comment_deleted(context, &issue, &comment).await
        }
        TrackerEvent::IssueClosed(issue) => {
            let Some(thread) = bound_thread(context, &issue) else {
                return Ok(SyncOutcome::Ignored("unbound_issue"));
            };
            chat_actions::set_thread_archived(context, &thread, true).await
        }
        TrackerEvent::IssueReopened(issue) => {
            let Some(thread) = bound_thread(context, &issue) else {
                return Ok(SyncOutcome::Ignored("unbound_issue"));
            };
            chat_actions::set_thread_archived(context, &thread, false).await
        }
        TrackerEvent::IssueLocked(issue) => {
            let Some(thread) = bound_thread(context, &issue) else {
                return Ok(SyncOutcome::Ignored("unbound_issue"));
            };
            chat_actions::set_thread_locked(context, &thread, true).await
        }
        TrackerEvent::IssueUnlocked(issue) => {
            let Some(thread) = bound_thread(context, &issue) else {
                return Ok(SyncOutcome::Ignored("unbound_issue"));
            };
            chat_actions::set_thread_locked(context, &thread, false).await
        }
        TrackerEvent::IssueDeleted(issue) => handle_issue_deleted(context, &issue).await,
        TrackerEvent::IssueLabeled { issue, label } => {
            handle_label_change(context, &issue, &label, true).await
        }
        TrackerEvent::IssueUnlabeled { issue, label } => {
            handle_label_change(context, &issue, &label, false).await
        }
    }
}

fn bound_thread(context: &SyncContext, issue: &TrackerIssue) -> Option<ThreadRecord> {
    context.registry.find_by_node_id(&issue.node_id)
}

/// A known back-link or node id means the thread exists: announce instead of duplicating.
pub async fn handle_issue_opened(
    context: &SyncContext,
    issue: &TrackerIssue,
) -> Result<SyncOutcome, SyncError> {
    let known = issue
        .body
        .as_deref()
        .and_then(extract_message_ref)
        .and_then(|reference| context.registry.get(&reference.channel_id))
        .or_else(|| bound_thread(context, issue));
    match known {
        Some(thread) => chat_actions::announce_issue(context, &thread, issue).await,
        None => chat_actions::create_thread_for_issue(context, issue).await,
    }
}

pub async fn handle_comment_created(
    context: &SyncContext,
    issue: &TrackerIssue,
    comment: &TrackerComment,
) -> Result<SyncOutcome, SyncError> {
    if has_backlink(comment.body.as_deref()) {
        return Ok(SyncOutcome::Ignored("mirrored_from_chat"));
    }
    let Some(thread) = bound_thread(context, issue) else {
        return Ok(SyncOutcome::Ignored("unbound_issue"));
    };
    chat_actions::post_tracker_comment(context, &thread, comment).await
}

/// Removes the chat message correlated with a deleted comment. The link is dropped first so the
/// gateway's message-delete echo finds nothing to mirror back.
pub async fn handle_comment_deleted(
    context: &SyncContext,
    issue: &TrackerIssue,
    comment: &TrackerComment,
) -> Result<SyncOutcome, SyncError> {
    let Some(thread) = bound_thread(context, issue) else {
        return Ok(SyncOutcome::Ignored("unbound_issue"));
    };
    let Some(link) = context
        .registry
        .take_comment_by_id(&thread.thread_id, comment.id)
    else {
        return Ok(SyncOutcome::Ignored("comment_not_mirrored"));
    };
    chat_actions::delete_mirrored_message(context, &thread, &link.message_id).await
}

pub async fn handle_issue_deleted(
    context: &SyncContext,
    issue: &TrackerIssue,
) -> Result<SyncOutcome, SyncError> {
    let Some(thread) = bound_thread(context, issue) else {
        return Ok(SyncOutcome::Ignored("unbound_issue"));
    };
    context.registry.remove(&thread.thread_id);
    chat_actions::delete_thread(context, &thread).await
}

pub async fn handle_label_change(
    context: &SyncContext,
    issue: &TrackerIssue,
    label: &str,
    added: bool,
) -> Result<SyncOutcome, SyncError> {
    let Some(thread) = bound_thread(context, issue) else {
        return Ok(SyncOutcome::Ignored("unbound_issue"));
    };
    let Some(tag_id) = context.vocabulary.tag_id_for_label(label) else {
        return Ok(SyncOutcome::Ignored("unknown_label"));
    };
    if added {
        chat_actions::add_thread_tag(context, &thread, &tag_id).await
    } else {
        chat_actions::remove_thread_tag(context, &thread, &tag_id).await
    }
}
