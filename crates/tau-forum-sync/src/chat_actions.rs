//! Chat-side mutations driven by tracker events.

use crate::sync_engine::{SyncContext, SyncOutcome};
use crate::sync_error::SyncError;
use crate::sync_transport::{CreatedIssue, IssueState, TrackerComment, TrackerIssue};
use crate::thread_registry::{CommentLink, ThreadRecord};

pub const DISCORD_MESSAGE_MAX_CHARS: usize = 2_000;
pub const DISCORD_THREAD_NAME_MAX_CHARS: usize = 100;

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text
        .chars()
        .take(max_chars.saturating_sub(3))
        .collect::<String>();
    truncated.push_str("...");
    truncated
}

/// `#<number>: <title>`, or `None` when it would exceed the thread name limit.
pub fn numbered_thread_name(number: u64, title: &str) -> Option<String> {
    let name = format!("#{number}: {title}");
    (name.chars().count() <= DISCORD_THREAD_NAME_MAX_CHARS).then_some(name)
}

/// Renders tracker-authored text for chat, marked with its tracker origin.
pub fn render_tracker_post(author_login: &str, html_url: &str, body: &str) -> String {
    let rendered = format!("[{author_login}](<{html_url}>) `GitHub`\n\n{}", body.trim());
    truncate_chars(&rendered, DISCORD_MESSAGE_MAX_CHARS)
}

pub fn render_issue_acknowledgement(html_url: &str) -> String {
    format!("GitHub Issue: <{html_url}>\nThank you for your report!")
}

/// Creates a forum thread mirroring an issue opened on the tracker.
pub async fn create_thread_for_issue(
    context: &SyncContext,
    issue: &TrackerIssue,
) -> Result<SyncOutcome, SyncError> {
    let tag_ids = context
        .vocabulary
        .tags_for_labels(issue.labels.iter().map(String::as_str));
    let name = numbered_thread_name(issue.number, &issue.title)
        .unwrap_or_else(|| truncate_chars(&issue.title, DISCORD_THREAD_NAME_MAX_CHARS));
    let content = render_tracker_post(
        &issue.author_login,
        &issue.html_url,
        issue.body.as_deref().unwrap_or_default(),
    );
    let thread_id = context
        .chat
        .create_thread(&context.bound_channel_id, &name, &content, &tag_ids)
        .await?;

    let created = CreatedIssue {
        number: issue.number,
        node_id: issue.node_id.clone(),
        body: Some(issue.body.clone().unwrap_or_default()),
    };
    let mut record = ThreadRecord::new(thread_id.clone(), issue.title.clone());
    record.applied_tags = tag_ids.clone();
    record.archived = issue.state == IssueState::Closed;
    record.locked = issue.locked;
    record.bind_issue(&created);
    if !context.registry.insert_if_absent(record) {
        // The gateway thread-create event registered the thread first.
        context.registry.update(&thread_id, |existing| {
            existing.bind_issue(&created);
            existing.applied_tags = tag_ids;
        });
    }
    tracing::info!(thread_id = %thread_id, issue_number = issue.number, "created thread for issue");
    Ok(SyncOutcome::Applied("thread_created"))
}

/// Re-notification for an issue whose thread already exists: number the thread and acknowledge.
pub async fn announce_issue(
    context: &SyncContext,
    thread: &ThreadRecord,
    issue: &TrackerIssue,
) -> Result<SyncOutcome, SyncError> {
    if !thread.has_issue() {
        context.registry.bind_issue(
            &thread.thread_id,
            &CreatedIssue {
                number: issue.number,
                node_id: issue.node_id.clone(),
                body: issue.body.clone(),
            },
        );
    }
    if let Some(name) = numbered_thread_name(issue.number, &thread.title) {
        context.chat.set_thread_name(&thread.thread_id, &name).await?;
    }
    context
        .chat
        .post_message(&thread.thread_id, &render_issue_acknowledgement(&issue.html_url))
        .await?;
    tracing::info!(
        thread_id = %thread.thread_id,
        issue_number = issue.number,
        "announced issue in thread"
    );
    Ok(SyncOutcome::Applied("issue_announced"))
}

/// Posts a tracker comment into the thread and records the correlation.
pub async fn post_tracker_comment(
    context: &SyncContext,
    thread: &ThreadRecord,
    comment: &TrackerComment,
) -> Result<SyncOutcome, SyncError> {
    let content = render_tracker_post(
        &comment.author_login,
        &comment.html_url,
        comment.body.as_deref().unwrap_or_default(),
    );
    let message_id = context
        .chat
        .post_message(&thread.thread_id, &content)
        .await?;
    context.registry.push_comment(
        &thread.thread_id,
        CommentLink {
            message_id,
            comment_id: comment.id,
        },
    );
    tracing::info!(
        thread_id = %thread.thread_id,
        comment_id = comment.id,
        "mirrored issue comment into thread"
    );
    Ok(SyncOutcome::Applied("comment_mirrored"))
}

pub async fn set_thread_archived(
    context: &SyncContext,
    thread: &ThreadRecord,
    archived: bool,
) -> Result<SyncOutcome, SyncError> {
    context
        .chat
        .set_archived(&thread.thread_id, archived)
        .await?;
    context.registry.update(&thread.thread_id, |record| {
        record.archived = archived;
    });
    tracing::info!(thread_id = %thread.thread_id, archived, "updated thread archive state");
    Ok(if archived {
        SyncOutcome::Applied("thread_archived")
    } else {
        SyncOutcome::Applied("thread_unarchived")
    })
}

pub async fn set_thread_locked(
    context: &SyncContext,
    thread: &ThreadRecord,
    locked: bool,
) -> Result<SyncOutcome, SyncError> {
    context.chat.set_locked(&thread.thread_id, locked).await?;
    context.registry.update(&thread.thread_id, |record| {
        record.locked = locked;
    });
    tracing::info!(thread_id = %thread.thread_id, locked, "updated thread lock state");
    Ok(if locked {
        SyncOutcome::Applied("thread_locked")
    } else {
        SyncOutcome::Applied("thread_unlocked")
    })
}

/// Adds a tag; a tag already applied is a no-op so label echoes stop here.
pub async fn add_thread_tag(
    context: &SyncContext,
    thread: &ThreadRecord,
    tag_id: &str,
) -> Result<SyncOutcome, SyncError> {
    if thread.applied_tags.iter().any(|applied| applied == tag_id) {
        return Ok(SyncOutcome::Ignored("tag_already_applied"));
    }
    let mut tags = thread.applied_tags.clone();
    tags.push(tag_id.to_string());
    apply_thread_tags(context, thread, tags).await?;
    Ok(SyncOutcome::Applied("thread_tag_added"))
}

pub async fn remove_thread_tag(
    context: &SyncContext,
    thread: &ThreadRecord,
    tag_id: &str,
) -> Result<SyncOutcome, SyncError> {
    if !thread.applied_tags.iter().any(|applied| applied == tag_id) {
        return Ok(SyncOutcome::Ignored("tag_not_applied"));
    }
    let tags = thread
        .applied_tags
        .iter()
        .filter(|applied| applied.as_str() != tag_id)
        .cloned()
        .collect::<Vec<_>>();
    apply_thread_tags(context, thread, tags).await?;
    Ok(SyncOutcome::Applied("thread_tag_removed"))
}

async fn apply_thread_tags(
    context: &SyncContext,
    thread: &ThreadRecord,
    tags: Vec<String>,
) -> Result<(), SyncError> {
    context.chat.set_thread_tags(&thread.thread_id, &tags).await?;
    tracing::info!(thread_id = %thread.thread_id, tags = ?tags, "updated thread tags");
    context.registry.update(&thread.thread_id, |record| {
        record.applied_tags = tags;
    });
    Ok(())
}

pub async fn delete_mirrored_message(
    context: &SyncContext,
    thread: &ThreadRecord,
    message_id: &str,
) -> Result<SyncOutcome, SyncError> {
    match context
        .chat
        .delete_message(&thread.thread_id, message_id)
        .await
    {
        Ok(()) => {
            tracing::info!(thread_id = %thread.thread_id, message_id, "deleted mirrored message");
            Ok(SyncOutcome::Applied("message_deleted"))
        }
        Err(error) => {
            tracing::warn!(
                thread_id = %thread.thread_id,
                message_id,
                error = %error,
                "failed to delete mirrored message"
            );
            Ok(SyncOutcome::Degraded("message_delete_failed"))
        }
    }
}

/// Deletes the chat thread. Failures are logged only; callers already dropped the record.
pub async fn delete_thread(
    context: &SyncContext,
    thread: &ThreadRecord,
) -> Result<SyncOutcome, SyncError> {
    match context.chat.delete_thread(&thread.thread_id).await {
        Ok(()) => {
            tracing::info!(thread_id = %thread.thread_id, "deleted thread");
            Ok(SyncOutcome::Applied("thread_deleted"))
        }
        Err(error) => {
            tracing::warn!(thread_id = %thread.thread_id, error = %error, "failed to delete thread");
            Ok(SyncOutcome::Degraded("thread_delete_failed"))
        }
    }
}
