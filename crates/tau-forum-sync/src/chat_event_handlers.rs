//! Handlers for chat gateway events. Each translates one event into tracker mutations.

use std::collections::HashSet;

use crate::sync_engine::{ArchiveLockPropagation, SyncContext, SyncOutcome};
use crate::sync_error::SyncError;
use crate::sync_transport::{ChatChannel, ChatEvent, ChatMessage, ChatThread, IssueState};
use crate::thread_registry::ThreadRecord;
use crate::tracker_actions;

pub async fn handle_chat_event(
    context: &SyncContext,
    event: ChatEvent,
) -> Result<SyncOutcome, SyncError> {
    match event {
        ChatEvent::Ready => handle_ready(context).await,
        ChatEvent::ThreadCreated(thread) => Ok(handle_thread_created(context, thread)),
        ChatEvent::ThreadUpdated(thread) => handle_thread_updated(context, thread).await,
        ChatEvent::ThreadDeleted {
            thread_id,
            parent_id,
        } => handle_thread_deleted(context, &thread_id, parent_id.as_deref()).await,
        ChatEvent::MessageCreated(message) => handle_message_created(context, &message).await,
        ChatEvent::MessageDeleted {
            channel_id,
            message_id,
        } => handle_message_deleted(context, &channel_id, &message_id).await,
        ChatEvent::ChannelUpdated(channel) => Ok(handle_channel_updated(context, channel)),
    }
}

/// Loads the tag vocabulary, then rebuilds the registry from tracker history.
pub async fn handle_ready(context: &SyncContext) -> Result<SyncOutcome, SyncError> {
    match context.chat.fetch_channel(&context.bound_channel_id).await {
        Ok(channel) => {
            tracing::info!(
                channel_id = %channel.id,
                tags = channel.available_tags.len(),
                "loaded forum tag vocabulary"
            );
            context.vocabulary.replace(channel.available_tags);
        }
        Err(error) => {
            tracing::warn!(error = %error, "failed to load forum tag vocabulary");
        }
    }

    let report = tracker_actions::reconcile_threads(context).await?;
    tracing::info!(
        threads = report.threads_loaded,
        comments = report.comments_linked,
        skipped = report.issues_skipped,
        "issues loaded"
    );
    Ok(SyncOutcome::Applied("registry_reconciled"))
}

pub fn handle_thread_created(context: &SyncContext, thread: ChatThread) -> SyncOutcome {
    if !context.is_bound_channel(thread.parent_id.as_deref()) {
        return SyncOutcome::Ignored("outside_bound_channel");
    }
    let mut record = ThreadRecord::new(thread.id, thread.name);
    record.applied_tags = thread.applied_tags;
    record.archived = thread.archived;
    record.locked = thread.locked;
    if context.registry.insert_if_absent(record) {
        SyncOutcome::Applied("thread_registered")
    } else {
        SyncOutcome::Ignored("thread_already_registered")
    }
}

/// Order-insensitive tag comparison; Discord may reorder tags without a semantic change.
fn same_tag_set(left: &[String], right: &[String]) -> bool {
    let left = left.iter().collect::<HashSet<_>>();
    let right = right.iter().collect::<HashSet<_>>();
    left == right
}

pub async fn handle_thread_updated(
    context: &SyncContext,
    thread: ChatThread,
) -> Result<SyncOutcome, SyncError> {
    if !context.is_bound_channel(thread.parent_id.as_deref()) {
        return Ok(SyncOutcome::Ignored("outside_bound_channel"));
    }
    let Some(stored) = context.registry.get(&thread.id) else {
        return Ok(SyncOutcome::Ignored("unknown_thread"));
    };
    let flags_changed = context.archive_lock_propagation == ArchiveLockPropagation::Enabled
        && (stored.archived != thread.archived || stored.locked != thread.locked);
    let thread = if !same_tag_set(&stored.applied_tags, &thread.applied_tags) || flags_changed {
        current_thread_state(context, thread).await
    } else {
        thread
    };

    let mut outcome = SyncOutcome::Ignored("no_tag_change");
    if !same_tag_set(&stored.applied_tags, &thread.applied_tags) {
        let mut candidate = stored.clone();
        candidate.applied_tags = thread.applied_tags.clone();
        outcome = tracker_actions::sync_issue_labels(context, &candidate).await?;
        context.registry.update(&thread.id, |record| {
            record.applied_tags = thread.applied_tags.clone();
        });
    }

    if let Some(propagated) = propagate_archive_lock(context, &stored, &thread).await? {
        if !outcome.is_applied() {
            outcome = propagated;
        }
    }
    Ok(outcome)
}

/// Gateway events may be delivered out of order, so a change is checked against the thread's
/// live state before it is mirrored. Falls back to the event when the lookup fails.
async fn current_thread_state(context: &SyncContext, thread: ChatThread) -> ChatThread {
    match context.chat.fetch_thread(&thread.id).await {
        Ok(Some(current)) => current,
        Ok(None) => thread,
        Err(error) => {
            tracing::warn!(thread_id = %thread.id, error = %error, "failed to refresh thread state");
            thread
        }
    }
}

/// Registers a thread whose first message overtook its creation event.
async fn resolve_unknown_thread(
    context: &SyncContext,
    channel_id: &str,
) -> Result<Option<ThreadRecord>, SyncError> {
    if context.registry.is_foreign_channel(channel_id) {
        return Ok(None);
    }
    let Some(thread) = context.chat.fetch_thread(channel_id).await? else {
        context.registry.mark_foreign_channel(channel_id);
        return Ok(None);
    };
    if !context.is_bound_channel(thread.parent_id.as_deref()) {
        context.registry.mark_foreign_channel(channel_id);
        return Ok(None);
    }
    tracing::debug!(thread_id = %thread.id, "registered thread ahead of its creation event");
    handle_thread_created(context, thread);
    Ok(context.registry.get(channel_id))
}

/// Pushes chat archive/lock flips to the tracker when explicitly enabled.
///
/// Disabled by default: archiving a forum post also locks it, and mirroring the pair
/// re-enters through the tracker's closed/locked webhooks.
async fn propagate_archive_lock(
    context: &SyncContext,
    stored: &ThreadRecord,
    thread: &ChatThread,
) -> Result<Option<SyncOutcome>, SyncError> {
    let locked_changed = stored.locked != thread.locked;
    let archived_changed = stored.archived != thread.archived;
    if !locked_changed && !archived_changed {
        return Ok(None);
    }
    if context.archive_lock_propagation == ArchiveLockPropagation::Disabled {
        tracing::debug!(
            thread_id = %thread.id,
            archived = thread.archived,
            locked = thread.locked,
            "archive/lock propagation disabled; change not mirrored"
        );
        return Ok(None);
    }

    let mut outcome = None;
    if locked_changed {
        outcome = Some(tracker_actions::set_issue_locked(context, stored, thread.locked).await?);
    }
    if archived_changed {
        let state = if thread.archived {
            IssueState::Closed
        } else {
            IssueState::Open
        };
        outcome = Some(tracker_actions::set_issue_state(context, stored, state).await?);
    }
    Ok(outcome)
}

pub fn handle_channel_updated(context: &SyncContext, channel: ChatChannel) -> SyncOutcome {
    if channel.id != context.bound_channel_id {
        return SyncOutcome::Ignored("outside_bound_channel");
    }
    if !channel.is_forum {
        return SyncOutcome::Ignored("not_forum_channel");
    }
    tracing::info!(tags = channel.available_tags.len(), "refreshed forum tag vocabulary");
    context.vocabulary.replace(channel.available_tags);
    SyncOutcome::Applied("tag_vocabulary_refreshed")
}

/// First message of a thread becomes the issue; later ones become comments.
pub async fn handle_message_created(
    context: &SyncContext,
    message: &ChatMessage,
) -> Result<SyncOutcome, SyncError> {
    if message.author.bot {
        return Ok(SyncOutcome::Ignored("bot_author"));
    }
    let thread = match context.registry.get(&message.channel_id) {
        Some(thread) => thread,
        None => match resolve_unknown_thread(context, &message.channel_id).await? {
            Some(thread) => thread,
            None => return Ok(SyncOutcome::Ignored("unknown_thread")),
        },
    };
    if thread.body.is_none() {
        tracker_actions::create_issue(context, &thread, message).await
    } else {
        tracker_actions::create_issue_comment(context, &thread, message).await
    }
}

pub async fn handle_message_deleted(
    context: &SyncContext,
    channel_id: &str,
    message_id: &str,
) -> Result<SyncOutcome, SyncError> {
    if !context.registry.contains(channel_id) {
        return Ok(SyncOutcome::Ignored("unknown_thread"));
    }
    let Some(link) = context.registry.take_comment(channel_id, message_id) else {
        return Ok(SyncOutcome::Ignored("message_not_mirrored"));
    };
    let Some(thread) = context.registry.get(channel_id) else {
        return Ok(SyncOutcome::Ignored("unknown_thread"));
    };
    tracker_actions::delete_issue_comment(context, &thread, link.comment_id).await
}

pub async fn handle_thread_deleted(
    context: &SyncContext,
    thread_id: &str,
    parent_id: Option<&str>,
) -> Result<SyncOutcome, SyncError> {
    if !context.is_bound_channel(parent_id) {
        return Ok(SyncOutcome::Ignored("outside_bound_channel"));
    }
    let Some(thread) = context.registry.remove(thread_id) else {
        return Ok(SyncOutcome::Ignored("unknown_thread"));
    };
    tracker_actions::delete_issue(context, &thread).await
}
