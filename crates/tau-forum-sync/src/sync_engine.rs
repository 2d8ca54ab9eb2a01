//! Sync engine: shared context plus per-thread dispatch of chat and tracker events.

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::chat_event_handlers::handle_chat_event;
use crate::issue_backlink::extract_message_ref;
use crate::keyed_dispatcher::KeyedDispatcher;
use crate::sync_error::SyncError;
use crate::sync_transport::{ChatEvent, ChatTransport, TrackerEvent, TrackerTransport};
use crate::tag_vocabulary::TagVocabulary;
use crate::thread_registry::ThreadRegistry;
use crate::tracker_event_handlers::handle_tracker_event;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Whether chat-side archive/lock changes are pushed to the tracker.
///
/// Discord locks a forum post when it archives it, so mirroring both flags closes and
/// locks the issue together and the tracker webhooks echo back. Off unless opted in.
pub enum ArchiveLockPropagation {
    #[default]
    Disabled,
    Enabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Result of handling one event.
pub enum SyncOutcome {
    /// A mutation was mirrored to the other side.
    Applied(&'static str),
    /// Nothing to do; the value is a reason code.
    Ignored(&'static str),
    /// Local state changed but the remote mutation failed and was only logged.
    Degraded(&'static str),
}

impl SyncOutcome {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Applied(code) | Self::Ignored(code) | Self::Degraded(code) => code,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

pub type SyncReceipt = oneshot::Receiver<Result<SyncOutcome, SyncError>>;

/// Shared state and collaborators passed to every handler.
pub struct SyncContext {
    pub bound_channel_id: String,
    pub registry: ThreadRegistry,
    pub vocabulary: TagVocabulary,
    pub chat: Arc<dyn ChatTransport>,
    pub tracker: Arc<dyn TrackerTransport>,
    pub archive_lock_propagation: ArchiveLockPropagation,
}

impl SyncContext {
    pub fn new(
        bound_channel_id: impl Into<String>,
        chat: Arc<dyn ChatTransport>,
        tracker: Arc<dyn TrackerTransport>,
    ) -> Self {
        Self {
            bound_channel_id: bound_channel_id.into(),
            registry: ThreadRegistry::new(),
            vocabulary: TagVocabulary::new(),
            chat,
            tracker,
            archive_lock_propagation: ArchiveLockPropagation::default(),
        }
    }

    pub fn with_archive_lock_propagation(mut self, mode: ArchiveLockPropagation) -> Self {
        self.archive_lock_propagation = mode;
        self
    }

    pub fn is_bound_channel(&self, parent_id: Option<&str>) -> bool {
        parent_id == Some(self.bound_channel_id.as_str())
    }
}

/// Routes events onto per-thread queues so a thread's events never interleave.
pub struct SyncEngine {
    context: Arc<SyncContext>,
    dispatcher: KeyedDispatcher,
}

impl SyncEngine {
    pub fn new(context: SyncContext) -> Self {
        Self {
            context: Arc::new(context),
            dispatcher: KeyedDispatcher::new(),
        }
    }

    pub fn context(&self) -> &Arc<SyncContext> {
        &self.context
    }

    pub fn chat_event_key(&self, event: &ChatEvent) -> String {
        match event {
            ChatEvent::Ready => "chat:ready".to_string(),
            ChatEvent::ChannelUpdated(channel) => format!("channel:{}", channel.id),
            ChatEvent::ThreadCreated(thread) | ChatEvent::ThreadUpdated(thread) => {
                thread.id.clone()
            }
            ChatEvent::ThreadDeleted { thread_id, .. } => thread_id.clone(),
            ChatEvent::MessageCreated(message) => message.channel_id.clone(),
            ChatEvent::MessageDeleted { channel_id, .. } => channel_id.clone(),
        }
    }

    /// Bound issues share their thread's key. An opened issue whose back-link names a known
    /// thread also joins that key, so it queues behind an in-flight issue creation.
    pub fn tracker_event_key(&self, event: &TrackerEvent) -> String {
        let issue = event.issue();
        if let Some(record) = self.context.registry.find_by_node_id(&issue.node_id) {
            return record.thread_id;
        }
        if let TrackerEvent::IssueOpened(issue) = event {
            if let Some(reference) = issue.body.as_deref().and_then(extract_message_ref) {
                if self.context.registry.contains(&reference.channel_id) {
                    return reference.channel_id;
                }
            }
        }
        format!("issue:{}", issue.node_id)
    }

    pub fn dispatch_chat_event(&self, event: ChatEvent) -> SyncReceipt {
        let key = self.chat_event_key(&event);
        let kind = event.kind();
        let context = Arc::clone(&self.context);
        let (sender, receipt) = oneshot::channel();
        let job_key = key.clone();
        self.dispatcher.submit(&key, async move {
            let result = handle_chat_event(&context, event).await;
            log_outcome("chat", kind, &job_key, &result);
            let _ = sender.send(result);
        });
        receipt
    }

    pub fn dispatch_tracker_event(&self, event: TrackerEvent) -> SyncReceipt {
        let key = self.tracker_event_key(&event);
        let kind = event.kind();
        let context = Arc::clone(&self.context);
        let (sender, receipt) = oneshot::channel();
        let job_key = key.clone();
        self.dispatcher.submit(&key, async move {
            let result = handle_tracker_event(&context, event).await;
            log_outcome("tracker", kind, &job_key, &result);
            let _ = sender.send(result);
        });
        receipt
    }

    /// Dispatches and waits for the handler to finish.
    pub async fn handle_chat_event(&self, event: ChatEvent) -> Result<SyncOutcome, SyncError> {
        self.dispatch_chat_event(event)
            .await
            .unwrap_or_else(|_| Err(SyncError::Dropped))
    }

    /// Dispatches and waits for the handler to finish.
    pub async fn handle_tracker_event(
        &self,
        event: TrackerEvent,
    ) -> Result<SyncOutcome, SyncError> {
        self.dispatch_tracker_event(event)
            .await
            .unwrap_or_else(|_| Err(SyncError::Dropped))
    }
}

fn log_outcome(
    source: &'static str,
    event: &'static str,
    key: &str,
    result: &Result<SyncOutcome, SyncError>,
) {
    match result {
        Ok(SyncOutcome::Applied(action)) => {
            tracing::info!(source, event, key, action, "sync event applied");
        }
        Ok(SyncOutcome::Ignored(reason)) => {
            tracing::debug!(source, event, key, reason, "sync event ignored");
        }
        Ok(SyncOutcome::Degraded(action)) => {
            tracing::warn!(source, event, key, action, "sync event degraded");
        }
        Err(error) => {
            tracing::warn!(
                source,
                event,
                key,
                reason = error.reason_code(),
                error = %error,
                "sync event failed"
            );
        }
    }
}
