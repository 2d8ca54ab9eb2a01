//! Bidirectional sync engine between a Discord forum channel and a GitHub issue tracker.
//! This crate owns the thread registry, back-link correlation, event handlers for both
//! platforms, and the per-thread dispatcher; transports plug in through `sync_transport`.

pub mod chat_actions;
pub mod chat_event_handlers;
pub mod issue_backlink;
pub mod keyed_dispatcher;
pub mod sync_engine;
pub mod sync_error;
pub mod sync_transport;
pub mod tag_vocabulary;
pub mod thread_registry;
pub mod tracker_actions;
pub mod tracker_event_handlers;

pub use issue_backlink::{extract_message_ref, render_issue_body, ChannelMessageRef};
pub use keyed_dispatcher::KeyedDispatcher;
pub use sync_engine::{ArchiveLockPropagation, SyncContext, SyncEngine, SyncOutcome, SyncReceipt};
pub use sync_error::SyncError;
pub use sync_transport::{
    ChatAttachment, ChatAuthor, ChatChannel, ChatEvent, ChatMessage, ChatThread, ChatTransport,
    CreatedIssue, ForumTag, IssueState, IssueUpdate, TrackerComment, TrackerEvent, TrackerIssue,
    TrackerTransport,
};
pub use tag_vocabulary::TagVocabulary;
pub use thread_registry::{CommentLink, ThreadRecord, ThreadRegistry};
