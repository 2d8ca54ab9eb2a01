//! Platform-neutral event and transport contracts consumed by the sync engine.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Public struct `ForumTag` used across sync components.
pub struct ForumTag {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAuthor {
    pub id: String,
    pub display_name: String,
    pub avatar: Option<String>,
    pub bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAttachment {
    pub name: String,
    pub url: String,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A message posted inside a chat thread. `channel_id` is the owning thread id.
pub struct ChatMessage {
    pub id: String,
    pub guild_id: String,
    pub channel_id: String,
    pub author: ChatAuthor,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<ChatAttachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatThread {
    pub id: String,
    pub parent_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub applied_tags: Vec<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatChannel {
    pub id: String,
    pub is_forum: bool,
    #[serde(default)]
    pub available_tags: Vec<ForumTag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates chat gateway events the engine reacts to.
pub enum ChatEvent {
    Ready,
    ThreadCreated(ChatThread),
    ThreadUpdated(ChatThread),
    ThreadDeleted {
        thread_id: String,
        parent_id: Option<String>,
    },
    MessageCreated(ChatMessage),
    MessageDeleted {
        channel_id: String,
        message_id: String,
    },
    ChannelUpdated(ChatChannel),
}

impl ChatEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::ThreadCreated(_) => "thread_created",
            Self::ThreadUpdated(_) => "thread_updated",
            Self::ThreadDeleted { .. } => "thread_deleted",
            Self::MessageCreated(_) => "message_created",
            Self::MessageDeleted { .. } => "message_deleted",
            Self::ChannelUpdated(_) => "channel_updated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerIssue {
    pub number: u64,
    pub node_id: String,
    pub title: String,
    pub body: Option<String>,
    pub state: IssueState,
    pub locked: bool,
    #[serde(default)]
    pub labels: Vec<String>,
    pub html_url: String,
    pub author_login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerComment {
    pub id: u64,
    pub body: Option<String>,
    pub html_url: String,
    pub author_login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Result of creating an issue on the tracker.
pub struct CreatedIssue {
    pub number: u64,
    pub node_id: String,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Partial update applied to an existing issue; `None` fields are left untouched.
pub struct IssueUpdate {
    pub state: Option<IssueState>,
    pub labels: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates tracker webhook events the engine reacts to.
pub enum TrackerEvent {
    IssueOpened(TrackerIssue),
    IssueClosed(TrackerIssue),
    IssueReopened(TrackerIssue),
    IssueLocked(TrackerIssue),
    IssueUnlocked(TrackerIssue),
    IssueDeleted(TrackerIssue),
    IssueLabeled {
        issue: TrackerIssue,
        label: String,
    },
    IssueUnlabeled {
        issue: TrackerIssue,
        label: String,
    },
    CommentCreated {
        issue: TrackerIssue,
        comment: TrackerComment,
    },
    CommentDeleted {
        issue: TrackerIssue,
        comment: TrackerComment,
    },
}

impl TrackerEvent {
    pub fn issue(&self) -> &TrackerIssue {
        match self {
            Self::IssueOpened(issue)
            | Self::IssueClosed(issue)
            | Self::IssueReopened(issue)
            | Self::IssueLocked(issue)
            | Self::IssueUnlocked(issue)
            | Self::IssueDeleted(issue) => issue,
            Self::IssueLabeled { issue, .. }
            | Self::IssueUnlabeled { issue, .. }
            | Self::CommentCreated { issue, .. }
            | Self::CommentDeleted { issue, .. } => issue,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::IssueOpened(_) => "issue_opened",
            Self::IssueClosed(_) => "issue_closed",
            Self::IssueReopened(_) => "issue_reopened",
            Self::IssueLocked(_) => "issue_locked",
            Self::IssueUnlocked(_) => "issue_unlocked",
            Self::IssueDeleted(_) => "issue_deleted",
            Self::IssueLabeled { .. } => "issue_labeled",
            Self::IssueUnlabeled { .. } => "issue_unlabeled",
            Self::CommentCreated { .. } => "issue_comment_created",
            Self::CommentDeleted { .. } => "issue_comment_deleted",
        }
    }
}

#[async_trait]
/// Trait contract for chat platform mutations.
pub trait ChatTransport: Send + Sync {
    /// Creates a forum thread under `channel_id` with a starter message; returns the thread id.
    async fn create_thread(
        &self,
        channel_id: &str,
        title: &str,
        content: &str,
        tag_ids: &[String],
    ) -> Result<String>;
    async fn set_thread_tags(&self, thread_id: &str, tag_ids: &[String]) -> Result<()>;
    async fn set_thread_name(&self, thread_id: &str, name: &str) -> Result<()>;
    async fn set_archived(&self, thread_id: &str, archived: bool) -> Result<()>;
    async fn set_locked(&self, thread_id: &str, locked: bool) -> Result<()>;
    /// Posts a message into a thread; returns the message id.
    async fn post_message(&self, thread_id: &str, content: &str) -> Result<String>;
    async fn delete_message(&self, thread_id: &str, message_id: &str) -> Result<()>;
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;
    async fn fetch_channel(&self, channel_id: &str) -> Result<ChatChannel>;
    /// Current state of a thread; `None` when the channel is not a thread.
    async fn fetch_thread(&self, thread_id: &str) -> Result<Option<ChatThread>>;
}

#[async_trait]
/// Trait contract for issue tracker mutations.
pub trait TrackerTransport: Send + Sync {
    /// Lists issues in every state, excluding pull requests.
    async fn list_issues(&self) -> Result<Vec<TrackerIssue>>;
    /// Lists every issue comment in the repository.
    async fn list_comments(&self) -> Result<Vec<TrackerComment>>;
    async fn create_issue(&self, title: &str, body: &str, labels: &[String])
        -> Result<CreatedIssue>;
    async fn update_issue(&self, number: u64, update: &IssueUpdate) -> Result<()>;
    async fn lock_issue(&self, number: u64) -> Result<()>;
    async fn unlock_issue(&self, number: u64) -> Result<()>;
    /// Creates a comment on an issue; returns the comment id.
    async fn create_comment(&self, number: u64, body: &str) -> Result<u64>;
    async fn delete_comment(&self, comment_id: u64) -> Result<()>;
    /// Deletes an issue by global node id.
    async fn delete_issue(&self, node_id: &str) -> Result<()>;
}
