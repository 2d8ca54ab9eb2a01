//! In-memory table correlating chat threads with tracker issues.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::sync_transport::CreatedIssue;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Correlates one chat message with the tracker comment mirroring it.
pub struct CommentLink {
    pub message_id: String,
    pub comment_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Public struct `ThreadRecord` binding one chat thread to at most one issue.
pub struct ThreadRecord {
    pub thread_id: String,
    pub issue_number: Option<u64>,
    pub issue_node_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub applied_tags: Vec<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub locked: bool,
    pub body: Option<String>,
    #[serde(default)]
    pub comments: Vec<CommentLink>,
}

impl ThreadRecord {
    pub fn new(thread_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            issue_number: None,
            issue_node_id: None,
            title: title.into(),
            applied_tags: Vec::new(),
            archived: false,
            locked: false,
            body: None,
            comments: Vec::new(),
        }
    }

    pub fn has_issue(&self) -> bool {
        self.issue_number.is_some()
    }

    /// Binds the tracker identifiers. Refuses when an issue is already bound.
    pub fn bind_issue(&mut self, created: &CreatedIssue) -> bool {
        if self.issue_number.is_some() {
            return false;
        }
        self.issue_number = Some(created.number);
        self.issue_node_id = Some(created.node_id.clone());
        self.body = Some(created.body.clone().unwrap_or_default());
        true
    }

    /// Appends a comment correlation unless the message is already correlated.
    pub fn push_comment(&mut self, link: CommentLink) -> bool {
        if self
            .comments
            .iter()
            .any(|existing| existing.message_id == link.message_id)
        {
            return false;
        }
        self.comments.push(link);
        true
    }

    pub fn take_comment(&mut self, message_id: &str) -> Option<CommentLink> {
        let index = self
            .comments
            .iter()
            .position(|link| link.message_id == message_id)?;
        Some(self.comments.remove(index))
    }

    pub fn take_comment_by_id(&mut self, comment_id: u64) -> Option<CommentLink> {
        let index = self
            .comments
            .iter()
            .position(|link| link.comment_id == comment_id)?;
        Some(self.comments.remove(index))
    }
}

#[derive(Debug, Default)]
/// Process-wide thread table. Each call is atomic; cross-event ordering is the dispatcher's job.
pub struct ThreadRegistry {
    threads: RwLock<HashMap<String, ThreadRecord>>,
    /// Channels resolved as outside the bound forum, so their messages skip the lookup.
    foreign_channels: RwLock<HashSet<String>>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ThreadRecord>> {
        self.threads.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ThreadRecord>> {
        self.threads.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_foreign_channel(&self, channel_id: &str) -> bool {
        self.foreign_channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(channel_id)
    }

    pub fn mark_foreign_channel(&self, channel_id: &str) {
        self.foreign_channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel_id.to_string());
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn contains(&self, thread_id: &str) -> bool {
        self.read().contains_key(thread_id)
    }

    pub fn get(&self, thread_id: &str) -> Option<ThreadRecord> {
        self.read().get(thread_id).cloned()
    }

    pub fn find_by_node_id(&self, node_id: &str) -> Option<ThreadRecord> {
        self.read()
            .values()
            .find(|record| record.issue_node_id.as_deref() == Some(node_id))
            .cloned()
    }

    pub fn find_by_issue_number(&self, number: u64) -> Option<ThreadRecord> {
        self.read()
            .values()
            .find(|record| record.issue_number == Some(number))
            .cloned()
    }

    pub fn thread_ids(&self) -> Vec<String> {
        let mut ids = self.read().keys().cloned().collect::<Vec<_>>();
        ids.sort();
        ids
    }

    /// Inserts the record unless the thread id is already registered.
    pub fn insert_if_absent(&self, record: ThreadRecord) -> bool {
        let mut threads = self.write();
        if threads.contains_key(&record.thread_id) {
            return false;
        }
        threads.insert(record.thread_id.clone(), record);
        true
    }

    /// Applies `mutate` to the stored record in place.
    pub fn update<R>(
        &self,
        thread_id: &str,
        mutate: impl FnOnce(&mut ThreadRecord) -> R,
    ) -> Option<R> {
        self.write().get_mut(thread_id).map(mutate)
    }

    pub fn bind_issue(&self, thread_id: &str, created: &CreatedIssue) -> bool {
        self.update(thread_id, |record| record.bind_issue(created))
            .unwrap_or(false)
    }

    pub fn push_comment(&self, thread_id: &str, link: CommentLink) -> bool {
        self.update(thread_id, |record| record.push_comment(link))
            .unwrap_or(false)
    }

    pub fn take_comment(&self, thread_id: &str, message_id: &str) -> Option<CommentLink> {
        self.update(thread_id, |record| record.take_comment(message_id))
            .flatten()
    }

    pub fn take_comment_by_id(&self, thread_id: &str, comment_id: u64) -> Option<CommentLink> {
        self.update(thread_id, |record| record.take_comment_by_id(comment_id))
            .flatten()
    }

    pub fn remove(&self, thread_id: &str) -> Option<ThreadRecord> {
        self.write().remove(thread_id)
    }
}
