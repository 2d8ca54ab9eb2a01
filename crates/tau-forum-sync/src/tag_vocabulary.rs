//! Shared forum tag vocabulary used to translate chat tag ids to tracker label names.
//!
//! Refreshed at startup and whenever the bound channel's metadata changes. Readers tolerate
//! transient staleness; writes replace the whole table.

use std::sync::{PoisonError, RwLock};

use crate::sync_transport::ForumTag;

#[derive(Debug, Default)]
pub struct TagVocabulary {
    tags: RwLock<Vec<ForumTag>>,
}

impl TagVocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, tags: Vec<ForumTag>) {
        *self.tags.write().unwrap_or_else(PoisonError::into_inner) = tags;
    }

    pub fn snapshot(&self) -> Vec<ForumTag> {
        self.tags
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.tags.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tag_id_for_label(&self, label: &str) -> Option<String> {
        self.tags
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|tag| tag.name == label)
            .map(|tag| tag.id.clone())
    }

    /// Translates tag ids to label names. Unknown ids become an empty string.
    pub fn labels_for_tags(&self, tag_ids: &[String]) -> Vec<String> {
        let tags = self.tags.read().unwrap_or_else(PoisonError::into_inner);
        tag_ids
            .iter()
            .map(|id| {
                tags.iter()
                    .find(|tag| &tag.id == id)
                    .map(|tag| tag.name.clone())
                    .unwrap_or_default()
            })
            .collect()
    }

    /// Translates label names to tag ids. Labels without a matching tag are dropped.
    pub fn tags_for_labels<'a>(&self, labels: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let tags = self.tags.read().unwrap_or_else(PoisonError::into_inner);
        labels
            .into_iter()
            .filter_map(|label| {
                tags.iter()
                    .find(|tag| tag.name == label)
                    .map(|tag| tag.id.clone())
            })
            .collect()
    }
}
