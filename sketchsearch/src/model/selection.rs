use serde::Deserialize;
use std::collections::{HashMap, HashSet};

/// One selected event as sent by a caller: a bare `_id`, or an
/// `{"_index", "_id"}` pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EventRef {
    Id(String),
    Event {
        #[serde(rename = "_index")]
        index: String,
        #[serde(rename = "_id")]
        id: String,
    },
}

/// Events a caller marked as selected.
///
/// Document ids are only unique within an index. A bare id selects that id
/// in every index; an index-qualified entry selects exactly one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: HashSet<String>,
    by_index: HashMap<String, HashSet<String>>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.ids.insert(id.into());
        self
    }

    pub fn with_event(mut self, index: impl Into<String>, id: impl Into<String>) -> Self {
        self.by_index.entry(index.into()).or_default().insert(id.into());
        self
    }

    pub fn contains(&self, index: &str, id: &str) -> bool {
        self.ids.contains(id) || self.by_index.get(index).is_some_and(|ids| ids.contains(id))
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.by_index.is_empty()
    }
}

impl FromIterator<EventRef> for Selection {
    fn from_iter<T: IntoIterator<Item = EventRef>>(iter: T) -> Self {
        iter.into_iter().fold(Self::new(), |selection, event| match event {
            EventRef::Id(id) => selection.with_id(id),
            EventRef::Event { index, id } => selection.with_event(index, id),
        })
    }
}
