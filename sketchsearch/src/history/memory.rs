//! In-memory history arena.

use super::{check_parent, HistoryStore, NewSearchNode, NodeAnnotation, SearchHistoryNode};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

#[derive(Default)]
struct Arena {
    nodes: HashMap<i64, SearchHistoryNode>,
    /// Parent id -> child ids in insertion order.
    children: HashMap<i64, Vec<i64>>,
    /// Sketch id -> node ids in insertion order.
    by_sketch: HashMap<i64, Vec<i64>>,
    next_id: i64,
}

/// Arena of history nodes behind a single write lock. An insert validates the
/// parent and writes the node under the same lock.
#[derive(Default)]
pub struct MemoryHistoryStore {
    arena: RwLock<Arena>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.arena.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn insert(&self, new: NewSearchNode) -> Result<SearchHistoryNode> {
        let mut arena = self.arena.write();
        if let Some(parent_id) = new.parent {
            check_parent(new.sketch_id, parent_id, arena.nodes.get(&parent_id))?;
        }

        arena.next_id += 1;
        let node = SearchHistoryNode {
            id: arena.next_id,
            sketch_id: new.sketch_id,
            query_string: new.query_string,
            query_dsl: new.query_dsl,
            query_filter: new.query_filter,
            query_result_count: new.query_result_count,
            description: None,
            labels: BTreeSet::new(),
            created_at: new.created_at,
            query_time: new.query_time,
            parent: new.parent,
        };

        if let Some(parent_id) = node.parent {
            arena.children.entry(parent_id).or_default().push(node.id);
        }
        arena.by_sketch.entry(node.sketch_id).or_default().push(node.id);
        arena.nodes.insert(node.id, node.clone());
        Ok(node)
    }

    async fn get(&self, id: i64) -> Result<Option<SearchHistoryNode>> {
        Ok(self.arena.read().nodes.get(&id).cloned())
    }

    async fn children(&self, id: i64) -> Result<Vec<SearchHistoryNode>> {
        let arena = self.arena.read();
        Ok(arena
            .children
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|child| arena.nodes.get(child).cloned())
            .collect())
    }

    async fn list(&self, sketch_id: i64) -> Result<Vec<SearchHistoryNode>> {
        let arena = self.arena.read();
        Ok(arena
            .by_sketch
            .get(&sketch_id)
            .into_iter()
            .flatten()
            .filter_map(|id| arena.nodes.get(id).cloned())
            .collect())
    }

    async fn annotate(&self, id: i64, annotation: NodeAnnotation) -> Result<SearchHistoryNode> {
        let mut arena = self.arena.write();
        let node = arena.nodes.get_mut(&id).ok_or(Error::NodeNotFound(id))?;
        if let Some(labels) = annotation.labels {
            node.labels = labels;
        }
        if let Some(description) = annotation.description {
            node.description = Some(description);
        }
        Ok(node.clone())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
