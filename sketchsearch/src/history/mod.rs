//! Search history: one node per completed search, forming a forest per sketch.
//!
//! Nodes live in a [`HistoryStore`] keyed by id. A node stores only its parent
//! id; children are looked up through the store's parent index.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryHistoryStore;
pub use sqlite::SqliteHistoryStore;

use crate::model::SearchRequest;
use crate::{metrics, Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHistoryNode {
    pub id: i64,
    pub sketch_id: i64,
    pub query_string: Option<String>,
    pub query_dsl: Option<Value>,
    /// Filter as a JSON string, `{}` when none was given.
    pub query_filter: String,
    pub query_result_count: u64,
    pub description: Option<String>,
    pub labels: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    /// Execution time in milliseconds.
    pub query_time: u64,
    pub parent: Option<i64>,
}

/// A node about to be inserted; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewSearchNode {
    pub sketch_id: i64,
    pub query_string: Option<String>,
    pub query_dsl: Option<Value>,
    pub query_filter: String,
    pub query_result_count: u64,
    pub created_at: DateTime<Utc>,
    pub query_time: u64,
    pub parent: Option<i64>,
}

/// Label and description changes. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeAnnotation {
    #[serde(default)]
    pub labels: Option<BTreeSet<String>>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A node with the ids of its direct children, as returned over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchNodeView {
    #[serde(flatten)]
    pub node: SearchHistoryNode,
    pub children: Vec<i64>,
}

/// A node with its subtree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryTree {
    #[serde(flatten)]
    pub node: SearchHistoryNode,
    pub children: Vec<HistoryTree>,
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Insert a node. The parent, if any, is validated in the same
    /// transaction: it must exist (`ParentNotFound`) and belong to the same
    /// sketch (`CrossSketchParent`). Nothing is written on failure.
    async fn insert(&self, node: NewSearchNode) -> Result<SearchHistoryNode>;

    async fn get(&self, id: i64) -> Result<Option<SearchHistoryNode>>;

    /// Direct children in creation order.
    async fn children(&self, id: i64) -> Result<Vec<SearchHistoryNode>>;

    /// All nodes of a sketch in creation order.
    async fn list(&self, sketch_id: i64) -> Result<Vec<SearchHistoryNode>>;

    /// Fails with `NodeNotFound` for an unknown id.
    async fn annotate(&self, id: i64, annotation: NodeAnnotation) -> Result<SearchHistoryNode>;

    fn name(&self) -> &'static str;
}

/// Validation shared by store implementations.
pub(crate) fn check_parent(
    sketch_id: i64,
    parent_id: i64,
    parent: Option<&SearchHistoryNode>,
) -> Result<()> {
    match parent {
        None => Err(Error::ParentNotFound(parent_id)),
        Some(p) if p.sketch_id != sketch_id => Err(Error::CrossSketchParent {
            parent_id,
            parent_sketch: p.sketch_id,
            sketch_id,
        }),
        Some(_) => Ok(()),
    }
}

/// Search history operations on top of a store.
#[derive(Clone)]
pub struct SearchHistory {
    store: Arc<dyn HistoryStore>,
}

impl SearchHistory {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Record a completed search.
    pub async fn record(
        &self,
        request: &SearchRequest,
        result_count: u64,
        duration: Duration,
        parent_id: Option<i64>,
    ) -> Result<SearchHistoryNode> {
        let node = self
            .store
            .insert(NewSearchNode {
                sketch_id: request.sketch_id,
                query_string: request.query_string.clone(),
                query_dsl: request.effective_query_dsl().cloned(),
                query_filter: request.filter_json()?,
                query_result_count: result_count,
                created_at: Utc::now(),
                query_time: duration.as_millis() as u64,
                parent: parent_id,
            })
            .await?;

        metrics::record_history_node(self.store.name());
        debug!(
            "Recorded search node {} (sketch {}, parent {:?})",
            node.id, node.sketch_id, node.parent
        );
        Ok(node)
    }

    /// Fail early if `parent_id` cannot be used for a node in `sketch_id`.
    /// The store re-checks on insert.
    pub async fn check_parent(&self, sketch_id: i64, parent_id: i64) -> Result<()> {
        let parent = self.store.get(parent_id).await?;
        check_parent(sketch_id, parent_id, parent.as_ref())
    }

    /// A node of `sketch_id`. Nodes of other sketches are reported as missing.
    pub async fn get(&self, sketch_id: i64, id: i64) -> Result<SearchHistoryNode> {
        self.store
            .get(id)
            .await?
            .filter(|n| n.sketch_id == sketch_id)
            .ok_or(Error::NodeNotFound(id))
    }

    pub async fn children_of(&self, id: i64) -> Result<Vec<SearchHistoryNode>> {
        self.store.children(id).await
    }

    /// Ancestors from the direct parent up to the root.
    pub async fn ancestors_of(&self, id: i64) -> Result<Vec<SearchHistoryNode>> {
        let node = self.store.get(id).await?.ok_or(Error::NodeNotFound(id))?;
        let mut visited = HashSet::from([node.id]);
        let mut ancestors = Vec::new();
        let mut next = node.parent;

        while let Some(parent_id) = next {
            if !visited.insert(parent_id) {
                error!("Cycle in search history at node {} (starting from {})", parent_id, id);
                return Err(Error::CycleDetected(parent_id));
            }
            let parent = self
                .store
                .get(parent_id)
                .await?
                .ok_or(Error::NodeNotFound(parent_id))?;
            next = parent.parent;
            ancestors.push(parent);
        }
        Ok(ancestors)
    }

    pub async fn view(&self, node: SearchHistoryNode) -> Result<SearchNodeView> {
        let children = self
            .store
            .children(node.id)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        Ok(SearchNodeView { node, children })
    }

    pub async fn annotate(
        &self,
        sketch_id: i64,
        id: i64,
        annotation: NodeAnnotation,
    ) -> Result<SearchHistoryNode> {
        self.get(sketch_id, id).await?;
        self.store.annotate(id, annotation).await
    }

    /// The sketch's history as a forest, roots and children in creation order.
    pub async fn tree(&self, sketch_id: i64) -> Result<Vec<HistoryTree>> {
        let nodes = self.store.list(sketch_id).await?;
        let ids: HashSet<i64> = nodes.iter().map(|n| n.id).collect();

        let mut by_parent: HashMap<Option<i64>, Vec<SearchHistoryNode>> = HashMap::new();
        for node in nodes {
            let key = node.parent.filter(|p| ids.contains(p));
            by_parent.entry(key).or_default().push(node);
        }

        let roots = by_parent.remove(&None).unwrap_or_default();
        let mut visited = HashSet::new();
        roots
            .into_iter()
            .map(|root| build_subtree(root, &mut by_parent, &mut visited))
            .collect()
    }
}

fn build_subtree(
    node: SearchHistoryNode,
    by_parent: &mut HashMap<Option<i64>, Vec<SearchHistoryNode>>,
    visited: &mut HashSet<i64>,
) -> Result<HistoryTree> {
    if !visited.insert(node.id) {
        return Err(Error::CycleDetected(node.id));
    }
    let children = by_parent
        .remove(&Some(node.id))
        .unwrap_or_default()
        .into_iter()
        .map(|child| build_subtree(child, by_parent, visited))
        .collect::<Result<Vec<_>>>()?;
    Ok(HistoryTree { node, children })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QueryFilter;

    fn history() -> SearchHistory {
        SearchHistory::new(Arc::new(MemoryHistoryStore::new()))
    }

    fn request(sketch_id: i64, q: &str) -> SearchRequest {
        SearchRequest::new(sketch_id, q)
    }

    async fn record(h: &SearchHistory, sketch_id: i64, parent: Option<i64>) -> SearchHistoryNode {
        h.record(&request(sketch_id, "test"), 1, Duration::from_millis(3), parent)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_record_assigns_times_and_filter() {
        let h = history();
        let node = h
            .record(
                &request(1, "test").with_filter(QueryFilter::default()),
                4,
                Duration::from_millis(12),
                None,
            )
            .await
            .unwrap();
        assert_eq!(node.query_filter, "{}");
        assert_eq!(node.query_time, 12);
        assert_eq!(node.query_result_count, 4);
        assert!(node.parent.is_none());
        assert!(node.labels.is_empty());
    }

    #[tokio::test]
    async fn test_ancestors_nearest_first() {
        let h = history();
        let a = record(&h, 1, None).await;
        let b = record(&h, 1, Some(a.id)).await;
        let c = record(&h, 1, Some(b.id)).await;

        let ancestors: Vec<_> = h.ancestors_of(c.id).await.unwrap().iter().map(|n| n.id).collect();
        assert_eq!(ancestors, vec![b.id, a.id]);
        assert!(h.ancestors_of(a.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tree_nests_children_in_creation_order() {
        let h = history();
        let root = record(&h, 1, None).await;
        let first = record(&h, 1, Some(root.id)).await;
        let second = record(&h, 1, Some(root.id)).await;
        let other_root = record(&h, 1, None).await;
        record(&h, 2, None).await;

        let tree = h.tree(1).await.unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].node.id, root.id);
        let kids: Vec<_> = tree[0].children.iter().map(|c| c.node.id).collect();
        assert_eq!(kids, vec![first.id, second.id]);
        assert_eq!(tree[1].node.id, other_root.id);

        let view = h.view(root).await.unwrap();
        assert_eq!(view.children, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn test_get_is_scoped_to_sketch() {
        let h = history();
        let node = record(&h, 1, None).await;
        assert!(h.get(1, node.id).await.is_ok());
        assert!(matches!(h.get(2, node.id).await, Err(Error::NodeNotFound(_))));
    }

    #[tokio::test]
    async fn test_annotate_updates_labels_and_description() {
        let h = history();
        let node = record(&h, 1, None).await;
        let updated = h
            .annotate(
                1,
                node.id,
                NodeAnnotation {
                    labels: Some(BTreeSet::from(["interesting".to_string()])),
                    description: Some("lateral movement".into()),
                },
            )
            .await
            .unwrap();
        assert!(updated.labels.contains("interesting"));
        assert_eq!(updated.description.as_deref(), Some("lateral movement"));
        assert_eq!(updated.query_string, node.query_string);

        let again = h
            .annotate(1, node.id, NodeAnnotation::default())
            .await
            .unwrap();
        assert_eq!(again, updated);
    }

    /// Store whose nodes 1 and 2 point at each other.
    struct CorruptStore;

    #[async_trait]
    impl HistoryStore for CorruptStore {
        async fn insert(&self, _node: NewSearchNode) -> Result<SearchHistoryNode> {
            Err(Error::Backend("read only".into()))
        }

        async fn get(&self, id: i64) -> Result<Option<SearchHistoryNode>> {
            Ok(Some(SearchHistoryNode {
                id,
                sketch_id: 1,
                query_string: None,
                query_dsl: None,
                query_filter: "{}".into(),
                query_result_count: 0,
                description: None,
                labels: BTreeSet::new(),
                created_at: Utc::now(),
                query_time: 0,
                parent: Some(if id == 1 { 2 } else { 1 }),
            }))
        }

        async fn children(&self, _id: i64) -> Result<Vec<SearchHistoryNode>> {
            Ok(vec![])
        }

        async fn list(&self, _sketch_id: i64) -> Result<Vec<SearchHistoryNode>> {
            Ok(vec![])
        }

        async fn annotate(&self, id: i64, _a: NodeAnnotation) -> Result<SearchHistoryNode> {
            Err(Error::NodeNotFound(id))
        }

        fn name(&self) -> &'static str {
            "corrupt"
        }
    }

    #[tokio::test]
    async fn test_ancestor_cycle_is_detected() {
        let h = SearchHistory::new(Arc::new(CorruptStore));
        assert!(matches!(
            h.ancestors_of(1).await,
            Err(Error::CycleDetected(1))
        ));
    }

    #[tokio::test]
    async fn test_check_parent_errors() {
        let h = history();
        let node = record(&h, 1, None).await;
        assert!(h.check_parent(1, node.id).await.is_ok());
        assert!(matches!(
            h.check_parent(2, node.id).await,
            Err(Error::CrossSketchParent { .. })
        ));
        assert!(matches!(
            h.check_parent(1, 999).await,
            Err(Error::ParentNotFound(999))
        ));
    }
}
