//! End-to-end tests of the search pipeline: orchestrator, backends,
//! normalizer, metadata and search history.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sketchsearch::backends::{
    BackendResponse, FanoutConfig, IndexClient, IndexQuery, MemoryIndex, RawHit, SearchBackend,
};
use sketchsearch::config::SearchConfig;
use sketchsearch::history::{MemoryHistoryStore, SearchHistory};
use sketchsearch::model::{
    Chip, IndexRef, QueryFilter, SearchRequest, SearchTemplate, Selection, Sketch, Timeline,
};
use sketchsearch::query::DateInterval;
use sketchsearch::registry::StaticRegistry;
use sketchsearch::security::{AllowAll, Authorizer, Permission};
use sketchsearch::{Error, Result, SearchOrchestrator};
use std::sync::Arc;

// ============================================================================
// Setup
// ============================================================================

/// Returns one canned hit and reports its total as a lower bound.
struct CannedBackend;

fn canned_hit() -> RawHit {
    let source = json!({
        "timestamp": 1410593222543942i64,
        "message": "Test event",
        "label": ["__ts_star"],
        "timestamp_desc": "Content Modification Time",
        "datetime": "2014-09-13T07:27:03+00:00",
        "__ts_timeline_id": 1
    });
    RawHit {
        index: "test".into(),
        id: "test".into(),
        doc_type: Some("plaso_event".into()),
        score: None,
        source: match source {
            Value::Object(map) => map,
            _ => Map::new(),
        },
        sort: vec![json!(1410593223000i64)],
    }
}

#[async_trait]
impl SearchBackend for CannedBackend {
    async fn search(&self, query: &IndexQuery) -> Result<BackendResponse> {
        if let Some(missing) = query.indices.iter().find(|i| i.as_str() != "test") {
            return Err(Error::IndexNotFound(missing.clone()));
        }
        Ok(BackendResponse {
            hits: vec![canned_hit()],
            total: 1,
            total_exact: false,
            took_ms: 5,
            scroll_id: None,
            histogram: None,
        })
    }

    async fn count(&self, _index: &str, _query: &Value) -> Result<u64> {
        Ok(1)
    }

    async fn scroll(&self, scroll_id: &str) -> Result<BackendResponse> {
        Err(Error::InvalidCursor(scroll_id.to_string()))
    }

    fn name(&self) -> &'static str {
        "canned"
    }
}

/// Denies everything.
struct DenyAll;

#[async_trait]
impl Authorizer for DenyAll {
    async fn authorize(&self, _sketch_id: i64, _user: &str, _permission: Permission) -> bool {
        false
    }
}

fn registry() -> StaticRegistry {
    StaticRegistry::new()
        .with_sketch(Sketch {
            id: 1,
            name: "Test 1".into(),
            timelines: vec![Timeline {
                id: 1,
                name: "Timeline 1".into(),
                color: "FFFFFF".into(),
                indices: vec!["test".into()],
            }],
        })
        .with_sketch(Sketch {
            id: 2,
            name: "Test 2".into(),
            timelines: vec![
                Timeline {
                    id: 2,
                    name: "Auth logs".into(),
                    color: "FF0000".into(),
                    indices: vec!["auth".into()],
                },
                Timeline {
                    id: 3,
                    name: "Web logs".into(),
                    color: "0000FF".into(),
                    indices: vec!["web".into()],
                },
            ],
        })
        .with_template(SearchTemplate {
            id: 1,
            name: "failed logins".into(),
            query_string: Some("failed".into()),
            query_dsl: None,
            query_filter: None,
        })
}

fn memory_index() -> MemoryIndex {
    let index = MemoryIndex::new();
    let auth = [
        ("a1", 1_600_000_000_000_000i64, "failed login for root"),
        ("a2", 1_600_000_060_000_000, "accepted login for alice"),
        ("a3", 1_600_003_600_000_000, "failed login for bob"),
    ];
    for (id, ts, msg) in auth {
        index.index_document("auth", id, json!({"timestamp": ts, "message": msg, "user": "x"}));
    }
    let web = [
        ("w1", 1_600_000_030_000_000i64, "GET /login failed"),
        ("w2", 1_600_007_200_000_000, "GET /index.html"),
    ];
    for (id, ts, msg) in web {
        index.index_document("web", id, json!({"timestamp": ts, "message": msg}));
    }
    index
}

fn orchestrator_with(
    backend: Arc<dyn SearchBackend>,
    authorizer: Arc<dyn Authorizer>,
    config: SearchConfig,
) -> (SearchOrchestrator, Arc<MemoryHistoryStore>) {
    let store = Arc::new(MemoryHistoryStore::new());
    let orchestrator = SearchOrchestrator::new(
        IndexClient::new(backend, FanoutConfig::default()),
        Arc::new(registry()),
        authorizer,
        SearchHistory::new(store.clone()),
        config,
    );
    (orchestrator, store)
}

fn canned() -> (SearchOrchestrator, Arc<MemoryHistoryStore>) {
    orchestrator_with(Arc::new(CannedBackend), Arc::new(AllowAll), SearchConfig::default())
}

fn memory() -> (SearchOrchestrator, Arc<MemoryHistoryStore>) {
    orchestrator_with(
        Arc::new(memory_index()),
        Arc::new(AllowAll),
        SearchConfig::default(),
    )
}

fn no_selection() -> Selection {
    Selection::new()
}

// ============================================================================
// Search results and metadata
// ============================================================================

#[tokio::test]
async fn test_single_timeline_search() {
    let (orchestrator, store) = canned();
    let outcome = orchestrator
        .search("dev", 1, SearchRequest::new(1, "test"), &no_selection(), None)
        .await
        .unwrap();

    assert_eq!(outcome.events.len(), 1);
    let event = serde_json::to_value(&outcome.events[0]).unwrap();
    assert_eq!(
        event,
        json!({
            "sort": [1410593223000i64],
            "_type": "plaso_event",
            "_source": {
                "timestamp": 1410593222543942i64,
                "message": "Test event",
                "label": ["__ts_star"],
                "timestamp_desc": "Content Modification Time",
                "datetime": "2014-09-13T07:27:03+00:00",
                "__ts_timeline_id": 1
            },
            "_score": null,
            "selected": false,
            "_index": "test",
            "_id": "test"
        })
    );

    let meta = serde_json::to_value(&outcome.metadata).unwrap();
    assert_eq!(meta["es_total_count"], 1);
    assert_eq!(meta["es_total_count_complete"], 0);
    assert_eq!(meta["timeline_names"], json!({"test": "Timeline 1"}));
    assert_eq!(meta["timeline_colors"], json!({"test": "FFFFFF"}));
    assert_eq!(meta["count_over_time"], json!({"data": {}, "interval": ""}));
    assert_eq!(meta["scroll_id"], "");
    assert_eq!(meta["count_per_index_failed"], json!([]));

    assert_eq!(outcome.node.query_string.as_deref(), Some("test"));
    assert_eq!(outcome.node.query_filter, "{}");
    assert!(outcome.node.query_dsl.is_none());
    assert!(outcome.node.parent.is_none());
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_counts_per_index_and_timeline() {
    let (orchestrator, _) = memory();
    let outcome = orchestrator
        .search("dev", 2, SearchRequest::new(2, "failed"), &no_selection(), None)
        .await
        .unwrap();

    assert_eq!(outcome.events.len(), 3);
    let meta = &outcome.metadata;
    assert_eq!(meta.total_count, 3);
    assert!(meta.total_count_complete);
    assert_eq!(meta.count_per_index.get("auth"), Some(&2));
    assert_eq!(meta.count_per_index.get("web"), Some(&1));
    assert_eq!(meta.count_per_timeline.get(&2), Some(&2));
    assert_eq!(meta.count_per_timeline.get(&3), Some(&1));
    assert_eq!(meta.timeline_names.len(), 2);

    // Ascending by timestamp across indices.
    let ids: Vec<_> = outcome.events.iter().map(|e| e.source_id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "w1", "a3"]);
    assert!(outcome.events.iter().all(|e| e.timeline_id().is_some()));
}

#[tokio::test]
async fn test_timeline_filter_limits_names_to_touched_indices() {
    let (orchestrator, _) = memory();
    let request = SearchRequest::new(2, "login").with_filter(QueryFilter {
        indices: vec![IndexRef::Timeline(2)],
        ..Default::default()
    });
    let outcome = orchestrator
        .search("dev", 2, request, &no_selection(), None)
        .await
        .unwrap();

    assert_eq!(outcome.events.len(), 3);
    assert_eq!(outcome.metadata.timeline_names.len(), 1);
    assert!(outcome.metadata.timeline_names.contains_key("auth"));
    assert!(!outcome.metadata.count_per_index.contains_key("web"));
}

#[tokio::test]
async fn test_chips_and_histogram() {
    let (orchestrator, _) = memory();
    let request = SearchRequest::new(2, "login").with_filter(QueryFilter {
        chips: vec![Chip::term("message", "accepted login for alice").negated()],
        histogram_interval: Some(DateInterval::Hour),
        ..Default::default()
    });
    let outcome = orchestrator
        .search("dev", 2, request, &no_selection(), None)
        .await
        .unwrap();

    let ids: Vec<_> = outcome.events.iter().map(|e| e.source_id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "w1", "a3"]);
    let histogram = &outcome.metadata.count_over_time;
    assert_eq!(histogram.interval, "hour");
    assert_eq!(histogram.data.values().sum::<u64>(), 3);
    assert_eq!(histogram.data.len(), 2);
}

#[tokio::test]
async fn test_selection_marks_events() {
    let (orchestrator, _) = memory();
    let selection = Selection::new().with_id("a3").with_event("web", "w1").with_event("web", "a1");
    let outcome = orchestrator
        .search("dev", 2, SearchRequest::new(2, "failed"), &selection, None)
        .await
        .unwrap();
    assert_eq!(outcome.events.len(), 3);
    for event in &outcome.events {
        // a1 lives in auth, so the web-qualified entry does not select it.
        assert_eq!(event.selected, matches!(event.source_id.as_str(), "a3" | "w1"));
    }
}

#[tokio::test]
async fn test_grouped_query_string() {
    let (orchestrator, store) = memory();
    let outcome = orchestrator
        .search(
            "dev",
            2,
            SearchRequest::new(2, "failed AND (root OR bob)"),
            &no_selection(),
            None,
        )
        .await
        .unwrap();
    let ids: Vec<_> = outcome.events.iter().map(|e| e.source_id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a3"]);

    let outcome = orchestrator
        .search("dev", 2, SearchRequest::new(2, "(accepted OR GET) -index.html"), &no_selection(), None)
        .await
        .unwrap();
    let ids: Vec<_> = outcome.events.iter().map(|e| e.source_id.as_str()).collect();
    assert_eq!(ids, vec!["w1", "a2"]);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_search_template_fills_query() {
    let (orchestrator, store) = memory();
    let request = SearchRequest {
        template_id: Some(1),
        ..Default::default()
    };
    let outcome = orchestrator
        .search("dev", 2, request, &no_selection(), None)
        .await
        .unwrap();
    assert_eq!(outcome.events.len(), 3);
    assert_eq!(outcome.node.query_string.as_deref(), Some("failed"));

    let unknown = SearchRequest {
        template_id: Some(42),
        ..Default::default()
    };
    assert!(matches!(
        orchestrator.search("dev", 2, unknown, &no_selection(), None).await,
        Err(Error::InvalidRequest(_))
    ));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_query_dsl_wins_over_query_string() {
    let (orchestrator, _) = memory();
    let request = SearchRequest {
        sketch_id: 2,
        query_string: Some("failed".into()),
        query_dsl: Some(json!({"query": {"term": {"message": "GET /index.html"}}})),
        ..Default::default()
    };
    let outcome = orchestrator
        .search("dev", 2, request, &no_selection(), None)
        .await
        .unwrap();
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].source_id, "w2");
    assert!(outcome.node.query_dsl.is_some());
    assert_eq!(outcome.node.query_string.as_deref(), Some("failed"));
}

// ============================================================================
// Failures leave no history
// ============================================================================

#[tokio::test]
async fn test_missing_parent_records_nothing() {
    let (orchestrator, store) = canned();
    let result = orchestrator
        .search("dev", 1, SearchRequest::new(1, "test"), &no_selection(), Some(999))
        .await;
    assert!(matches!(result, Err(Error::ParentNotFound(999))));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_cross_sketch_parent_rejected() {
    let (orchestrator, store) = memory();
    let root = orchestrator
        .search("dev", 2, SearchRequest::new(2, "failed"), &no_selection(), None)
        .await
        .unwrap()
        .node;

    let result = orchestrator
        .search("dev", 1, SearchRequest::new(1, "test"), &no_selection(), Some(root.id))
        .await;
    assert!(matches!(result, Err(Error::CrossSketchParent { .. })));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_empty_request_is_invalid() {
    let (orchestrator, store) = canned();
    let request = SearchRequest {
        query_string: Some("   ".into()),
        query_dsl: Some(json!({})),
        ..Default::default()
    };
    assert!(matches!(
        orchestrator.search("dev", 1, request, &no_selection(), None).await,
        Err(Error::InvalidRequest(_))
    ));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_malformed_query_records_nothing() {
    let (orchestrator, store) = memory();
    assert!(matches!(
        orchestrator
            .search("dev", 2, SearchRequest::new(2, "(failed OR root"), &no_selection(), None)
            .await,
        Err(Error::InvalidRequest(_))
    ));

    let unsupported = SearchRequest {
        sketch_id: 2,
        query_dsl: Some(json!({"query": {"fuzzy": {"message": "faild"}}})),
        ..Default::default()
    };
    assert!(matches!(
        orchestrator.search("dev", 2, unsupported, &no_selection(), None).await,
        Err(Error::InvalidRequest(_))
    ));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_required_filter() {
    let config = SearchConfig {
        require_filter: true,
        ..Default::default()
    };
    let (orchestrator, store) =
        orchestrator_with(Arc::new(CannedBackend), Arc::new(AllowAll), config);
    let request = SearchRequest {
        query_string: Some("test".into()),
        ..Default::default()
    };
    assert!(matches!(
        orchestrator.search("dev", 1, request, &no_selection(), None).await,
        Err(Error::MissingFilter)
    ));
    assert!(store.is_empty());

    assert!(orchestrator
        .search("dev", 1, SearchRequest::new(1, "test"), &no_selection(), None)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_unknown_index_named_in_error() {
    let (orchestrator, store) = canned();
    let request = SearchRequest::new(1, "test").with_filter(QueryFilter {
        indices: vec![IndexRef::Name("wrong_index".into())],
        ..Default::default()
    });
    let err = orchestrator
        .search("dev", 1, request, &no_selection(), None)
        .await
        .unwrap_err();
    assert!(matches!(&err, Error::IndexNotFound(name) if name == "wrong_index"));
    assert!(err.to_string().contains("wrong_index"));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_permission_checked_first() {
    let (orchestrator, store) = orchestrator_with(
        Arc::new(CannedBackend),
        Arc::new(DenyAll),
        SearchConfig::default(),
    );
    assert!(matches!(
        orchestrator
            .search("eve", 1, SearchRequest::new(1, "test"), &no_selection(), Some(5))
            .await,
        Err(Error::Permission(_))
    ));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_unknown_sketch() {
    let (orchestrator, _) = canned();
    assert!(matches!(
        orchestrator
            .search("dev", 77, SearchRequest::new(77, "test"), &no_selection(), None)
            .await,
        Err(Error::SketchNotFound(77))
    ));
}

// ============================================================================
// History graph
// ============================================================================

#[tokio::test]
async fn test_identical_searches_create_distinct_nodes() {
    let (orchestrator, store) = canned();
    let first = orchestrator
        .search("dev", 1, SearchRequest::new(1, "test"), &no_selection(), None)
        .await
        .unwrap();
    let second = orchestrator
        .search("dev", 1, SearchRequest::new(1, "test"), &no_selection(), None)
        .await
        .unwrap();
    assert_ne!(first.node.id, second.node.id);
    assert_eq!(first.events, second.events);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_history_forms_forest() {
    let (orchestrator, _) = memory();
    let search = |parent: Option<i64>| {
        let orchestrator = orchestrator.clone();
        async move {
            orchestrator
                .search("dev", 2, SearchRequest::new(2, "login"), &Selection::new(), parent)
                .await
                .unwrap()
                .node
        }
    };

    let root = search(None).await;
    let child = search(Some(root.id)).await;
    let grandchild = search(Some(child.id)).await;
    let sibling = search(Some(root.id)).await;
    let second_root = search(None).await;

    let history = orchestrator.history();
    let ancestors: Vec<_> = history
        .ancestors_of(grandchild.id)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(ancestors, vec![child.id, root.id]);

    let children: Vec<_> = history
        .children_of(root.id)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(children, vec![child.id, sibling.id]);

    let tree = history.tree(2).await.unwrap();
    assert_eq!(tree.len(), 2);
    assert_eq!(tree[1].node.id, second_root.id);
    assert_eq!(tree[0].children[0].children[0].node.id, grandchild.id);
}

#[tokio::test]
async fn test_concurrent_searches_share_parent() {
    let (orchestrator, store) = memory();
    let root = orchestrator
        .search("dev", 2, SearchRequest::new(2, "login"), &no_selection(), None)
        .await
        .unwrap()
        .node;

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .search(
                        "dev",
                        2,
                        SearchRequest::new(2, format!("login {}", i % 2)),
                        &Selection::new(),
                        Some(root.id),
                    )
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(store.len(), 9);
    let children = orchestrator.history().children_of(root.id).await.unwrap();
    assert_eq!(children.len(), 8);
    assert!(children.windows(2).all(|w| w[0].id < w[1].id));
}

// ============================================================================
// Partial failures and scrolling
// ============================================================================

/// Memory index whose per-index count fails for `web`.
struct BrokenWebCounts(MemoryIndex);

#[async_trait]
impl SearchBackend for BrokenWebCounts {
    async fn search(&self, query: &IndexQuery) -> Result<BackendResponse> {
        self.0.search(query).await
    }

    async fn count(&self, index: &str, query: &Value) -> Result<u64> {
        if index == "web" {
            return Err(Error::BackendUnavailable("connection reset".into()));
        }
        self.0.count(index, query).await
    }

    async fn scroll(&self, scroll_id: &str) -> Result<BackendResponse> {
        self.0.scroll(scroll_id).await
    }

    fn name(&self) -> &'static str {
        "broken-web"
    }
}

/// Backend whose primary search is down.
struct Unavailable;

#[async_trait]
impl SearchBackend for Unavailable {
    async fn search(&self, _query: &IndexQuery) -> Result<BackendResponse> {
        Err(Error::BackendUnavailable("503 Service Unavailable".into()))
    }

    async fn count(&self, _index: &str, _query: &Value) -> Result<u64> {
        Ok(0)
    }

    async fn scroll(&self, _scroll_id: &str) -> Result<BackendResponse> {
        Err(Error::BackendUnavailable("503 Service Unavailable".into()))
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}

#[tokio::test]
async fn test_unavailable_backend_records_nothing() {
    let (orchestrator, store) =
        orchestrator_with(Arc::new(Unavailable), Arc::new(AllowAll), SearchConfig::default());
    let err = orchestrator
        .search("dev", 1, SearchRequest::new(1, "test"), &no_selection(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BackendUnavailable(_)));
    assert!(err.is_retryable());
    assert!(!err.is_client_error());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_failed_index_count_is_flagged_not_fatal() {
    let (orchestrator, store) = orchestrator_with(
        Arc::new(BrokenWebCounts(memory_index())),
        Arc::new(AllowAll),
        SearchConfig::default(),
    );
    let outcome = orchestrator
        .search("dev", 2, SearchRequest::new(2, "failed"), &no_selection(), None)
        .await
        .unwrap();

    assert_eq!(outcome.events.len(), 3);
    assert_eq!(outcome.metadata.count_per_index.get("web"), Some(&0));
    assert_eq!(outcome.metadata.count_per_index.get("auth"), Some(&2));
    assert_eq!(outcome.metadata.count_per_index_failed, vec!["web".to_string()]);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_scroll_pages_until_exhausted() {
    let (orchestrator, store) = memory();
    let request = SearchRequest::new(2, "*").with_filter(QueryFilter {
        size: Some(2),
        scroll: true,
        ..Default::default()
    });
    let first = orchestrator
        .search("dev", 2, request, &no_selection(), None)
        .await
        .unwrap();
    assert_eq!(first.events.len(), 2);
    let cursor = first.metadata.scroll_id.clone();
    assert!(!cursor.is_empty());

    let second = orchestrator
        .scroll("dev", 2, &cursor, &no_selection())
        .await
        .unwrap();
    assert_eq!(second.events.len(), 2);
    let cursor2 = second.metadata.scroll_id.clone();
    assert!(!cursor2.is_empty());

    let third = orchestrator
        .scroll("dev", 2, &cursor2, &no_selection())
        .await
        .unwrap();
    assert_eq!(third.events.len(), 1);
    assert_eq!(third.metadata.scroll_id, "");

    let mut seen: Vec<_> = first
        .events
        .iter()
        .chain(&second.events)
        .chain(&third.events)
        .map(|e| e.source_id.clone())
        .collect();
    seen.sort();
    assert_eq!(seen, vec!["a1", "a2", "a3", "w1", "w2"]);

    assert!(matches!(
        orchestrator.scroll("dev", 2, &cursor, &no_selection()).await,
        Err(Error::InvalidCursor(_))
    ));
    // Continuations are not history nodes.
    assert_eq!(store.len(), 1);
}

/// Grants `mallory` sketch 1 only; everyone else reads everything.
struct MalloryOnSketchOne;

#[async_trait]
impl Authorizer for MalloryOnSketchOne {
    async fn authorize(&self, sketch_id: i64, user: &str, _permission: Permission) -> bool {
        user != "mallory" || sketch_id == 1
    }
}

#[tokio::test]
async fn test_scroll_cursor_is_bound_to_its_sketch() {
    let (orchestrator, _) = orchestrator_with(
        Arc::new(memory_index()),
        Arc::new(MalloryOnSketchOne),
        SearchConfig::default(),
    );
    let request = SearchRequest::new(2, "*").with_filter(QueryFilter {
        size: Some(1),
        scroll: true,
        ..Default::default()
    });
    let first = orchestrator
        .search("dev", 2, request, &no_selection(), None)
        .await
        .unwrap();
    let cursor = first.metadata.scroll_id.clone();
    assert!(!cursor.is_empty());

    // Authorized on sketch 1, replaying a sketch 2 cursor.
    assert!(matches!(
        orchestrator.scroll("mallory", 1, &cursor, &no_selection()).await,
        Err(Error::InvalidCursor(_))
    ));
    // Same sketch, different user.
    assert!(matches!(
        orchestrator.scroll("eve", 2, &cursor, &no_selection()).await,
        Err(Error::InvalidCursor(_))
    ));
    // The owner can still continue.
    let next = orchestrator
        .scroll("dev", 2, &cursor, &no_selection())
        .await
        .unwrap();
    assert_eq!(next.events.len(), 1);
    assert!(next.events.iter().all(|e| e.timeline_id().is_some()));
}
