use crate::model::SortOrder;
use crate::query::DateInterval;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A compiled query, ready to be sent to a backend.
#[derive(Debug, Clone)]
pub struct IndexQuery {
    pub indices: Vec<String>,
    /// Query clause built by [`crate::query::build_query`].
    pub query: Value,
    pub size: usize,
    pub from: usize,
    pub order: SortOrder,
    /// Ask for a scroll cursor when more hits remain after this page.
    pub scroll: bool,
    /// Compute a count-over-time histogram over all matches.
    pub histogram: Option<DateInterval>,
    /// Stop counting past this many hits. `None` counts exactly.
    pub total_hits_cap: Option<u64>,
}

impl IndexQuery {
    pub fn new(indices: Vec<String>, query: Value) -> Self {
        Self {
            indices,
            query,
            size: 40,
            from: 0,
            order: SortOrder::Asc,
            scroll: false,
            histogram: None,
            total_hits_cap: None,
        }
    }
}

/// A backend hit in Elasticsearch hit shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_type", default)]
    pub doc_type: Option<String>,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default)]
    pub source: Map<String, Value>,
    #[serde(default)]
    pub sort: Vec<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct BackendResponse {
    pub hits: Vec<RawHit>,
    pub total: u64,
    /// False when the backend stopped counting at a cap.
    pub total_exact: bool,
    pub took_ms: u64,
    /// Cursor for the next page; `None` when not requested or exhausted.
    pub scroll_id: Option<String>,
    /// Bucket start (epoch ms) -> count. `None` when no histogram was asked for.
    pub histogram: Option<BTreeMap<i64, u64>>,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Execute a query across `query.indices`.
    ///
    /// Fails with `IndexNotFound` for a missing index and
    /// `BackendUnavailable` on connection problems.
    async fn search(&self, query: &IndexQuery) -> Result<BackendResponse>;

    /// Count matches of `query` in a single index.
    async fn count(&self, index: &str, query: &Value) -> Result<u64>;

    /// Continue a scroll cursor. A consumed or unknown cursor is `InvalidCursor`.
    async fn scroll(&self, scroll_id: &str) -> Result<BackendResponse>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}
