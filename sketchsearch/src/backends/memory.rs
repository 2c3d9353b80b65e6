//! In-process document index.
//!
//! Holds documents per index in memory and evaluates queries with
//! [`crate::query::matcher`]. Scroll cursors snapshot the remaining hits, so a
//! continuation never re-runs the query.

use super::r#trait::{BackendResponse, IndexQuery, RawHit, SearchBackend};
use crate::model::SortOrder;
use crate::query::{aggregate_date_histogram, dsl::TIMESTAMP_FIELD, matcher};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Deserialize)]
pub struct StoredDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_type", default)]
    pub doc_type: Option<String>,
    #[serde(rename = "_source", default)]
    pub source: Map<String, Value>,
}

struct Cursor {
    remaining: Vec<RawHit>,
    page_size: usize,
    total: u64,
    total_exact: bool,
    expires_at: Instant,
}

pub struct MemoryIndex {
    indices: RwLock<HashMap<String, Vec<StoredDocument>>>,
    cursors: Mutex<HashMap<String, Cursor>>,
    scroll_keep_alive: Duration,
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::with_keep_alive(Duration::from_secs(60))
    }

    pub fn with_keep_alive(scroll_keep_alive: Duration) -> Self {
        Self {
            indices: RwLock::new(HashMap::new()),
            cursors: Mutex::new(HashMap::new()),
            scroll_keep_alive,
        }
    }

    /// Load documents from a JSON file shaped `{"index": [{"_id", "_type", "_source"}]}`.
    pub fn from_fixtures(path: &Path) -> Result<Self> {
        let index = Self::new();
        index.load_fixtures(path)?;
        Ok(index)
    }

    /// Add the documents of a fixture file. Returns the number of documents.
    pub fn load_fixtures(&self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)?;
        let fixtures: HashMap<String, Vec<StoredDocument>> = serde_json::from_str(&content)?;
        let mut loaded = 0;
        for (name, docs) in fixtures {
            loaded += docs.len();
            self.insert(&name, docs);
        }
        tracing::info!("Loaded {} fixture documents from {:?}", loaded, path);
        Ok(loaded)
    }

    pub fn insert(&self, index: &str, docs: Vec<StoredDocument>) {
        let mut indices = self.indices.write();
        let entry = indices.entry(index.to_string()).or_default();
        for doc in docs {
            entry.retain(|d| d.id != doc.id);
            entry.push(doc);
        }
    }

    /// Index a single document built from its source map.
    pub fn index_document(&self, index: &str, id: &str, source: Value) {
        let source = match source {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.insert(
            index,
            vec![StoredDocument {
                id: id.to_string(),
                doc_type: None,
                source,
            }],
        );
    }

    pub fn open_cursors(&self) -> usize {
        self.cursors.lock().len()
    }

    fn matching_hits(&self, indices: &[String], query: &Value) -> Result<Vec<RawHit>> {
        let clause = matcher::compile(query)?;
        let store = self.indices.read();
        let mut hits = Vec::new();
        for index in indices {
            let docs = store
                .get(index)
                .ok_or_else(|| Error::IndexNotFound(index.clone()))?;
            for doc in docs {
                if clause.matches(&doc.source) {
                    hits.push(RawHit {
                        index: index.clone(),
                        id: doc.id.clone(),
                        doc_type: doc.doc_type.clone(),
                        score: None,
                        source: doc.source.clone(),
                        sort: vec![Value::from(timestamp_of(&doc.source))],
                    });
                }
            }
        }
        Ok(hits)
    }

    fn open_cursor(&self, cursor: Cursor) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let mut cursors = self.cursors.lock();
        let now = Instant::now();
        cursors.retain(|_, c| c.expires_at > now);
        cursors.insert(id.clone(), cursor);
        id
    }
}

fn timestamp_of(source: &Map<String, Value>) -> i64 {
    match source.get(TIMESTAMP_FIELD) {
        Some(Value::Number(n)) => n.as_i64().unwrap_or_default(),
        Some(Value::String(s)) => s.parse().unwrap_or_default(),
        _ => 0,
    }
}

#[async_trait]
impl SearchBackend for MemoryIndex {
    async fn search(&self, query: &IndexQuery) -> Result<BackendResponse> {
        let start = Instant::now();
        let mut hits = self.matching_hits(&query.indices, &query.query)?;

        hits.sort_by(|a, b| {
            let ord = timestamp_of(&a.source)
                .cmp(&timestamp_of(&b.source))
                .then_with(|| a.index.cmp(&b.index))
                .then_with(|| a.id.cmp(&b.id));
            match query.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let matched = hits.len() as u64;
        let (total, total_exact) = match query.total_hits_cap {
            Some(cap) if matched > cap => (cap, false),
            _ => (matched, true),
        };

        let histogram = query
            .histogram
            .map(|interval| aggregate_date_histogram(hits.iter().map(|h| timestamp_of(&h.source)), interval));

        let mut remaining: Vec<RawHit> = hits.into_iter().skip(query.from).collect();
        let rest = remaining.split_off(query.size.min(remaining.len()));
        let page = remaining;

        let scroll_id = if query.scroll && !rest.is_empty() {
            Some(self.open_cursor(Cursor {
                remaining: rest,
                page_size: query.size.max(1),
                total,
                total_exact,
                expires_at: Instant::now() + self.scroll_keep_alive,
            }))
        } else {
            None
        };

        Ok(BackendResponse {
            hits: page,
            total,
            total_exact,
            took_ms: start.elapsed().as_millis() as u64,
            scroll_id,
            histogram,
        })
    }

    async fn count(&self, index: &str, query: &Value) -> Result<u64> {
        let hits = self.matching_hits(std::slice::from_ref(&index.to_string()), query)?;
        Ok(hits.len() as u64)
    }

    async fn scroll(&self, scroll_id: &str) -> Result<BackendResponse> {
        let start = Instant::now();
        let cursor = self
            .cursors
            .lock()
            .remove(scroll_id)
            .filter(|c| c.expires_at > Instant::now())
            .ok_or_else(|| Error::InvalidCursor(scroll_id.to_string()))?;

        let mut page = cursor.remaining;
        let rest = page.split_off(cursor.page_size.min(page.len()));

        let scroll_id = if rest.is_empty() {
            None
        } else {
            Some(self.open_cursor(Cursor {
                remaining: rest,
                page_size: cursor.page_size,
                total: cursor.total,
                total_exact: cursor.total_exact,
                expires_at: Instant::now() + self.scroll_keep_alive,
            }))
        };

        Ok(BackendResponse {
            hits: page,
            total: cursor.total,
            total_exact: cursor.total_exact,
            took_ms: start.elapsed().as_millis() as u64,
            scroll_id,
            histogram: None,
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
