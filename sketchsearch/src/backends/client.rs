//! Index client: primary query execution plus per-index count fan-out.
//!
//! The primary query and the per-index counts run concurrently. A failure of
//! the primary query aborts the request; a failed or timed-out count only
//! marks that index as failed and reports it with a zero count.
//!
//! Every scroll cursor handed out is bound to the sketch and user that opened
//! it; a continuation from anyone else is rejected as an invalid cursor.

use super::r#trait::{BackendResponse, IndexQuery, SearchBackend};
use crate::{metrics, Error, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct FanoutConfig {
    /// Maximum concurrent per-index count requests.
    pub max_concurrent: usize,
    /// Deadline for each per-index count.
    pub timeout: Duration,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Per-index match counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexCounts {
    pub counts: BTreeMap<String, u64>,
    /// Indices whose count failed; they appear in `counts` with 0.
    pub failed: Vec<String>,
}

impl IndexCounts {
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

#[derive(Debug, Clone)]
pub struct ExecuteResult {
    pub response: BackendResponse,
    pub latency: Duration,
    pub counts: IndexCounts,
}

/// Who a scroll cursor belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorOwner {
    pub sketch_id: i64,
    pub user: String,
}

impl CursorOwner {
    pub fn new(sketch_id: i64, user: impl Into<String>) -> Self {
        Self {
            sketch_id,
            user: user.into(),
        }
    }
}

struct CursorLease {
    owner: CursorOwner,
    expires_at: Instant,
}

#[derive(Clone)]
pub struct IndexClient {
    backend: Arc<dyn SearchBackend>,
    fanout: FanoutConfig,
    semaphore: Arc<Semaphore>,
    cursors: Arc<Mutex<HashMap<String, CursorLease>>>,
    cursor_ttl: Duration,
}

impl IndexClient {
    pub fn new(backend: Arc<dyn SearchBackend>, fanout: FanoutConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(fanout.max_concurrent.max(1)));
        Self {
            backend,
            fanout,
            semaphore,
            cursors: Arc::new(Mutex::new(HashMap::new())),
            cursor_ttl: Duration::from_secs(60),
        }
    }

    /// How long a cursor stays bound to its owner without being continued.
    /// Should match the backend's scroll keep-alive.
    pub fn with_cursor_ttl(mut self, ttl: Duration) -> Self {
        self.cursor_ttl = ttl;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Run the query and gather per-index counts. A scroll cursor in the
    /// response is bound to `owner`.
    pub async fn execute(&self, query: &IndexQuery, owner: &CursorOwner) -> Result<ExecuteResult> {
        let start = Instant::now();

        let (response, counts) = futures::future::join(
            self.backend.search(query),
            self.count_per_index(&query.indices, &query.query),
        )
        .await;
        let response = response?;
        if let Some(scroll_id) = &response.scroll_id {
            self.bind_cursor(scroll_id, owner);
        }

        let latency = start.elapsed();
        debug!(
            backend = self.backend.name(),
            indices = query.indices.len(),
            hits = response.hits.len(),
            total = response.total,
            "Executed query in {:?}",
            latency
        );

        Ok(ExecuteResult {
            response,
            latency,
            counts,
        })
    }

    /// Resume a scroll cursor owned by `owner`. No counts are gathered for
    /// continuations.
    pub async fn continue_scroll(
        &self,
        scroll_id: &str,
        owner: &CursorOwner,
    ) -> Result<ExecuteResult> {
        let start = Instant::now();
        self.check_cursor(scroll_id, owner)?;

        let response = self.backend.scroll(scroll_id).await;
        self.cursors.lock().remove(scroll_id);
        let response = response?;
        if let Some(next) = &response.scroll_id {
            self.bind_cursor(next, owner);
        }

        Ok(ExecuteResult {
            response,
            latency: start.elapsed(),
            counts: IndexCounts::default(),
        })
    }

    pub fn open_cursors(&self) -> usize {
        self.cursors.lock().len()
    }

    fn bind_cursor(&self, scroll_id: &str, owner: &CursorOwner) {
        let now = Instant::now();
        let mut cursors = self.cursors.lock();
        cursors.retain(|_, lease| lease.expires_at > now);
        cursors.insert(
            scroll_id.to_string(),
            CursorLease {
                owner: owner.clone(),
                expires_at: now + self.cursor_ttl,
            },
        );
    }

    /// Unknown, expired and foreign cursors are all reported the same way.
    fn check_cursor(&self, scroll_id: &str, owner: &CursorOwner) -> Result<()> {
        let cursors = self.cursors.lock();
        match cursors.get(scroll_id) {
            Some(lease) if lease.owner == *owner && lease.expires_at > Instant::now() => Ok(()),
            Some(lease) if lease.owner != *owner => {
                warn!(
                    sketch_id = owner.sketch_id,
                    user = %owner.user,
                    owner_sketch = lease.owner.sketch_id,
                    "Rejected scroll cursor opened by another sketch or user"
                );
                Err(Error::InvalidCursor(scroll_id.to_string()))
            }
            _ => Err(Error::InvalidCursor(scroll_id.to_string())),
        }
    }

    async fn count_per_index(&self, indices: &[String], query: &Value) -> IndexCounts {
        let futures: Vec<_> = indices
            .iter()
            .map(|index| {
                let semaphore = Arc::clone(&self.semaphore);
                let backend = Arc::clone(&self.backend);
                let timeout = self.fanout.timeout;
                async move {
                    let _permit = semaphore.acquire().await.ok();
                    let result = tokio::time::timeout(timeout, backend.count(index, query)).await;
                    (index.clone(), result)
                }
            })
            .collect();

        let mut counts = IndexCounts::default();
        for (index, result) in futures::future::join_all(futures).await {
            match result {
                Ok(Ok(n)) => {
                    counts.counts.insert(index, n);
                }
                Ok(Err(e)) => {
                    warn!("Count failed for index '{}': {}", index, e);
                    metrics::record_count_failure("error");
                    counts.counts.insert(index.clone(), 0);
                    counts.failed.push(index);
                }
                Err(_) => {
                    warn!(
                        "Count timed out for index '{}' after {}ms",
                        index,
                        self.fanout.timeout.as_millis()
                    );
                    metrics::record_count_failure("timeout");
                    counts.counts.insert(index.clone(), 0);
                    counts.failed.push(index);
                }
            }
        }
        counts
    }
}
