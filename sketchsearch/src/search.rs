//! Search orchestration.
//!
//! A search runs authorize → template → validate → resolve indices → execute
//! → normalize → metadata → record. Every step before the record is free of
//! side effects, so a failure anywhere leaves no history node behind.

use crate::backends::{CursorOwner, ExecuteResult, IndexClient, IndexQuery};
use crate::config::SearchConfig;
use crate::history::{SearchHistory, SearchHistoryNode};
use crate::metadata::{self, QueryMetadata};
use crate::model::{IndexRef, SearchRequest, SearchResultEvent, Selection, Sketch};
use crate::normalize::normalize;
use crate::query::build_query;
use crate::registry::SketchRegistry;
use crate::security::{Authorizer, Permission};
use crate::{metrics, Error, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub events: Vec<SearchResultEvent>,
    pub metadata: QueryMetadata,
    pub node: SearchHistoryNode,
}

#[derive(Debug, Clone)]
pub struct ScrollOutcome {
    pub events: Vec<SearchResultEvent>,
    pub metadata: QueryMetadata,
}

#[derive(Clone)]
pub struct SearchOrchestrator {
    client: IndexClient,
    registry: Arc<dyn SketchRegistry>,
    authorizer: Arc<dyn Authorizer>,
    history: SearchHistory,
    config: SearchConfig,
}

impl SearchOrchestrator {
    pub fn new(
        client: IndexClient,
        registry: Arc<dyn SketchRegistry>,
        authorizer: Arc<dyn Authorizer>,
        history: SearchHistory,
        config: SearchConfig,
    ) -> Self {
        Self {
            client,
            registry,
            authorizer,
            history,
            config,
        }
    }

    pub fn history(&self) -> &SearchHistory {
        &self.history
    }

    /// Check `permission` for `user` on `sketch_id` and load the sketch.
    pub async fn authorized_sketch(
        &self,
        user: &str,
        sketch_id: i64,
        permission: Permission,
    ) -> Result<Sketch> {
        if !self.authorizer.authorize(sketch_id, user, permission).await {
            return Err(Error::Permission(format!(
                "user '{}' has no {} access to sketch {}",
                user,
                permission.as_str(),
                sketch_id
            )));
        }
        self.registry
            .sketch(sketch_id)
            .await?
            .ok_or(Error::SketchNotFound(sketch_id))
    }

    /// Run a search and record it in the sketch's history.
    pub async fn search(
        &self,
        user: &str,
        sketch_id: i64,
        request: SearchRequest,
        selection: &Selection,
        parent_id: Option<i64>,
    ) -> Result<SearchOutcome> {
        let start = Instant::now();
        match self
            .run_search(user, sketch_id, request, selection, parent_id)
            .await
        {
            Ok(outcome) => {
                metrics::record_search("search", start.elapsed());
                info!(
                    sketch_id,
                    user,
                    node = outcome.node.id,
                    hits = outcome.events.len(),
                    total = outcome.metadata.total_count,
                    "Search completed in {}ms",
                    outcome.metadata.es_time
                );
                Ok(outcome)
            }
            Err(e) => {
                metrics::record_search_error("search", e.kind());
                if e.is_client_error() {
                    debug!(sketch_id, user, "Search rejected: {}", e);
                } else {
                    warn!(sketch_id, user, "Search failed: {}", e);
                }
                Err(e)
            }
        }
    }

    async fn run_search(
        &self,
        user: &str,
        sketch_id: i64,
        mut request: SearchRequest,
        selection: &Selection,
        parent_id: Option<i64>,
    ) -> Result<SearchOutcome> {
        let sketch = self.authorized_sketch(user, sketch_id, Permission::Read).await?;
        request.sketch_id = sketch_id;

        self.apply_template(&mut request).await?;
        self.validate(&request)?;

        if let Some(parent_id) = parent_id {
            self.history.check_parent(sketch_id, parent_id).await?;
        }

        let filter = request.filter();
        let indices = resolve_indices(&sketch, &request)?;
        let query = build_query(
            request.effective_query_string(),
            request.effective_query_dsl(),
            &filter,
        )?;

        let size = filter
            .size
            .unwrap_or(self.config.default_size)
            .min(self.config.max_size);
        let index_query = IndexQuery {
            indices,
            query,
            size,
            from: filter.from.unwrap_or(0),
            order: filter.order.unwrap_or_default(),
            scroll: filter.scroll,
            histogram: filter.histogram_interval,
            total_hits_cap: self.config.total_hits_cap,
        };
        debug!(
            sketch_id,
            indices = ?index_query.indices,
            query = %index_query.query,
            "Executing search"
        );

        let owner = CursorOwner::new(sketch_id, user);
        let result = self.client.execute(&index_query, &owner).await?;
        let (events, metadata) =
            assemble(&result, &sketch, selection, filter.histogram_interval);

        let node = self
            .history
            .record(&request, result.response.total, result.latency, parent_id)
            .await?;

        Ok(SearchOutcome {
            events,
            metadata,
            node,
        })
    }

    /// Fetch the next page of a scroll cursor. Continuations are not recorded
    /// in the search history.
    pub async fn scroll(
        &self,
        user: &str,
        sketch_id: i64,
        scroll_id: &str,
        selection: &Selection,
    ) -> Result<ScrollOutcome> {
        let start = Instant::now();
        let result = self.run_scroll(user, sketch_id, scroll_id, selection).await;
        match &result {
            Ok(outcome) => {
                metrics::record_search("scroll", start.elapsed());
                debug!(
                    sketch_id,
                    hits = outcome.events.len(),
                    exhausted = outcome.metadata.scroll_id.is_empty(),
                    "Scroll page served"
                );
            }
            Err(e) => metrics::record_search_error("scroll", e.kind()),
        }
        result
    }

    async fn run_scroll(
        &self,
        user: &str,
        sketch_id: i64,
        scroll_id: &str,
        selection: &Selection,
    ) -> Result<ScrollOutcome> {
        let sketch = self.authorized_sketch(user, sketch_id, Permission::Read).await?;
        if scroll_id.trim().is_empty() {
            return Err(Error::InvalidCursor("empty scroll id".to_string()));
        }
        let owner = CursorOwner::new(sketch.id, user);
        let result = self.client.continue_scroll(scroll_id, &owner).await?;
        let (events, metadata) = assemble(&result, &sketch, selection, None);
        Ok(ScrollOutcome { events, metadata })
    }

    /// Fill absent query parts from the referenced search template.
    async fn apply_template(&self, request: &mut SearchRequest) -> Result<()> {
        let Some(template_id) = request.template_id else {
            return Ok(());
        };
        let template = self
            .registry
            .search_template(template_id)
            .await?
            .ok_or_else(|| {
                Error::InvalidRequest(format!("search template {} not found", template_id))
            })?;

        if request.effective_query_string().is_none() {
            request.query_string = template.query_string;
        }
        if request.effective_query_dsl().is_none() {
            request.query_dsl = template.query_dsl;
        }
        if request.query_filter.is_none() {
            request.query_filter = template.query_filter;
        }
        debug!("Applied search template {} ({})", template_id, template.name);
        Ok(())
    }

    fn validate(&self, request: &SearchRequest) -> Result<()> {
        if !request.has_query() {
            return Err(Error::InvalidRequest(
                "a query string, query DSL or search template is required".to_string(),
            ));
        }
        if self.config.require_filter && request.query_filter.is_none() {
            return Err(Error::MissingFilter);
        }
        Ok(())
    }
}

/// Normalize hits and build metadata for one page of results.
fn assemble(
    result: &ExecuteResult,
    sketch: &Sketch,
    selection: &Selection,
    interval: Option<crate::query::DateInterval>,
) -> (Vec<SearchResultEvent>, QueryMetadata) {
    let timeline_ids = sketch.timeline_ids_by_index();
    let events = result
        .response
        .hits
        .iter()
        .map(|hit| normalize(hit, &timeline_ids, selection))
        .collect();
    (events, metadata::build(result, sketch, interval))
}

/// Index names a request targets, restricted to the sketch's indices.
fn resolve_indices(sketch: &Sketch, request: &SearchRequest) -> Result<Vec<String>> {
    let sketch_indices = sketch.indices();
    let filter = request.filter();

    let indices = if filter.selects_all_indices() {
        sketch_indices
    } else {
        let mut out: Vec<String> = Vec::new();
        for index_ref in &filter.indices {
            let names = match index_ref {
                IndexRef::Timeline(id) => sketch
                    .timeline(*id)
                    .map(|t| t.indices.clone())
                    .ok_or_else(|| Error::IndexNotFound(format!("timeline {}", id)))?,
                IndexRef::Name(name) if sketch_indices.contains(name) => vec![name.clone()],
                IndexRef::Name(name) => return Err(Error::IndexNotFound(name.clone())),
            };
            for name in names {
                if !out.contains(&name) {
                    out.push(name);
                }
            }
        }
        out
    };

    if indices.is_empty() {
        return Err(Error::InvalidRequest(format!(
            "sketch {} has no timelines to search",
            sketch.id
        )));
    }
    Ok(indices)
}
