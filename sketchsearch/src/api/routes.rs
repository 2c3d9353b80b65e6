use super::server::AppState;
use crate::history::{HistoryTree, NodeAnnotation, SearchHistoryNode, SearchNodeView};
use crate::metadata::QueryMetadata;
use crate::model::{EventRef, SearchRequest, SearchResultEvent, Selection};
use crate::security::Permission;
use crate::{Error, Result};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/v1/sketches/:sketch_id/explore/`.
#[derive(Debug, Default, Deserialize)]
pub struct ExploreForm {
    #[serde(flatten)]
    pub request: SearchRequest,
    /// Parent search history node.
    #[serde(default)]
    pub parent: Option<i64>,
    /// Events to mark as selected in the result, as bare ids or
    /// `{"_index", "_id"}` pairs.
    #[serde(default)]
    pub selection: Vec<EventRef>,
    /// Continue this cursor instead of running a new search.
    #[serde(default)]
    pub scroll_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExploreMeta {
    #[serde(flatten)]
    pub metadata: QueryMetadata,
    /// `null` for scroll continuations.
    pub search_node: Option<SearchNodeView>,
}

#[derive(Debug, Serialize)]
pub struct ExploreResponse {
    pub objects: Vec<SearchResultEvent>,
    pub meta: ExploreMeta,
}

#[derive(Debug, Serialize)]
pub struct HistoryListResponse {
    pub objects: Vec<HistoryTree>,
}

#[derive(Debug, Serialize)]
pub struct NodeMeta {
    /// From the direct parent up to the root.
    pub ancestors: Vec<SearchHistoryNode>,
}

#[derive(Debug, Serialize)]
pub struct NodeResponse {
    pub objects: Vec<SearchNodeView>,
    pub meta: NodeMeta,
}

fn current_user(state: &AppState, headers: &HeaderMap) -> Result<String> {
    headers
        .get(state.user_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::Unauthenticated(format!("missing '{}' header", state.user_header))
        })
}

pub async fn explore(
    Path(sketch_id): Path<i64>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<ExploreForm>,
) -> Result<Json<ExploreResponse>> {
    let user = current_user(&state, &headers)?;
    let selection: Selection = form.selection.into_iter().collect();

    if let Some(scroll_id) = form.scroll_id.filter(|s| !s.is_empty()) {
        let outcome = state
            .orchestrator
            .scroll(&user, sketch_id, &scroll_id, &selection)
            .await?;
        return Ok(Json(ExploreResponse {
            objects: outcome.events,
            meta: ExploreMeta {
                metadata: outcome.metadata,
                search_node: None,
            },
        }));
    }

    let outcome = state
        .orchestrator
        .search(&user, sketch_id, form.request, &selection, form.parent)
        .await?;
    // A fresh node has no children yet.
    let node = SearchNodeView {
        node: outcome.node,
        children: Vec::new(),
    };

    Ok(Json(ExploreResponse {
        objects: outcome.events,
        meta: ExploreMeta {
            metadata: outcome.metadata,
            search_node: Some(node),
        },
    }))
}

pub async fn list_history(
    Path(sketch_id): Path<i64>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<HistoryListResponse>> {
    let user = current_user(&state, &headers)?;
    state
        .orchestrator
        .authorized_sketch(&user, sketch_id, Permission::Read)
        .await?;
    let objects = state.orchestrator.history().tree(sketch_id).await?;
    Ok(Json(HistoryListResponse { objects }))
}

pub async fn get_history_node(
    Path((sketch_id, node_id)): Path<(i64, i64)>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<NodeResponse>> {
    let user = current_user(&state, &headers)?;
    state
        .orchestrator
        .authorized_sketch(&user, sketch_id, Permission::Read)
        .await?;

    let history = state.orchestrator.history();
    let node = history.get(sketch_id, node_id).await?;
    let ancestors = history.ancestors_of(node.id).await?;
    let view = history.view(node).await?;
    Ok(Json(NodeResponse {
        objects: vec![view],
        meta: NodeMeta { ancestors },
    }))
}

pub async fn annotate_history_node(
    Path((sketch_id, node_id)): Path<(i64, i64)>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(annotation): Json<NodeAnnotation>,
) -> Result<Json<NodeResponse>> {
    let user = current_user(&state, &headers)?;
    state
        .orchestrator
        .authorized_sketch(&user, sketch_id, Permission::Write)
        .await?;

    let history = state.orchestrator.history();
    let node = history.annotate(sketch_id, node_id, annotation).await?;
    let ancestors = history.ancestors_of(node.id).await?;
    let view = history.view(node).await?;
    Ok(Json(NodeResponse {
        objects: vec![view],
        meta: NodeMeta { ancestors },
    }))
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}
