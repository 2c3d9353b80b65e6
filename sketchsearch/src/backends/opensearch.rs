//! OpenSearch / Elasticsearch HTTP backend.

use super::r#trait::{BackendResponse, IndexQuery, RawHit, SearchBackend};
use crate::query::dsl::TIMESTAMP_FIELD;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

const HISTOGRAM_AGG: &str = "count_over_time";
/// Date-typed field used for histogram bucketing.
const DATETIME_FIELD: &str = "datetime";

#[derive(Debug, Clone)]
pub struct OpenSearchConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    /// Keep-alive sent with scroll requests, e.g. `1m`.
    pub scroll_keep_alive: String,
}

pub struct OpenSearchBackend {
    client: reqwest::Client,
    config: OpenSearchConfig,
}

impl OpenSearchBackend {
    pub fn new(config: OpenSearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.config.username {
            Some(user) => builder.basic_auth(user, self.config.password.as_ref()),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder, indices: &[String]) -> Result<Value> {
        let response = builder.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(map_transport_error)?;
        if status.is_success() {
            return Ok(serde_json::from_slice(&bytes)?);
        }

        // Proxies and overloaded nodes answer with HTML or plain text.
        let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            let text = String::from_utf8_lossy(&bytes);
            Value::String(text.chars().take(200).collect())
        });
        Err(classify_error(status, &body, indices))
    }
}

fn map_transport_error(e: reqwest::Error) -> Error {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        Error::BackendUnavailable(e.to_string())
    } else {
        Error::Http(e)
    }
}

/// Map an error response to the error taxonomy.
pub(crate) fn classify_error(status: StatusCode, body: &Value, indices: &[String]) -> Error {
    let error_type = body
        .pointer("/error/type")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let reason = body
        .pointer("/error/reason")
        .and_then(Value::as_str)
        .or_else(|| body.as_str())
        .unwrap_or_default()
        .trim()
        .to_string();

    match (status, error_type) {
        (_, "index_not_found_exception") => {
            let index = body
                .pointer("/error/index")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| indices.first().cloned())
                .unwrap_or_default();
            Error::IndexNotFound(index)
        }
        (_, t) if t.starts_with("search_context") => Error::InvalidCursor(reason),
        (StatusCode::BAD_REQUEST, _) => Error::InvalidRequest(reason),
        (StatusCode::SERVICE_UNAVAILABLE, _)
        | (StatusCode::GATEWAY_TIMEOUT, _)
        | (StatusCode::BAD_GATEWAY, _)
        | (StatusCode::TOO_MANY_REQUESTS, _) => {
            Error::BackendUnavailable(format!("{}: {}", status, reason))
        }
        _ => Error::Backend(format!("{}: {} {}", status, error_type, reason)),
    }
}

#[derive(Deserialize)]
struct SearchBody {
    #[serde(default)]
    took: u64,
    #[serde(rename = "_scroll_id", default)]
    scroll_id: Option<String>,
    hits: HitsBody,
    #[serde(default)]
    aggregations: Option<Value>,
}

#[derive(Deserialize)]
struct HitsBody {
    total: TotalBody,
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TotalBody {
    Legacy(u64),
    Relation { value: u64, relation: String },
}

/// Parse a `_search` or `_search/scroll` response body.
pub(crate) fn parse_search_body(body: Value, want_histogram: bool) -> Result<BackendResponse> {
    let parsed: SearchBody = serde_json::from_value(body)?;
    let (total, total_exact) = match parsed.hits.total {
        TotalBody::Legacy(v) => (v, true),
        TotalBody::Relation { value, relation } => (value, relation == "eq"),
    };

    let histogram = if want_histogram {
        let mut data = BTreeMap::new();
        let buckets = parsed
            .aggregations
            .as_ref()
            .and_then(|a| a.pointer(&format!("/{}/buckets", HISTOGRAM_AGG)))
            .and_then(Value::as_array);
        for bucket in buckets.into_iter().flatten() {
            if let (Some(key), Some(count)) = (
                bucket.get("key").and_then(Value::as_i64),
                bucket.get("doc_count").and_then(Value::as_u64),
            ) {
                data.insert(key, count);
            }
        }
        Some(data)
    } else {
        None
    };

    Ok(BackendResponse {
        hits: parsed.hits.hits,
        total,
        total_exact,
        took_ms: parsed.took,
        scroll_id: parsed.scroll_id,
        histogram,
    })
}

/// Request body for `_search`.
pub(crate) fn search_body(query: &IndexQuery) -> Value {
    let mut body = json!({
        "query": query.query,
        "size": query.size,
        "sort": [{ TIMESTAMP_FIELD: { "order": query.order.as_str() } }],
        "track_total_hits": query.total_hits_cap.map(Value::from).unwrap_or(Value::Bool(true)),
    });
    if !query.scroll {
        body["from"] = json!(query.from);
    }
    if let Some(interval) = query.histogram {
        body["aggs"] = json!({
            HISTOGRAM_AGG: {
                "date_histogram": {
                    "field": DATETIME_FIELD,
                    "calendar_interval": interval.calendar_interval(),
                    "min_doc_count": 1
                }
            }
        });
    }
    body
}

#[async_trait]
impl SearchBackend for OpenSearchBackend {
    async fn search(&self, query: &IndexQuery) -> Result<BackendResponse> {
        let mut path = format!("{}/_search", query.indices.join(","));
        if query.scroll {
            path.push_str(&format!("?scroll={}", self.config.scroll_keep_alive));
        }
        let builder = self
            .request(reqwest::Method::POST, &path)
            .json(&search_body(query));
        let body = self.send(builder, &query.indices).await?;
        let mut response = parse_search_body(body, query.histogram.is_some())?;

        if !query.scroll {
            response.scroll_id = None;
        } else if response.hits.len() < query.size {
            // Everything fit in the first page.
            if let Some(id) = response.scroll_id.take() {
                self.clear_scroll(&id).await;
            }
        }
        Ok(response)
    }

    async fn count(&self, index: &str, query: &Value) -> Result<u64> {
        let builder = self
            .request(reqwest::Method::POST, &format!("{}/_count", index))
            .json(&json!({ "query": query }));
        let body = self.send(builder, &[index.to_string()]).await?;
        body.get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::Backend("count response without 'count'".to_string()))
    }

    async fn scroll(&self, scroll_id: &str) -> Result<BackendResponse> {
        let builder = self.request(reqwest::Method::POST, "_search/scroll").json(&json!({
            "scroll": self.config.scroll_keep_alive,
            "scroll_id": scroll_id,
        }));
        let body = match self.send(builder, &[]).await {
            Err(Error::Backend(msg)) if msg.starts_with("404") => {
                return Err(Error::InvalidCursor(scroll_id.to_string()))
            }
            other => other?,
        };
        let mut response = parse_search_body(body, false)?;
        if response.hits.is_empty() {
            if let Some(id) = response.scroll_id.take() {
                self.clear_scroll(&id).await;
            }
        }
        Ok(response)
    }

    fn name(&self) -> &'static str {
        "opensearch"
    }
}

impl OpenSearchBackend {
    /// Release a server-side cursor so it cannot be reused.
    async fn clear_scroll(&self, scroll_id: &str) {
        let result = self
            .request(reqwest::Method::DELETE, "_search/scroll")
            .json(&json!({ "scroll_id": scroll_id }))
            .send()
            .await;
        if let Err(e) = result {
            tracing::warn!("Failed to clear scroll cursor: {}", e);
        }
    }
}
