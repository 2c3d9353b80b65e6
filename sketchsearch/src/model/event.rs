use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Uniform event shape returned to callers, independent of the backend.
///
/// Serializes to the hit-like wire shape
/// `{_index, _id, _type, _score, sort, selected, _source: {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultEvent {
    #[serde(rename = "_index")]
    pub source_index: String,
    #[serde(rename = "_id")]
    pub source_id: String,
    #[serde(rename = "_type")]
    pub source_type: String,
    #[serde(rename = "_score")]
    pub score: Option<f64>,
    #[serde(default)]
    pub sort: Vec<Value>,
    pub selected: bool,
    #[serde(rename = "_source")]
    pub source: EventSource,
}

impl SearchResultEvent {
    pub fn timeline_id(&self) -> Option<i64> {
        self.source.timeline_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSource {
    /// Microseconds since the Unix epoch.
    pub timestamp: i64,
    pub timestamp_desc: String,
    pub message: String,
    pub datetime: String,
    #[serde(default)]
    pub label: Vec<String>,
    #[serde(rename = "__ts_timeline_id")]
    pub timeline_id: Option<i64>,
    /// Remaining source attributes, passed through untouched.
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}
