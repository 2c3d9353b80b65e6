//! Conversion of backend hits into [`SearchResultEvent`]s.

use crate::backends::RawHit;
use crate::model::{EventSource, SearchResultEvent, Selection};
use crate::query::dsl::{LABEL_FIELD, TIMESTAMP_FIELD};
use chrono::{DateTime, SecondsFormat};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

const TIMESTAMP_DESC_FIELD: &str = "timestamp_desc";
const MESSAGE_FIELD: &str = "message";
const DATETIME_FIELD: &str = "datetime";
const TIMELINE_ID_FIELD: &str = "__ts_timeline_id";

/// Normalize one hit.
///
/// Display strings missing from the source become `""`. `datetime` is
/// derived from the microsecond timestamp when the source lacks it. The
/// timeline id comes from the sketch mapping of the hit's index, falling back
/// to one stored in the document.
pub fn normalize(
    hit: &RawHit,
    timeline_id_for_index: &HashMap<String, i64>,
    selection: &Selection,
) -> SearchResultEvent {
    let source = &hit.source;
    let timestamp = timestamp_micros(source.get(TIMESTAMP_FIELD));

    let datetime = match display_string(source.get(DATETIME_FIELD)) {
        s if !s.is_empty() => s,
        _ => datetime_from_micros(timestamp),
    };

    let timeline_id = timeline_id_for_index
        .get(&hit.index)
        .copied()
        .or_else(|| source.get(TIMELINE_ID_FIELD).and_then(Value::as_i64));

    let attributes: BTreeMap<String, Value> = source
        .iter()
        .filter(|(k, _)| !is_reserved(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    SearchResultEvent {
        source_index: hit.index.clone(),
        source_id: hit.id.clone(),
        source_type: hit.doc_type.clone().unwrap_or_default(),
        score: hit.score,
        sort: hit.sort.clone(),
        selected: selection.contains(&hit.index, &hit.id),
        source: EventSource {
            timestamp,
            timestamp_desc: display_string(source.get(TIMESTAMP_DESC_FIELD)),
            message: display_string(source.get(MESSAGE_FIELD)),
            datetime,
            label: labels(source),
            timeline_id,
            attributes,
        },
    }
}

fn is_reserved(key: &str) -> bool {
    matches!(
        key,
        TIMESTAMP_FIELD
            | TIMESTAMP_DESC_FIELD
            | MESSAGE_FIELD
            | DATETIME_FIELD
            | LABEL_FIELD
            | TIMELINE_ID_FIELD
    )
}

fn display_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn timestamp_micros(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or_default(),
        Some(Value::String(s)) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    }
}

fn datetime_from_micros(timestamp: i64) -> String {
    DateTime::from_timestamp_micros(timestamp)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, false))
        .unwrap_or_default()
}

fn labels(source: &Map<String, Value>) -> Vec<String> {
    match source.get(LABEL_FIELD) {
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
