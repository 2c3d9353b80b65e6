//! Compiles a search request into an Elasticsearch-style query clause.
//!
//! The query string becomes a `query_string` must clause (or the caller's DSL
//! is used verbatim), and the filter contributes `range`, `term` and `terms`
//! clauses. Both the HTTP backend and the in-memory backend consume the
//! output of [`build_query`].

use crate::model::{ChipKind, ChipOperator, QueryFilter};
use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{json, Map, Value};

/// Field holding the microsecond event timestamp.
pub const TIMESTAMP_FIELD: &str = "timestamp";
/// Field holding event labels.
pub const LABEL_FIELD: &str = "label";

/// Build the query clause for a search.
///
/// `query_dsl` wins over `query_string`. A DSL given as a full request body
/// (`{"query": {...}}`) is unwrapped to its query clause.
pub fn build_query(
    query_string: Option<&str>,
    query_dsl: Option<&Value>,
    filter: &QueryFilter,
) -> Result<Value> {
    let primary = match (query_dsl, query_string) {
        (Some(dsl), _) => dsl.get("query").cloned().unwrap_or_else(|| dsl.clone()),
        (None, Some(q)) => json!({
            "query_string": {
                "query": q,
                "default_operator": "AND"
            }
        }),
        (None, None) => json!({ "match_all": {} }),
    };

    let mut must = vec![primary];
    let mut filters = Vec::new();
    let mut must_not = Vec::new();

    if filter.time_start.is_some() || filter.time_end.is_some() {
        filters.push(timestamp_range(filter.time_start, filter.time_end));
    }

    for chip in filter.active_chips() {
        let clause = match chip.kind {
            ChipKind::Term => {
                if chip.field.is_empty() {
                    return Err(Error::InvalidRequest(format!(
                        "term filter '{}' has no field",
                        chip.value
                    )));
                }
                json!({ "term": { chip.field.clone(): chip.value } })
            }
            ChipKind::Label => json!({ "terms": { LABEL_FIELD: [chip.value] } }),
            ChipKind::DatetimeRange => {
                let (start, end) = parse_datetime_range(&chip.value)?;
                timestamp_range(Some(start), Some(end))
            }
        };
        match chip.operator {
            ChipOperator::Must => filters.push(clause),
            ChipOperator::MustNot => must_not.push(clause),
        }
    }

    if filters.is_empty() && must_not.is_empty() {
        return Ok(must.remove(0));
    }

    let mut bool_query = Map::new();
    bool_query.insert("must".into(), Value::Array(must));
    if !filters.is_empty() {
        bool_query.insert("filter".into(), Value::Array(filters));
    }
    if !must_not.is_empty() {
        bool_query.insert("must_not".into(), Value::Array(must_not));
    }
    Ok(json!({ "bool": bool_query }))
}

fn timestamp_range(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Value {
    let mut params = Map::new();
    if let Some(start) = start {
        params.insert("gte".into(), json!(start.timestamp_micros()));
    }
    if let Some(end) = end {
        params.insert("lte".into(), json!(end.timestamp_micros()));
    }
    json!({ "range": { TIMESTAMP_FIELD: params } })
}

/// Parse a `start,end` datetime range chip value.
pub fn parse_datetime_range(value: &str) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let (start, end) = value.split_once(',').ok_or_else(|| {
        Error::InvalidRequest(format!("datetime range '{}' must be 'start,end'", value))
    })?;
    let start = parse_datetime(start.trim())?;
    let end = parse_datetime(end.trim())?;
    if end < start {
        return Err(Error::InvalidRequest(format!(
            "datetime range '{}' ends before it starts",
            value
        )));
    }
    Ok((start, end))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| Error::InvalidRequest(format!("invalid datetime '{}'", s)))
}
