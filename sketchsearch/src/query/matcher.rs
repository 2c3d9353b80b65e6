//! Evaluates the query clauses produced by [`crate::query::dsl`] against
//! documents. Used by the in-memory backend.
//!
//! A query is compiled once with [`compile`], which rejects unsupported
//! clauses and malformed query strings before any document is looked at,
//! and the resulting [`Clause`] is then matched per document.
//!
//! Supported clauses: `match_all`, `query_string` (see [`super::lucene`]),
//! `term`, `terms`, `range`, `exists` and `bool` (`must`, `filter`,
//! `should`, `must_not`).

use super::lucene::{self, QueryNode};
use crate::{Error, Result};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    MatchAll,
    QueryString(QueryNode),
    Term {
        field: String,
        value: Value,
    },
    Terms {
        field: String,
        values: Vec<Value>,
    },
    Range {
        field: String,
        bounds: Value,
    },
    Exists(String),
    Bool {
        must: Vec<Clause>,
        filter: Vec<Clause>,
        should: Vec<Clause>,
        must_not: Vec<Clause>,
    },
}

pub fn compile(query: &Value) -> Result<Clause> {
    let clause = query
        .as_object()
        .ok_or_else(|| Error::InvalidRequest(format!("query clause must be an object: {}", query)))?;

    if clause.is_empty() {
        return Ok(Clause::MatchAll);
    }
    if clause.len() > 1 {
        return Err(Error::InvalidRequest(format!(
            "query clause must have exactly one key, got {}",
            clause.len()
        )));
    }

    let (kind, body) = clause
        .iter()
        .next()
        .ok_or_else(|| Error::InvalidRequest("empty query clause".to_string()))?;

    match kind.as_str() {
        "match_all" => Ok(Clause::MatchAll),
        "query_string" => {
            let q = body
                .get("query")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::InvalidRequest("query_string needs a query".to_string()))?;
            Ok(Clause::QueryString(lucene::parse(q)?))
        }
        "term" => {
            let (field, expected) = single_field(kind, body)?;
            let value = expected.get("value").unwrap_or(expected).clone();
            Ok(Clause::Term { field, value })
        }
        "terms" => {
            let (field, expected) = single_field(kind, body)?;
            let values = expected
                .as_array()
                .ok_or_else(|| Error::InvalidRequest("terms expects an array".to_string()))?
                .clone();
            Ok(Clause::Terms { field, values })
        }
        "range" => {
            let (field, bounds) = single_field(kind, body)?;
            Ok(Clause::Range {
                field,
                bounds: bounds.clone(),
            })
        }
        "exists" => {
            let field = body
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::InvalidRequest("exists needs a field".to_string()))?;
            Ok(Clause::Exists(field.to_string()))
        }
        "bool" => Ok(Clause::Bool {
            must: compile_all(body.get("must"))?,
            filter: compile_all(body.get("filter"))?,
            should: compile_all(body.get("should"))?,
            must_not: compile_all(body.get("must_not"))?,
        }),
        other => Err(Error::InvalidRequest(format!(
            "unsupported query clause: {}",
            other
        ))),
    }
}

impl Clause {
    pub fn matches(&self, doc: &Map<String, Value>) -> bool {
        match self {
            Clause::MatchAll => true,
            Clause::QueryString(node) => node.matches(doc),
            Clause::Term { field, value } => field_values(doc, field).any(|v| values_equal(v, value)),
            Clause::Terms { field, values } => {
                field_values(doc, field).any(|v| values.iter().any(|e| values_equal(v, e)))
            }
            Clause::Range { field, bounds } => field_values(doc, field).any(|v| in_range(v, bounds)),
            Clause::Exists(field) => doc.get(field).is_some_and(|v| !v.is_null()),
            Clause::Bool {
                must,
                filter,
                should,
                must_not,
            } => {
                if !must.iter().chain(filter).all(|c| c.matches(doc)) {
                    return false;
                }
                if must_not.iter().any(|c| c.matches(doc)) {
                    return false;
                }
                if !should.is_empty() && must.is_empty() && filter.is_empty() {
                    return should.iter().any(|c| c.matches(doc));
                }
                true
            }
        }
    }
}

fn single_field<'a>(kind: &str, body: &'a Value) -> Result<(String, &'a Value)> {
    body.as_object()
        .and_then(|m| m.iter().next())
        .map(|(k, v)| (k.clone(), v))
        .ok_or_else(|| Error::InvalidRequest(format!("{} needs a field", kind)))
}

fn compile_all(value: Option<&Value>) -> Result<Vec<Clause>> {
    match value {
        Some(Value::Array(items)) => items.iter().map(compile).collect(),
        Some(v @ Value::Object(_)) => Ok(vec![compile(v)?]),
        _ => Ok(Vec::new()),
    }
}

/// Values of `field`, flattening arrays.
pub(crate) fn field_values<'a>(
    doc: &'a Map<String, Value>,
    field: &str,
) -> impl Iterator<Item = &'a Value> {
    let items: Vec<&Value> = match doc.get(field) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(v) => vec![v],
    };
    items.into_iter()
}

/// Lowercased text form of a scalar value.
pub(crate) fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.to_lowercase()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Number(x), Value::String(s)) | (Value::String(s), Value::Number(x)) => {
            s.parse::<f64>().ok() == x.as_f64()
        }
        _ => a == b,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn in_range(value: &Value, params: &Value) -> bool {
    let Some(v) = as_f64(value) else {
        return false;
    };
    let bound = |key: &str| params.get(key).and_then(as_f64);
    bound("gte").map_or(true, |b| v >= b)
        && bound("gt").map_or(true, |b| v > b)
        && bound("lte").map_or(true, |b| v <= b)
        && bound("lt").map_or(true, |b| v < b)
}
