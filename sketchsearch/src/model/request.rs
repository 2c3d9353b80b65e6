use crate::query::histogram::DateInterval;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A query submitted against a sketch.
///
/// `query_dsl` is primary when present; `query_string` is used otherwise.
/// Both are kept so the history node reflects what the user sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub sketch_id: i64,
    #[serde(default, alias = "query")]
    pub query_string: Option<String>,
    #[serde(default, alias = "dsl")]
    pub query_dsl: Option<Value>,
    #[serde(default, alias = "filter")]
    pub query_filter: Option<QueryFilter>,
    /// Saved search template to fill absent query parts from.
    #[serde(default, alias = "from_searchtemplate_id")]
    pub template_id: Option<i64>,
}

impl SearchRequest {
    pub fn new(sketch_id: i64, query_string: impl Into<String>) -> Self {
        Self {
            sketch_id,
            query_string: Some(query_string.into()),
            query_filter: Some(QueryFilter::default()),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: QueryFilter) -> Self {
        self.query_filter = Some(filter);
        self
    }

    /// Non-blank query string, if any.
    pub fn effective_query_string(&self) -> Option<&str> {
        self.query_string
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }

    /// DSL that is neither null nor an empty object.
    pub fn effective_query_dsl(&self) -> Option<&Value> {
        self.query_dsl.as_ref().filter(|dsl| match dsl {
            Value::Null => false,
            Value::Object(map) => !map.is_empty(),
            _ => true,
        })
    }

    pub fn has_query(&self) -> bool {
        self.effective_query_string().is_some() || self.effective_query_dsl().is_some()
    }

    pub fn filter(&self) -> QueryFilter {
        self.query_filter.clone().unwrap_or_default()
    }

    /// Filter serialized the way history nodes store it (`{}` when absent).
    pub fn filter_json(&self) -> crate::Result<String> {
        match &self.query_filter {
            Some(filter) => Ok(serde_json::to_string(filter)?),
            None => Ok("{}".to_string()),
        }
    }
}

/// Structured filter narrowing a search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    /// Index names or timeline ids. Empty, or containing `_all`, selects every
    /// index of the sketch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indices: Vec<IndexRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chips: Vec<Chip>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<SortOrder>,
    /// Ask the backend for a scroll cursor.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub scroll: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub histogram_interval: Option<DateInterval>,
}

impl QueryFilter {
    pub fn selects_all_indices(&self) -> bool {
        self.indices.is_empty()
            || self
                .indices
                .iter()
                .any(|i| matches!(i, IndexRef::Name(name) if name == "_all"))
    }

    pub fn active_chips(&self) -> impl Iterator<Item = &Chip> {
        self.chips.iter().filter(|c| c.active)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexRef {
    Timeline(i64),
    Name(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// A single filter constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chip {
    #[serde(default)]
    pub field: String,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: ChipKind,
    #[serde(default)]
    pub operator: ChipOperator,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Chip {
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            kind: ChipKind::Term,
            operator: ChipOperator::Must,
            active: true,
        }
    }

    pub fn label(value: impl Into<String>) -> Self {
        Self {
            field: String::new(),
            value: value.into(),
            kind: ChipKind::Label,
            operator: ChipOperator::Must,
            active: true,
        }
    }

    pub fn negated(mut self) -> Self {
        self.operator = ChipOperator::MustNot;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChipKind {
    Term,
    Label,
    /// Value is `start,end`, both RFC 3339 or `YYYY-MM-DDTHH:MM:SS` (UTC).
    DatetimeRange,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChipOperator {
    #[default]
    Must,
    MustNot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_filter_serializes_as_empty_object() {
        let filter: QueryFilter = serde_json::from_value(json!({})).unwrap();
        assert_eq!(serde_json::to_string(&filter).unwrap(), "{}");
    }

    #[test]
    fn test_wire_aliases() {
        let req: SearchRequest =
            serde_json::from_value(json!({"query": "test", "filter": {}, "dsl": {}})).unwrap();
        assert_eq!(req.effective_query_string(), Some("test"));
        assert!(req.effective_query_dsl().is_none());
        assert_eq!(req.filter_json().unwrap(), "{}");
    }

    #[test]
    fn test_blank_query_is_no_query() {
        let req = SearchRequest::new(1, "   ");
        assert!(!req.has_query());
    }

    #[test]
    fn test_missing_filter_stored_as_empty_object() {
        let req = SearchRequest {
            query_string: Some("x".into()),
            ..Default::default()
        };
        assert_eq!(req.filter_json().unwrap(), "{}");
    }

    #[test]
    fn test_index_refs_accept_names_and_timeline_ids() {
        let filter: QueryFilter =
            serde_json::from_value(json!({"indices": ["_all", 3, "test"]})).unwrap();
        assert_eq!(
            filter.indices,
            vec![
                IndexRef::Name("_all".into()),
                IndexRef::Timeline(3),
                IndexRef::Name("test".into())
            ]
        );
        assert!(filter.selects_all_indices());
    }

    #[test]
    fn test_chip_defaults() {
        let chip: Chip =
            serde_json::from_value(json!({"field": "tag", "value": "x", "type": "term"})).unwrap();
        assert_eq!(chip.operator, ChipOperator::Must);
        assert!(chip.active);
    }
}
