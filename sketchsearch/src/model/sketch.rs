use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A named collection of timelines under investigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sketch {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub timelines: Vec<Timeline>,
}

/// One ingested event source, backed by one or more search indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
    pub id: i64,
    pub name: String,
    /// Hex color without leading `#`, e.g. `FFFFFF`.
    #[serde(default = "default_color")]
    pub color: String,
    pub indices: Vec<String>,
}

fn default_color() -> String {
    "FFFFFF".to_string()
}

/// A saved query that can seed a search submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchTemplate {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub query_string: Option<String>,
    #[serde(default)]
    pub query_dsl: Option<Value>,
    #[serde(default)]
    pub query_filter: Option<crate::model::QueryFilter>,
}

impl Sketch {
    /// All index names referenced by the sketch, in timeline order, deduplicated.
    pub fn indices(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for timeline in &self.timelines {
            for index in &timeline.indices {
                if !out.contains(index) {
                    out.push(index.clone());
                }
            }
        }
        out
    }

    pub fn timeline(&self, timeline_id: i64) -> Option<&Timeline> {
        self.timelines.iter().find(|t| t.id == timeline_id)
    }

    /// First timeline that references `index`.
    pub fn timeline_for_index(&self, index: &str) -> Option<&Timeline> {
        self.timelines
            .iter()
            .find(|t| t.indices.iter().any(|i| i == index))
    }

    /// Index name -> timeline id for every index in the sketch.
    pub fn timeline_ids_by_index(&self) -> HashMap<String, i64> {
        let mut map = HashMap::new();
        for timeline in &self.timelines {
            for index in &timeline.indices {
                map.entry(index.clone()).or_insert(timeline.id);
            }
        }
        map
    }
}
