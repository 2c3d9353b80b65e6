//! Metadata envelope returned alongside search results.

use crate::backends::ExecuteResult;
use crate::model::Sketch;
use crate::query::DateInterval;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

/// Every field is always present. Absent values use empty sentinels (`""`,
/// `{}`, `0`) so the wire shape never changes with request flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryMetadata {
    /// Query latency in milliseconds.
    pub es_time: u64,
    #[serde(rename = "es_total_count")]
    pub total_count: u64,
    /// True when the backend reported an exact total; false means
    /// `total_count` is a lower bound. Serialized as `1`/`0`.
    #[serde(
        rename = "es_total_count_complete",
        serialize_with = "bool_as_int",
        deserialize_with = "int_as_bool"
    )]
    pub total_count_complete: bool,
    pub timeline_colors: BTreeMap<String, String>,
    pub timeline_names: BTreeMap<String, String>,
    pub count_per_index: BTreeMap<String, u64>,
    pub count_per_timeline: BTreeMap<i64, u64>,
    pub count_over_time: CountOverTime,
    pub scroll_id: String,
    pub count_per_index_failed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CountOverTime {
    /// Bucket start (epoch ms) -> count.
    pub data: BTreeMap<i64, u64>,
    /// Interval name, `""` when no histogram was requested.
    pub interval: String,
}

fn bool_as_int<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*value))
}

fn int_as_bool<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Int(u64),
        Bool(bool),
    }
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Int(n) => n != 0,
        Flag::Bool(b) => b,
    })
}

/// Build the envelope for an executed query.
pub fn build(
    result: &ExecuteResult,
    sketch: &Sketch,
    interval: Option<DateInterval>,
) -> QueryMetadata {
    let response = &result.response;
    let counts = &result.counts;

    let timeline_ids = sketch.timeline_ids_by_index();
    let mut count_per_timeline = BTreeMap::new();
    for (index, count) in &counts.counts {
        if let Some(timeline_id) = timeline_ids.get(index) {
            *count_per_timeline.entry(*timeline_id).or_insert(0) += count;
        }
    }

    let touched: BTreeSet<&str> = response
        .hits
        .iter()
        .map(|h| h.index.as_str())
        .chain(
            counts
                .counts
                .iter()
                .filter(|(_, n)| **n > 0)
                .map(|(i, _)| i.as_str()),
        )
        .collect();

    let mut timeline_names = BTreeMap::new();
    let mut timeline_colors = BTreeMap::new();
    for index in touched {
        if let Some(timeline) = sketch.timeline_for_index(index) {
            timeline_names.insert(index.to_string(), timeline.name.clone());
            timeline_colors.insert(index.to_string(), timeline.color.clone());
        }
    }

    let count_over_time = match interval {
        Some(interval) => CountOverTime {
            data: response.histogram.clone().unwrap_or_default(),
            interval: interval.as_str().to_string(),
        },
        None => CountOverTime::default(),
    };

    QueryMetadata {
        es_time: result.latency.as_millis() as u64,
        total_count: response.total,
        total_count_complete: response.total_exact,
        timeline_colors,
        timeline_names,
        count_per_index: counts.counts.clone(),
        count_per_timeline,
        count_over_time,
        scroll_id: response.scroll_id.clone().unwrap_or_default(),
        count_per_index_failed: counts.failed.clone(),
    }
}
