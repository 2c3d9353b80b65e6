//! Prometheus-compatible search metrics.

use std::time::Duration;

/// Record a finished search or scroll continuation.
pub fn record_search(kind: &'static str, duration: Duration) {
    metrics::histogram!(
        "sketchsearch_search_duration_seconds",
        "kind" => kind,
    )
    .record(duration.as_secs_f64());
    metrics::counter!(
        "sketchsearch_searches_total",
        "kind" => kind,
        "outcome" => "ok",
    )
    .increment(1);
}

/// Record a failed search with the error kind as outcome.
pub fn record_search_error(kind: &'static str, error_kind: &'static str) {
    metrics::counter!(
        "sketchsearch_searches_total",
        "kind" => kind,
        "outcome" => error_kind,
    )
    .increment(1);
}

/// Record a per-index count that failed or timed out.
pub fn record_count_failure(reason: &'static str) {
    metrics::counter!(
        "sketchsearch_count_fanout_failures_total",
        "reason" => reason,
    )
    .increment(1);
}

/// Record a persisted history node.
pub fn record_history_node(store: &'static str) {
    metrics::counter!(
        "sketchsearch_history_nodes_total",
        "store" => store,
    )
    .increment(1);
}
