use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Interval for the count-over-time histogram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateInterval {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl DateInterval {
    pub fn parse_interval(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "minute" => Some(DateInterval::Minute),
            "hour" => Some(DateInterval::Hour),
            "day" => Some(DateInterval::Day),
            "week" => Some(DateInterval::Week),
            "month" => Some(DateInterval::Month),
            "year" => Some(DateInterval::Year),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DateInterval::Minute => "minute",
            DateInterval::Hour => "hour",
            DateInterval::Day => "day",
            DateInterval::Week => "week",
            DateInterval::Month => "month",
            DateInterval::Year => "year",
        }
    }

    /// Calendar interval understood by the `date_histogram` aggregation.
    pub fn calendar_interval(&self) -> &'static str {
        match self {
            DateInterval::Minute => "1m",
            DateInterval::Hour => "1h",
            DateInterval::Day => "1d",
            DateInterval::Week => "1w",
            DateInterval::Month => "1M",
            DateInterval::Year => "1y",
        }
    }

    /// Round timestamp down to interval boundary. Weeks start on Monday.
    pub fn floor(&self, dt: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let date = dt.date_naive();
        let start = match self {
            DateInterval::Minute => date.and_hms_opt(dt.hour(), dt.minute(), 0)?,
            DateInterval::Hour => date.and_hms_opt(dt.hour(), 0, 0)?,
            DateInterval::Day => date.and_hms_opt(0, 0, 0)?,
            DateInterval::Week => {
                let days_from_monday = dt.weekday().num_days_from_monday();
                (date - Duration::days(days_from_monday as i64)).and_hms_opt(0, 0, 0)?
            }
            DateInterval::Month => {
                NaiveDate::from_ymd_opt(dt.year(), dt.month(), 1)?.and_hms_opt(0, 0, 0)?
            }
            DateInterval::Year => NaiveDate::from_ymd_opt(dt.year(), 1, 1)?.and_hms_opt(0, 0, 0)?,
        };
        Some(start.and_utc())
    }
}

/// Bucket start (epoch milliseconds) for a microsecond event timestamp.
pub fn bucket_key_ms(timestamp_us: i64, interval: DateInterval) -> Option<i64> {
    let dt = DateTime::<Utc>::from_timestamp_micros(timestamp_us)?;
    Some(interval.floor(dt)?.timestamp_millis())
}

/// Aggregate microsecond timestamps into histogram buckets keyed by bucket
/// start in epoch milliseconds. Keys are in chronological order.
pub fn aggregate_date_histogram(
    timestamps_us: impl IntoIterator<Item = i64>,
    interval: DateInterval,
) -> BTreeMap<i64, u64> {
    let mut counts = BTreeMap::new();

    for ts in timestamps_us {
        if let Some(key) = bucket_key_ms(ts, interval) {
            *counts.entry(key).or_insert(0) += 1;
        }
    }

    counts
}
