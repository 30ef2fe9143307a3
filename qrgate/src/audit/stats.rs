//! Aggregation over log entries
//!
//! Summaries are recomputed from a fresh query every time they are asked
//! for; nothing here is cached.

use super::entry::{Action, LogEntry};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Width of a time bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Hour,
    Day,
}

impl Bucket {
    fn seconds(self) -> i64 {
        match self {
            Bucket::Hour => 3_600,
            Bucket::Day => 86_400,
        }
    }

    /// Start of the bucket containing `timestamp`, in UTC
    pub fn truncate(self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        let secs = timestamp.timestamp();
        let start = secs - secs.rem_euclid(self.seconds());
        DateTime::from_timestamp(start, 0).unwrap_or(timestamp)
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bucket::Hour => f.write_str("hour"),
            Bucket::Day => f.write_str("day"),
        }
    }
}

impl FromStr for Bucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hour" => Ok(Bucket::Hour),
            "day" => Ok(Bucket::Day),
            other => Err(format!("unknown bucket: {other} (expected hour or day)")),
        }
    }
}

/// Counts for one time bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketCounts {
    pub start: DateTime<Utc>,
    pub total: u64,
    pub actions: BTreeMap<Action, u64>,
}

/// Per-action totals over a set of entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSummary {
    pub total: u64,
    /// Every known action, zero when it never occurred
    pub actions: BTreeMap<Action, u64>,
    pub unique_clients: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buckets: Option<Vec<BucketCounts>>,
}

impl StatsSummary {
    pub fn count(&self, action: Action) -> u64 {
        self.actions.get(&action).copied().unwrap_or(0)
    }
}

fn zeroed() -> BTreeMap<Action, u64> {
    Action::ALL.into_iter().map(|action| (action, 0)).collect()
}

/// Summarize `entries`
///
/// # Example
///
/// ```
/// use qrgate::audit::{Action, Detail, PendingEntry, summarize};
/// use chrono::Utc;
///
/// let entries = vec![
///     PendingEntry::new(Action::Generate, "a", Detail::RateLimited).stamp(Utc::now()),
///     PendingEntry::new(Action::OcrError, "b", Detail::RateLimited).stamp(Utc::now()),
/// ];
/// let stats = summarize(&entries);
/// assert_eq!(stats.total, 2);
/// assert_eq!(stats.count(Action::Decode), 0);
/// assert_eq!(stats.unique_clients, 2);
/// ```
pub fn summarize(entries: &[LogEntry]) -> StatsSummary {
    let mut actions = zeroed();
    let mut clients = HashSet::new();

    for entry in entries {
        *actions.entry(entry.action).or_insert(0) += 1;
        clients.insert(entry.client_key.as_str());
    }

    StatsSummary {
        total: entries.len() as u64,
        actions,
        unique_clients: clients.len(),
        buckets: None,
    }
}

/// Summarize `entries`, adding counts per time bucket in ascending order
pub fn summarize_by(entries: &[LogEntry], bucket: Bucket) -> StatsSummary {
    let mut grouped: BTreeMap<DateTime<Utc>, BucketCounts> = BTreeMap::new();

    for entry in entries {
        let start = bucket.truncate(entry.timestamp);
        let counts = grouped.entry(start).or_insert_with(|| BucketCounts {
            start,
            total: 0,
            actions: zeroed(),
        });
        counts.total += 1;
        *counts.actions.entry(entry.action).or_insert(0) += 1;
    }

    StatsSummary {
        buckets: Some(grouped.into_values().collect()),
        ..summarize(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::entry::{Detail, PendingEntry};
    use chrono::TimeZone;

    fn at(action: Action, client: &str, timestamp: DateTime<Utc>) -> LogEntry {
        PendingEntry::new(action, client, Detail::RateLimited).stamp(timestamp)
    }

    #[test]
    fn test_counts_every_action() {
        let now = Utc::now();
        let mut entries = Vec::new();
        for _ in 0..3 {
            entries.push(at(Action::Generate, "a", now));
        }
        for _ in 0..2 {
            entries.push(at(Action::Decode, "b", now));
        }
        entries.push(at(Action::OcrError, "a", now));

        let stats = summarize(&entries);
        assert_eq!(stats.total, 6);
        assert_eq!(stats.count(Action::Generate), 3);
        assert_eq!(stats.count(Action::Decode), 2);
        assert_eq!(stats.count(Action::OcrError), 1);
        assert_eq!(stats.count(Action::Ocr), 0);
        assert_eq!(stats.count(Action::GenerateError), 0);
        assert_eq!(stats.count(Action::DecodeError), 0);
        assert_eq!(stats.count(Action::Access), 0);
        assert_eq!(stats.actions.len(), Action::ALL.len());
        assert_eq!(stats.unique_clients, 2);
        assert!(stats.buckets.is_none());
    }

    #[test]
    fn test_empty_log_is_all_zeros() {
        let stats = summarize(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.unique_clients, 0);
        assert!(Action::ALL.iter().all(|a| stats.count(*a) == 0));
        assert_eq!(stats.actions.len(), Action::ALL.len());
    }

    #[test]
    fn test_json_lists_zero_counts() {
        let json = serde_json::to_value(summarize(&[])).unwrap();
        assert_eq!(json["total"], 0);
        assert_eq!(json["actions"]["ocr_error"], 0);
        assert_eq!(json["actions"]["generate"], 0);
        assert!(json.get("buckets").is_none());
    }

    #[test]
    fn test_hour_buckets() {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap();
        let entries = vec![
            at(Action::Generate, "a", base),
            at(Action::Decode, "a", base + chrono::TimeDelta::minutes(30)),
            at(Action::Generate, "b", base + chrono::TimeDelta::minutes(50)),
            at(Action::OcrError, "c", base + chrono::TimeDelta::hours(3)),
        ];

        let stats = summarize_by(&entries, Bucket::Hour);
        assert_eq!(stats.total, 4);
        let buckets = stats.buckets.unwrap();
        assert_eq!(buckets.len(), 3);

        assert_eq!(
            buckets[0].start,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(buckets[0].total, 2);
        assert_eq!(buckets[0].actions[&Action::Generate], 1);
        assert_eq!(buckets[0].actions[&Action::Decode], 1);

        assert_eq!(
            buckets[1].start,
            Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap()
        );
        assert_eq!(buckets[2].actions[&Action::OcrError], 1);
        assert_eq!(buckets[2].actions[&Action::Generate], 0);
    }

    #[test]
    fn test_day_buckets() {
        let late = Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 59).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 1).unwrap();
        let entries = vec![at(Action::Ocr, "a", late), at(Action::Ocr, "a", early)];

        let buckets = summarize_by(&entries, Bucket::Day).buckets.unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(
            buckets[1].start,
            Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_bucket_parsing() {
        assert_eq!("hour".parse::<Bucket>().unwrap(), Bucket::Hour);
        assert_eq!("DAY".parse::<Bucket>().unwrap(), Bucket::Day);
        assert!("week".parse::<Bucket>().is_err());
    }
}
