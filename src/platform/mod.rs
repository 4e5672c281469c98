use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod dumpsys;
pub mod snapshot;

pub use dumpsys::DumpsysUsageSource;
pub use snapshot::SnapshotUsageSource;

/// One entry reported by a usage-statistics query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub package_name: String,
    /// Milliseconds since the Unix epoch.
    pub last_time_used: i64,
}

impl UsageRecord {
    pub fn new(package_name: impl Into<String>, last_time_used: i64) -> Self {
        Self {
            package_name: package_name.into(),
            last_time_used,
        }
    }
}

/// Bucket granularity of a usage query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalType {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Best,
}

pub trait UsageStatsSource: Send + Sync {
    /// Returns the records whose last use falls within `[begin_ms, end_ms]`.
    fn query_usage_stats(
        &self,
        interval: IntervalType,
        begin_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<UsageRecord>>;
}

impl<T: UsageStatsSource + ?Sized> UsageStatsSource for Box<T> {
    fn query_usage_stats(
        &self,
        interval: IntervalType,
        begin_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<UsageRecord>> {
        (**self).query_usage_stats(interval, begin_ms, end_ms)
    }
}

/// Fixed list of records, handed out on every query.
#[derive(Debug, Clone, Default)]
pub struct StaticUsageSource {
    records: Vec<UsageRecord>,
}

impl StaticUsageSource {
    pub fn new(records: Vec<UsageRecord>) -> Self {
        Self { records }
    }
}

impl UsageStatsSource for StaticUsageSource {
    fn query_usage_stats(
        &self,
        _interval: IntervalType,
        begin_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<UsageRecord>> {
        Ok(within_window(self.records.iter().cloned(), begin_ms, end_ms))
    }
}

pub(crate) fn within_window(
    records: impl IntoIterator<Item = UsageRecord>,
    begin_ms: i64,
    end_ms: i64,
) -> Vec<UsageRecord> {
    records
        .into_iter()
        .filter(|record| (begin_ms..=end_ms).contains(&record.last_time_used))
        .collect()
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
