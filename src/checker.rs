//! Foreground-app heuristic.
//!
//! A package counts as "running" when it owns one of the most recent entries
//! of a usage-statistics snapshot taken over a short trailing window. Every
//! abnormal path (failed query, empty window, too little history) answers
//! `false`.

use std::collections::BTreeMap;
use std::time::Duration;

use log::{debug, log_enabled, trace, warn, Level};
use serde::{Deserialize, Serialize};

use crate::platform::{now_millis, IntervalType, UsageRecord, UsageStatsSource};

pub const GOOGLE_PHOTOS_PACKAGE: &str = "com.google.android.apps.photos";
pub const SYNCTHING_PACKAGE: &str = "com.nutomic.syncthingandroid";

pub const DEFAULT_LOOKBACK: Duration = Duration::from_secs(1000);
pub const DEFAULT_TRAILING_COUNT: usize = 2;
pub const DEFAULT_RECENT_LIMIT: usize = 5;

/// How records sharing a `last_time_used` value are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Re-key by timestamp; the record that comes later in the query result
    /// replaces earlier ones with the same timestamp.
    #[default]
    LastWriteWins,
    /// Keep every record. Ties keep query order, so the later record still
    /// counts as the more recent one.
    KeepAll,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckerSettings {
    pub lookback: Duration,
    pub interval: IntervalType,
    pub trailing_count: usize,
    pub collision_policy: CollisionPolicy,
}

impl Default for CheckerSettings {
    fn default() -> Self {
        Self {
            lookback: DEFAULT_LOOKBACK,
            interval: IntervalType::Daily,
            trailing_count: DEFAULT_TRAILING_COUNT,
            collision_policy: CollisionPolicy::LastWriteWins,
        }
    }
}

/// Orders `records` by `last_time_used`, oldest first.
pub fn sorted_snapshot(records: &[UsageRecord], policy: CollisionPolicy) -> Vec<&UsageRecord> {
    match policy {
        CollisionPolicy::LastWriteWins => {
            let mut by_time: BTreeMap<i64, &UsageRecord> = BTreeMap::new();
            for record in records {
                by_time.insert(record.last_time_used, record);
            }
            by_time.into_values().collect()
        }
        CollisionPolicy::KeepAll => {
            let mut ordered: Vec<&UsageRecord> = records.iter().collect();
            ordered.sort_by_key(|record| record.last_time_used);
            ordered
        }
    }
}

/// Returns `true` when `target` owns one of the `trailing_count` most recent
/// entries. Fewer than `trailing_count` entries always answers `false`.
/// A `trailing_count` of zero is treated as one.
pub fn is_in_trailing_records(
    records: &[UsageRecord],
    target: &str,
    trailing_count: usize,
    policy: CollisionPolicy,
) -> bool {
    let trailing_count = trailing_count.max(1);
    let snapshot = sorted_snapshot(records, policy);
    log_snapshot(&snapshot);

    if snapshot.len() < trailing_count {
        debug!(
            "{} usage entries available, {} needed to judge {}",
            snapshot.len(),
            trailing_count,
            target
        );
        return false;
    }

    match snapshot
        .iter()
        .rev()
        .take(trailing_count)
        .position(|record| record.package_name == target)
    {
        Some(0) => {
            debug!("{} is the most recent app.", target);
            true
        }
        Some(index) => {
            debug!("{} is the recent app at position {}.", target, index + 1);
            true
        }
        None => {
            debug!("{} is not among the {} most recent apps.", target, trailing_count);
            false
        }
    }
}

/// `true` when any of `records` belongs to `target`.
pub fn is_app_running_recently(records: &[UsageRecord], target: &str) -> bool {
    let found = records.iter().any(|record| record.package_name == target);
    debug!(
        "is_app_running_recently: {} = {} (checked against {} recent records)",
        target,
        found,
        records.len()
    );
    found
}

fn log_snapshot(snapshot: &[&UsageRecord]) {
    if !log_enabled!(Level::Trace) {
        return;
    }
    for record in snapshot {
        trace!("{} -> {}", record.last_time_used, record.package_name);
    }
}

pub struct AppChecker<S> {
    source: S,
    settings: CheckerSettings,
}

impl<S: UsageStatsSource> AppChecker<S> {
    pub fn new(source: S) -> Self {
        Self::with_settings(source, CheckerSettings::default())
    }

    pub fn with_settings(source: S, settings: CheckerSettings) -> Self {
        Self { source, settings }
    }

    pub fn settings(&self) -> &CheckerSettings {
        &self.settings
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn is_app_running(&self, target: &str, window_start: i64, window_end: i64) -> bool {
        let records = self.query(self.settings.interval, window_start, window_end);
        if records.is_empty() {
            return false;
        }
        is_in_trailing_records(
            &records,
            target,
            self.settings.trailing_count,
            self.settings.collision_policy,
        )
    }

    /// Checks `target` over the lookback window ending now.
    pub fn is_app_running_now(&self, target: &str) -> bool {
        let (start, end) = self.window_ending_now();
        self.is_app_running(target, start, end)
    }

    pub fn is_google_photos_running(&self) -> bool {
        self.is_app_running_now(GOOGLE_PHOTOS_PACKAGE)
    }

    pub fn is_syncthing_running(&self) -> bool {
        self.is_app_running_now(SYNCTHING_PACKAGE)
    }

    /// Most recently used records first, at most `limit` of them. Always
    /// queried at the finest granularity the source offers.
    pub fn recently_used(&self, window_start: i64, window_end: i64, limit: usize) -> Vec<UsageRecord> {
        let records = self.query(IntervalType::Best, window_start, window_end);
        let recent: Vec<UsageRecord> = sorted_snapshot(&records, self.settings.collision_policy)
            .into_iter()
            .rev()
            .take(limit)
            .cloned()
            .collect();
        debug!(
            "Found {} apps with usage in the window, returning {}: {:?}",
            records.len(),
            recent.len(),
            recent
                .iter()
                .map(|record| format!("{} (used at {})", record.package_name, record.last_time_used))
                .collect::<Vec<_>>()
        );
        recent
    }

    pub fn recently_used_now(&self, limit: usize) -> Vec<UsageRecord> {
        let (start, end) = self.window_ending_now();
        self.recently_used(start, end, limit)
    }

    fn window_ending_now(&self) -> (i64, i64) {
        let end = now_millis();
        let lookback = i64::try_from(self.settings.lookback.as_millis()).unwrap_or(i64::MAX);
        (end.saturating_sub(lookback), end)
    }

    fn query(&self, interval: IntervalType, window_start: i64, window_end: i64) -> Vec<UsageRecord> {
        match self
            .source
            .query_usage_stats(interval, window_start, window_end)
        {
            Ok(records) if records.is_empty() => {
                debug!(
                    "No usage records between {} and {}.",
                    window_start, window_end
                );
                records
            }
            Ok(records) => records,
            Err(err) => {
                warn!("Usage query failed, treating as no usage: {}", err);
                debug!(
                    "No usage records between {} and {}.",
                    window_start, window_end
                );
                Vec::new()
            }
        }
    }
}
