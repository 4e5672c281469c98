use std::fs;
use std::path::{Path, PathBuf};

use super::{within_window, IntervalType, UsageRecord, UsageStatsSource};
use crate::error::Result;

/// Usage records captured earlier into a JSON array, e.g.
/// `[{"packageName": "com.example", "lastTimeUsed": 1714572090000}]`.
/// The file is read again on every query.
#[derive(Debug, Clone)]
pub struct SnapshotUsageSource {
    path: PathBuf,
}

impl SnapshotUsageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<UsageRecord>> {
        let contents = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl UsageStatsSource for SnapshotUsageSource {
    fn query_usage_stats(
        &self,
        _interval: IntervalType,
        begin_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<UsageRecord>> {
        Ok(within_window(self.load()?, begin_ms, end_ms))
    }
}
