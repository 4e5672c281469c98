use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use log::{debug, error};
use rusqlite::{params, Connection};

use crate::error::{Result, UsageError};
use crate::platform::{IntervalType, UsageRecord, UsageStatsSource};

const SCHEMA_QUERY: &str = r#"
    CREATE TABLE IF NOT EXISTS window_activity_usage (
        id TEXT PRIMARY KEY NOT NULL,
        session_id TEXT NOT NULL,
        app_time_id TEXT,
        application_name TEXT NOT NULL,
        current_screen_title TEXT NOT NULL,
        start_time TIMESTAMP NOT NULL,
        last_updated_time TIMESTAMP NOT NULL
    )
"#;

const LAST_USED_QUERY: &str = r#"
    SELECT application_name, MAX(last_updated_time) AS last_used
    FROM window_activity_usage
    WHERE last_updated_time BETWEEN ?1 AND ?2
    GROUP BY application_name
    ORDER BY last_used ASC
"#;

const MAX_RETRIES: u64 = 5;
const RETRY_DELAY_MS: u64 = 100;
// 9999-12-31 23:59:59.999 UTC; keeps stored timestamps comparable as text.
const MAX_QUERY_MILLIS: i64 = 253_402_300_799_999;

/// Usage records backed by the window activity table of a screen-time tracker
/// database. One record per application, stamped with its latest update.
pub struct SqliteUsageSource {
    conn: Mutex<Connection>,
}

impl SqliteUsageSource {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|err| {
            error!("Failed to open usage database at {:?}: {:?}", path, err);
            err
        })?;
        debug!("Usage database opened at: {:?}", path);
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn ensure_schema(&self) -> Result<()> {
        self.with_connection(|conn| conn.execute_batch(SCHEMA_QUERY))
    }

    fn with_connection<T>(
        &self,
        operation: impl Fn(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let mut attempts = 0;
        loop {
            let conn = self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            match operation(&conn) {
                Ok(value) => return Ok(value),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ffi::ErrorCode::DatabaseBusy
                        && attempts < MAX_RETRIES =>
                {
                    attempts += 1;
                    drop(conn);
                    debug!("Usage database busy, retry {} of {}", attempts, MAX_RETRIES);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempts));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl UsageStatsSource for SqliteUsageSource {
    fn query_usage_stats(
        &self,
        _interval: IntervalType,
        begin_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<UsageRecord>> {
        let begin = local_naive(begin_ms);
        let end = local_naive(end_ms);

        let rows = self.with_connection(|conn| {
            let mut stmt = conn.prepare(LAST_USED_QUERY)?;
            let rows = stmt.query_map(params![begin, end], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, NaiveDateTime>(1)?))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;

        rows.into_iter()
            .map(|(name, last_used)| {
                let millis = Local
                    .from_local_datetime(&last_used)
                    .earliest()
                    .map(|time| time.timestamp_millis())
                    .ok_or_else(|| UsageError::InvalidTimestamp(last_used.to_string()))?;
                Ok(UsageRecord::new(name, millis))
            })
            .collect()
    }
}

fn local_naive(millis: i64) -> NaiveDateTime {
    let clamped = millis.clamp(0, MAX_QUERY_MILLIS);
    DateTime::from_timestamp_millis(clamped)
        .map(|time| time.with_timezone(&Local).naive_local())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn insert_usage(source: &SqliteUsageSource, id: &str, app: &str, last_updated_ms: i64) {
        let last_updated = local_naive(last_updated_ms);
        source
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO window_activity_usage (
                        id, session_id, app_time_id, application_name,
                        current_screen_title, start_time, last_updated_time
                    ) VALUES (?1, 'session', NULL, ?2, ?1, ?3, ?3)",
                    params![id, app, last_updated],
                )
            })
            .unwrap();
    }

    fn setup() -> (SqliteUsageSource, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let source = SqliteUsageSource::open(&dir.path().join("usage.sqlite3")).unwrap();
        source.ensure_schema().unwrap();
        (source, dir)
    }

    #[test]
    fn test_returns_latest_update_per_application() {
        let (source, _dir) = setup();
        let base = 1_714_572_000_000;
        insert_usage(&source, "editor-1", "code.exe", base + 10_000);
        insert_usage(&source, "editor-2", "code.exe", base + 40_000);
        insert_usage(&source, "browser", "firefox.exe", base + 20_000);

        let records = source
            .query_usage_stats(IntervalType::Daily, base, base + 60_000)
            .unwrap();

        assert_eq!(
            records,
            vec![
                UsageRecord::new("firefox.exe", base + 20_000),
                UsageRecord::new("code.exe", base + 40_000),
            ]
        );
    }

    #[test]
    fn test_excludes_updates_outside_window() {
        let (source, _dir) = setup();
        let base = 1_714_572_000_000;
        insert_usage(&source, "old", "explorer.exe", base - 5_000);
        insert_usage(&source, "new", "firefox.exe", base + 5_000);

        let records = source
            .query_usage_stats(IntervalType::Daily, base, i64::MAX)
            .unwrap();

        assert_eq!(records, vec![UsageRecord::new("firefox.exe", base + 5_000)]);
    }

    #[test]
    fn test_missing_table_is_sqlite_error() {
        let dir = tempdir().unwrap();
        let source = SqliteUsageSource::open(&dir.path().join("empty.sqlite3")).unwrap();
        let result = source.query_usage_stats(IntervalType::Daily, 0, i64::MAX);
        assert!(matches!(result, Err(UsageError::Sqlite(_))));
    }
}
