use std::collections::HashMap;
use std::process::Command;
use std::sync::LazyLock;

use chrono::{Local, NaiveDateTime, TimeZone};
use log::debug;
use regex::Regex;

use super::{within_window, IntervalType, UsageRecord, UsageStatsSource};
use crate::error::{Result, UsageError};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const PERMISSION_DENIAL: &str = "Permission Denial";

static PACKAGE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"package=(\S+)\s.*?lastTimeUsed="([^"]+)""#).expect("package line pattern")
});

/// Reads usage statistics from the text output of `dumpsys usagestats`.
/// Only one Android user's stats are read: `user` when set, otherwise the
/// first user in the dump.
#[derive(Debug, Clone)]
pub struct DumpsysUsageSource {
    program: String,
    args: Vec<String>,
    user: Option<u32>,
}

impl DumpsysUsageSource {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            user: None,
        }
    }

    pub fn with_user(mut self, user: Option<u32>) -> Self {
        self.user = user;
        self
    }

    /// Runs `dumpsys` directly, for use on the device itself.
    pub fn on_device() -> Self {
        Self::new("dumpsys", vec!["usagestats".to_owned()])
    }

    /// Runs `dumpsys` through `adb shell`, optionally against one device serial.
    pub fn via_adb(serial: Option<&str>) -> Self {
        let mut args = Vec::new();
        if let Some(serial) = serial {
            args.push("-s".to_owned());
            args.push(serial.to_owned());
        }
        args.extend(["shell", "dumpsys", "usagestats"].map(str::to_owned));
        Self::new("adb", args)
    }

    /// Builds a source from a full command line, program first.
    pub fn from_command(command: &[String]) -> Self {
        match command.split_first() {
            Some((program, args)) => Self::new(program.clone(), args.to_vec()),
            None => Self::on_device(),
        }
    }

    fn dump(&self) -> Result<String> {
        debug!("Running {} {}", self.program, self.args.join(" "));
        let output = Command::new(&self.program).args(&self.args).output()?;
        if !output.status.success() {
            return Err(UsageError::Command {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl UsageStatsSource for DumpsysUsageSource {
    fn query_usage_stats(
        &self,
        interval: IntervalType,
        begin_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<UsageRecord>> {
        let dump = self.dump()?;
        let records = parse_usagestats_dump(&dump, interval, self.user)?;
        Ok(within_window(records, begin_ms, end_ms))
    }
}

fn section_header(interval: IntervalType) -> &'static str {
    match interval {
        IntervalType::Daily | IntervalType::Best => "In-memory daily stats",
        IntervalType::Weekly => "In-memory weekly stats",
        IntervalType::Monthly => "In-memory monthly stats",
        IntervalType::Yearly => "In-memory yearly stats",
    }
}

fn user_id(line: &str) -> Option<u32> {
    let rest = line.strip_prefix("user=")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Extracts one record per package from the section of `dump` that matches
/// `interval`, keeping the latest `lastTimeUsed` seen for each package.
/// Stats of other Android users (work profiles, secondary users) are
/// skipped; `user` of `None` selects the first user listed.
pub fn parse_usagestats_dump(
    dump: &str,
    interval: IntervalType,
    user: Option<u32>,
) -> Result<Vec<UsageRecord>> {
    if dump.contains(PERMISSION_DENIAL) {
        return Err(UsageError::PermissionDenied);
    }

    let header = section_header(interval);
    let mut latest: HashMap<&str, i64> = HashMap::new();
    let mut in_section = false;
    let mut selected_user = user;
    let mut current_user: Option<u32> = None;

    for line in dump.lines() {
        let trimmed = line.trim();
        if let Some(id) = user_id(trimmed) {
            current_user = Some(id);
            selected_user.get_or_insert(id);
            in_section = false;
            continue;
        }
        if current_user.is_some() && current_user != selected_user {
            continue;
        }
        if trimmed.starts_with("In-memory ") {
            in_section = trimmed.starts_with(header);
            continue;
        }
        if !in_section {
            continue;
        }
        let Some(captures) = PACKAGE_LINE.captures(trimmed) else {
            continue;
        };
        let (Some(package), Some(used)) = (captures.get(1), captures.get(2)) else {
            continue;
        };
        let millis = local_timestamp_millis(used.as_str())?;
        latest
            .entry(package.as_str())
            .and_modify(|current| *current = (*current).max(millis))
            .or_insert(millis);
    }

    let mut records: Vec<UsageRecord> = latest
        .into_iter()
        .map(|(package, millis)| UsageRecord::new(package, millis))
        .collect();
    records.sort_by(|a, b| {
        a.last_time_used
            .cmp(&b.last_time_used)
            .then_with(|| a.package_name.cmp(&b.package_name))
    });
    debug!("Parsed {} usage records from {}", records.len(), header);
    Ok(records)
}

fn local_timestamp_millis(value: &str) -> Result<i64> {
    let naive = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map_err(|_| UsageError::InvalidTimestamp(value.to_owned()))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|time| time.timestamp_millis())
        .ok_or_else(|| UsageError::InvalidTimestamp(value.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_DUMP: &str = r#"user=0
  In-memory daily stats
  timeRange="2024-05-01 00:00:00 - 2024-05-01 14:02:11"
  packages
    package=com.android.settings totalTimeUsed="00:05" lastTimeUsed="2024-05-01 13:59:01" totalTimeVisible="00:06" lastTimeVisible="2024-05-01 13:59:02" totalTimeFS="00:00" lastTimeFS="1970-01-01 00:00:00" appLaunchCount=1
    package=com.google.android.apps.photos totalTimeUsed="10:05" lastTimeUsed="2024-05-01 14:01:30" totalTimeVisible="10:06" lastTimeVisible="2024-05-01 14:01:31" appLaunchCount=3
    package=com.nutomic.syncthingandroid totalTimeUsed="00:50" lastTimeUsed="2024-05-01 14:00:10" appLaunchCount=2
  events
    time="2024-05-01 14:01:30" type=ACTIVITY_PAUSED package=com.google.android.apps.photos class=.HomeActivity
  In-memory weekly stats
  timeRange="2024-04-28 00:00:00 - 2024-05-01 14:02:11"
  packages
    package=com.android.chrome totalTimeUsed="01:00:00" lastTimeUsed="2024-04-30 09:00:00" appLaunchCount=5
user=10
  In-memory daily stats
  packages
    package=com.android.settings totalTimeUsed="00:01" lastTimeUsed="2024-05-01 14:02:00" appLaunchCount=1
"#;

    fn millis(value: &str) -> i64 {
        local_timestamp_millis(value).unwrap()
    }

    #[test]
    fn test_parses_daily_section_of_first_user() {
        let records = parse_usagestats_dump(SAMPLE_DUMP, IntervalType::Daily, None).unwrap();

        // user=10 used settings later, but that profile is not the one read.
        assert_eq!(
            records,
            vec![
                UsageRecord::new("com.android.settings", millis("2024-05-01 13:59:01")),
                UsageRecord::new("com.nutomic.syncthingandroid", millis("2024-05-01 14:00:10")),
                UsageRecord::new("com.google.android.apps.photos", millis("2024-05-01 14:01:30")),
            ]
        );
    }

    #[test]
    fn test_parses_selected_user_only() {
        let records = parse_usagestats_dump(SAMPLE_DUMP, IntervalType::Daily, Some(10)).unwrap();
        assert_eq!(
            records,
            vec![UsageRecord::new("com.android.settings", millis("2024-05-01 14:02:00"))]
        );
    }

    #[test]
    fn test_unknown_user_yields_no_records() {
        let records = parse_usagestats_dump(SAMPLE_DUMP, IntervalType::Daily, Some(11)).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_keeps_latest_entry_per_package() {
        let dump = r#"  In-memory daily stats
    package=com.example totalTimeUsed="00:01" lastTimeUsed="2024-05-01 10:00:00"
    package=com.example totalTimeUsed="00:02" lastTimeUsed="2024-05-01 12:00:00"
    package=com.example totalTimeUsed="00:03" lastTimeUsed="2024-05-01 11:00:00"
"#;
        let records = parse_usagestats_dump(dump, IntervalType::Daily, None).unwrap();
        assert_eq!(
            records,
            vec![UsageRecord::new("com.example", millis("2024-05-01 12:00:00"))]
        );
    }

    #[test]
    fn test_best_interval_reads_daily_section() {
        let daily = parse_usagestats_dump(SAMPLE_DUMP, IntervalType::Daily, None).unwrap();
        let best = parse_usagestats_dump(SAMPLE_DUMP, IntervalType::Best, None).unwrap();
        assert_eq!(daily, best);
    }

    #[test]
    fn test_parses_weekly_section_only() {
        let records = parse_usagestats_dump(SAMPLE_DUMP, IntervalType::Weekly, None).unwrap();
        assert_eq!(
            records,
            vec![UsageRecord::new("com.android.chrome", millis("2024-04-30 09:00:00"))]
        );
    }

    #[test]
    fn test_missing_section_yields_no_records() {
        let records = parse_usagestats_dump(SAMPLE_DUMP, IntervalType::Yearly, None).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_permission_denial_is_reported() {
        let dump = "Permission Denial: can't dump UsageStats from pid=123, uid=2000";
        let result = parse_usagestats_dump(dump, IntervalType::Daily, None);
        assert!(matches!(result, Err(UsageError::PermissionDenied)));
    }

    #[test]
    fn test_malformed_timestamp_is_an_error() {
        let dump = "  In-memory daily stats\n    package=com.example lastTimeUsed=\"yesterday\" \n";
        let result = parse_usagestats_dump(dump, IntervalType::Daily, None);
        assert!(matches!(result, Err(UsageError::InvalidTimestamp(value)) if value == "yesterday"));
    }

    #[test]
    fn test_via_adb_builds_serial_arguments() {
        let source = DumpsysUsageSource::via_adb(Some("emulator-5554"));
        assert_eq!(source.program, "adb");
        assert_eq!(
            source.args,
            vec!["-s", "emulator-5554", "shell", "dumpsys", "usagestats"]
        );
    }

    #[test]
    fn test_from_empty_command_falls_back_to_on_device() {
        let source = DumpsysUsageSource::from_command(&[]);
        assert_eq!(source.program, "dumpsys");
        assert_eq!(source.args, vec!["usagestats"]);
    }

    #[test]
    fn test_failing_command_is_reported() {
        let source = DumpsysUsageSource::new("false", Vec::new());
        let result = source.query_usage_stats(IntervalType::Daily, 0, i64::MAX);
        assert!(matches!(
            result,
            Err(UsageError::Command { .. }) | Err(UsageError::Io(_))
        ));
    }
}
