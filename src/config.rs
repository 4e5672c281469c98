use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::checker::{
    CheckerSettings, CollisionPolicy, DEFAULT_LOOKBACK, DEFAULT_RECENT_LIMIT,
    DEFAULT_TRAILING_COUNT, GOOGLE_PHOTOS_PACKAGE, SYNCTHING_PACKAGE,
};
use crate::db::SqliteUsageSource;
use crate::error::Result;
use crate::health::HttpPingSender;
use crate::launcher::{default_launch_command, AppLauncher};
use crate::platform::{DumpsysUsageSource, IntervalType, SnapshotUsageSource, UsageStatsSource};
use crate::watchdog::KeepAlive;

const APP_DIR: &str = "foreground_app_checker";
const CONFIG_FILE: &str = "config.json";
const LOG_FILE: &str = "application.log";
const APP_DATA: &str = "%AppData%";

/// Where usage records come from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Dumpsys {
        command: Vec<String>,
        /// Android user whose stats are read; the first user listed when unset.
        #[serde(default)]
        user: Option<u32>,
    },
    Sqlite { path: String },
    Snapshot { path: String },
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::Dumpsys {
            command: vec!["dumpsys".to_owned(), "usagestats".to_owned()],
            user: None,
        }
    }
}

impl SourceConfig {
    pub fn open(&self) -> Result<Box<dyn UsageStatsSource>> {
        let source: Box<dyn UsageStatsSource> = match self {
            Self::Dumpsys { command, user } => {
                Box::new(DumpsysUsageSource::from_command(command).with_user(*user))
            }
            Self::Sqlite { path } => {
                Box::new(SqliteUsageSource::open(Path::new(&expand_app_data(path)))?)
            }
            Self::Snapshot { path } => Box::new(SnapshotUsageSource::new(expand_app_data(path))),
        };
        Ok(source)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppCheckerConfig {
    pub lookback_secs: u64,
    pub interval: IntervalType,
    pub trailing_count: usize,
    pub collision_policy: CollisionPolicy,
    pub recent_limit: usize,
    pub check_interval_secs: u64,
    pub watched_packages: Vec<String>,
    pub source: SourceConfig,
    /// Start watched packages found not running.
    pub relaunch: bool,
    /// Launch command line; `{package}` is replaced by the package identifier.
    pub launch_command: Vec<String>,
    /// Pinged after every watch pass when set.
    pub health_check_url: Option<String>,
}

impl Default for AppCheckerConfig {
    fn default() -> Self {
        Self {
            lookback_secs: DEFAULT_LOOKBACK.as_secs(),
            interval: IntervalType::Daily,
            trailing_count: DEFAULT_TRAILING_COUNT,
            collision_policy: CollisionPolicy::LastWriteWins,
            recent_limit: DEFAULT_RECENT_LIMIT,
            check_interval_secs: 5,
            watched_packages: vec![
                GOOGLE_PHOTOS_PACKAGE.to_owned(),
                SYNCTHING_PACKAGE.to_owned(),
            ],
            source: SourceConfig::default(),
            relaunch: false,
            launch_command: default_launch_command(),
            health_check_url: None,
        }
    }
}

impl AppCheckerConfig {
    pub fn checker_settings(&self) -> CheckerSettings {
        CheckerSettings {
            lookback: Duration::from_secs(self.lookback_secs),
            interval: self.interval,
            trailing_count: self.trailing_count,
            collision_policy: self.collision_policy,
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    pub fn keep_alive(&self) -> KeepAlive {
        KeepAlive {
            launcher: self
                .relaunch
                .then(|| AppLauncher::new(self.launch_command.clone())),
            health_check: self
                .health_check_url
                .as_deref()
                .filter(|url| !url.is_empty())
                .map(HttpPingSender::new),
        }
    }
}

/// Resolved file locations for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub config_path: PathBuf,
    pub log_path: PathBuf,
}

impl Config {
    /// Uses `config_path` when given, then `CONFIG_PATH`, then the per-user
    /// config directory. The log file sits next to the config file.
    pub fn new(config_path: Option<&Path>) -> Self {
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(default_config_path);
        Self::from_config_path(config_path)
    }

    pub fn from_config_path(config_path: PathBuf) -> Self {
        let log_path = config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(LOG_FILE);
        Self {
            config_path,
            log_path,
        }
    }
}

fn default_config_path() -> PathBuf {
    match env::var("CONFIG_PATH") {
        Ok(path) => PathBuf::from(expand_app_data(&path)),
        Err(_) => dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join(CONFIG_FILE),
    }
}

/// Replaces `%AppData%` with the platform's per-user config directory.
pub fn expand_app_data(path: &str) -> String {
    if !path.contains(APP_DATA) {
        return path.to_owned();
    }
    match dirs::config_dir() {
        Some(app_data_path) => path.replace(APP_DATA, &app_data_path.to_string_lossy()),
        None => {
            error!("Failed to resolve {}. Using current directory.", APP_DATA);
            path.replace(APP_DATA, ".")
        }
    }
}

fn create_default(path: &Path) -> std::io::Result<AppCheckerConfig> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let default_config = AppCheckerConfig::default();
    let default_config_string = serde_json::to_string_pretty(&default_config)?;
    fs::write(path, default_config_string)?;
    info!("Created default config file at {:?}", path);
    Ok(default_config)
}

/// Reads the config at `path`, creating it with defaults when missing.
/// Any other failure logs and falls back to defaults.
pub fn open_or_create_file(path: &Path) -> AppCheckerConfig {
    match fs::read_to_string(path) {
        Ok(json_string) => match serde_json::from_str(&json_string) {
            Ok(app_config) => app_config,
            Err(err) => {
                error!("Failed to parse config file: {}. Using default.", err);
                AppCheckerConfig::default()
            }
        },
        Err(err) if err.kind() == ErrorKind::NotFound => match create_default(path) {
            Ok(new_config) => new_config,
            Err(err) => {
                error!("Failed to create new config file: {}. Using default.", err);
                AppCheckerConfig::default()
            }
        },
        Err(err) => {
            error!(
                "Unexpected error opening config file: {}. Using default.",
                err
            );
            AppCheckerConfig::default()
        }
    }
}
