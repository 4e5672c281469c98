pub mod checker;
pub mod config;
pub mod db;
pub mod error;
pub mod health;
pub mod launcher;
pub mod logger;
pub mod platform;
pub mod watchdog;

pub use checker::{AppChecker, CheckerSettings, CollisionPolicy};
pub use error::UsageError;
pub use platform::{IntervalType, StaticUsageSource, UsageRecord, UsageStatsSource};
