use std::process::ExitStatus;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UsageError {
    #[error("unable to read usage data: {0}")]
    Io(#[from] std::io::Error),

    #[error("unable to fetch from usage store: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("malformed usage snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("usage command exited with {status}: {stderr}")]
    Command { status: ExitStatus, stderr: String },

    #[error("usage access permission has not been granted")]
    PermissionDenied,

    #[error("invalid usage timestamp {0:?}")]
    InvalidTimestamp(String),
}

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("launch command is empty")]
    EmptyCommand,

    #[error("unable to run launch command: {0}")]
    Io(#[from] std::io::Error),

    #[error("launch command exited with {status}: {stderr}")]
    Command { status: ExitStatus, stderr: String },
}

pub type Result<T> = std::result::Result<T, UsageError>;
