use std::{io::Write, path::Path};

use chrono::Local;
use env_logger::{Builder, Env};
use log::{info, LevelFilter};

pub struct Logger;

/// Level used when `RUST_LOG` does not say otherwise. `verbose` opens up
/// trace output, which includes the sorted usage snapshot of every check.
pub fn default_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Trace
    } else if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

impl Logger {
    /// Debug builds log to the console, release builds to `log_path`.
    pub fn initialize(log_path: &Path, verbose: bool) -> std::io::Result<()> {
        let mut binding = Builder::new();
        // RUST_LOG directives are parsed last so they replace the default.
        binding
            .filter_level(default_level(verbose))
            .parse_env(Env::default());
        let builder = binding.format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        });

        #[cfg(debug_assertions)]
        {
            _ = log_path;
            builder.try_init().ok();
            info!("Debug mode: Logging to console.");
        }

        #[cfg(not(debug_assertions))]
        {
            if let Some(parent) = log_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let log_file = std::fs::File::create(log_path)?;
            builder
                .target(env_logger::Target::Pipe(Box::new(log_file)))
                .try_init()
                .ok();
            info!("Release mode: Logging to file at {:?}", log_path);
        }

        Ok(())
    }
}
