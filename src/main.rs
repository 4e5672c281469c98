use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use log::{error, info};
use tokio::sync::mpsc::unbounded_channel;

use foreground_app_checker::checker::{AppChecker, GOOGLE_PHOTOS_PACKAGE, SYNCTHING_PACKAGE};
use foreground_app_checker::config::{open_or_create_file, Config};
use foreground_app_checker::logger::Logger;
use foreground_app_checker::watchdog::watch_packages;

#[derive(Parser)]
#[command(name = "app_checker")]
#[command(version)]
#[command(about = "Checks whether an app is in the foreground using usage statistics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check one or more package identifiers
    Check {
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Check Google Photos
    Photos,

    /// Check Syncthing
    Syncthing,

    /// List the most recently used packages
    Recent {
        /// Maximum number of packages to list
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Keep checking the watched packages until Ctrl+C
    Watch,
}

fn print_status(package: &str, running: bool) {
    let state = if running { "running" } else { "not running" };
    println!("{}: {}", package, state);
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let config = Config::new(cli.config.as_deref());
    Logger::initialize(&config.log_path, cli.verbose)
        .with_context(|| format!("failed to set up logging at {:?}", config.log_path))?;

    let app_config = open_or_create_file(&config.config_path);
    info!("Using config from {:?}", config.config_path);

    let source = app_config
        .source
        .open()
        .context("failed to open usage source")?;
    let checker = AppChecker::with_settings(source, app_config.checker_settings());

    match cli.command {
        Commands::Check { packages } => {
            for package in &packages {
                print_status(package, checker.is_app_running_now(package));
            }
        }
        Commands::Photos => print_status(
            GOOGLE_PHOTOS_PACKAGE,
            checker.is_google_photos_running(),
        ),
        Commands::Syncthing => print_status(
            SYNCTHING_PACKAGE,
            checker.is_syncthing_running(),
        ),
        Commands::Recent { limit } => {
            let limit = limit.unwrap_or(app_config.recent_limit);
            for record in checker.recently_used_now(limit) {
                println!("{}\t{}", record.last_time_used, record.package_name);
            }
        }
        Commands::Watch => {
            let (ctrl_c_tx, ctrl_c_rx) = unbounded_channel::<()>();

            let signal_handle = tokio::spawn(async move {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    error!("Unable to listen for Ctrl+C: {:?}", err);
                    return;
                }
                info!("Ctrl+C detected. Sending shutdown signal...");
                let _ = ctrl_c_tx.send(());
            });

            info!(
                "Watching {} packages every {:?}",
                app_config.watched_packages.len(),
                app_config.check_interval()
            );
            watch_packages(
                Arc::new(checker),
                app_config.watched_packages.clone(),
                app_config.check_interval(),
                app_config.keep_alive(),
                ctrl_c_rx,
            )
            .await;
            signal_handle.abort();
        }
    }

    Ok(())
}
