use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::checker::AppChecker;
use crate::health::HttpPingSender;
use crate::launcher::AppLauncher;
use crate::platform::UsageStatsSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageStatus {
    pub package_name: String,
    pub running: bool,
    /// A launch was attempted and the launch command succeeded.
    pub relaunched: bool,
}

/// What the watch loop does besides checking.
#[derive(Default)]
pub struct KeepAlive {
    /// Started for every watched package found not running.
    pub launcher: Option<AppLauncher>,
    /// Pinged once per pass.
    pub health_check: Option<HttpPingSender>,
}

/// Checks every package once against the same checker, relaunching the ones
/// not running when a launcher is given.
pub fn check_packages<S: UsageStatsSource>(
    checker: &AppChecker<S>,
    packages: &[String],
    launcher: Option<&AppLauncher>,
) -> Vec<PackageStatus> {
    packages
        .iter()
        .map(|package| {
            let running = checker.is_app_running_now(package);
            let relaunched = match launcher {
                Some(launcher) if !running => match launcher.launch(package) {
                    Ok(()) => true,
                    Err(err) => {
                        warn!("Unable to relaunch {}: {}", package, err);
                        false
                    }
                },
                _ => false,
            };
            PackageStatus {
                package_name: package.clone(),
                running,
                relaunched,
            }
        })
        .collect()
}

/// Re-checks `packages` every `interval` until a shutdown signal arrives.
/// Status changes are logged at info level, repeats at debug level.
pub async fn watch_packages<S>(
    checker: Arc<AppChecker<S>>,
    packages: Vec<String>,
    interval: Duration,
    keep_alive: KeepAlive,
    mut shutdown: mpsc::UnboundedReceiver<()>,
) where
    S: UsageStatsSource + 'static,
{
    let packages = Arc::new(packages);
    let launcher = keep_alive.launcher.map(Arc::new);
    let mut previous: HashMap<String, bool> = HashMap::new();

    loop {
        tokio::select! {
            Some(_) = shutdown.recv() => {
                info!("Shutdown signal received. Exiting watch loop.");
                break;
            },
            _ = async {
                let start = Instant::now();
                let checker = Arc::clone(&checker);
                let batch = Arc::clone(&packages);
                let pass_launcher = launcher.clone();

                match tokio::task::spawn_blocking(move || {
                    check_packages(&checker, &batch, pass_launcher.as_deref())
                })
                .await
                {
                    Ok(statuses) => {
                        for status in statuses {
                            let changed = previous.insert(status.package_name.clone(), status.running)
                                != Some(status.running);
                            let state = if status.running { "running" } else { "not running" };
                            if changed {
                                info!("{} is {}", status.package_name, state);
                            } else {
                                debug!("{} is still {}", status.package_name, state);
                            }
                            if status.relaunched {
                                info!("Relaunched {}", status.package_name);
                            }
                        }
                    }
                    Err(err) => error!("Usage check task failed: {:?}", err),
                }

                if let Some(health_check) = &keep_alive.health_check {
                    if let Err(err) = health_check.send_ping().await {
                        warn!("Health check ping to {} failed: {}", health_check.url(), err);
                    }
                }

                let elapsed = start.elapsed();
                debug!("Time elapsed in watch loop: {:?}", elapsed);
                tokio::time::sleep(interval.saturating_sub(elapsed)).await;
            } => {}
        }
    }
}
