use std::process::Command;

use log::{debug, info};

use crate::error::LaunchError;

/// Replaced by the package identifier in every launch command argument.
pub const PACKAGE_PLACEHOLDER: &str = "{package}";

/// Starts an app's launcher activity through a shell command such as
/// `monkey -p <package> -c android.intent.category.LAUNCHER 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct AppLauncher {
    command: Vec<String>,
}

impl AppLauncher {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub fn via_adb(serial: Option<&str>) -> Self {
        let mut command = vec!["adb".to_owned()];
        if let Some(serial) = serial {
            command.push("-s".to_owned());
            command.push(serial.to_owned());
        }
        command.push("shell".to_owned());
        command.extend(default_launch_command());
        Self::new(command)
    }

    /// The command line for `package`, program first.
    pub fn command_for(&self, package: &str) -> Vec<String> {
        self.command
            .iter()
            .map(|arg| arg.replace(PACKAGE_PLACEHOLDER, package))
            .collect()
    }

    pub fn launch(&self, package: &str) -> Result<(), LaunchError> {
        let command = self.command_for(package);
        let (program, args) = command.split_first().ok_or(LaunchError::EmptyCommand)?;

        info!("Launching {}", package);
        debug!("Running {} {}", program, args.join(" "));
        let output = Command::new(program).args(args).output()?;
        if !output.status.success() {
            return Err(LaunchError::Command {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(())
    }
}

pub fn default_launch_command() -> Vec<String> {
    [
        "monkey",
        "-p",
        PACKAGE_PLACEHOLDER,
        "-c",
        "android.intent.category.LAUNCHER",
        "1",
    ]
    .map(str::to_owned)
    .to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_placeholder_is_replaced_in_every_argument() {
        let launcher = AppLauncher::new(vec![
            "am".to_owned(),
            "start".to_owned(),
            "-n".to_owned(),
            "{package}/{package}.MainActivity".to_owned(),
        ]);

        assert_eq!(
            launcher.command_for("com.example"),
            vec!["am", "start", "-n", "com.example/com.example.MainActivity"]
        );
    }

    #[test]
    fn test_via_adb_wraps_monkey_command() {
        let launcher = AppLauncher::via_adb(Some("emulator-5554"));
        assert_eq!(
            launcher.command_for("com.example"),
            vec![
                "adb",
                "-s",
                "emulator-5554",
                "shell",
                "monkey",
                "-p",
                "com.example",
                "-c",
                "android.intent.category.LAUNCHER",
                "1"
            ]
        );
    }

    #[test]
    fn test_launch_runs_command_with_package() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("launched");
        let launcher = AppLauncher::new(vec![
            "sh".to_owned(),
            "-c".to_owned(),
            format!("echo {} > {}", PACKAGE_PLACEHOLDER, marker.display()),
        ]);

        launcher.launch("com.example").unwrap();

        assert_eq!(fs::read_to_string(&marker).unwrap().trim(), "com.example");
    }

    #[test]
    fn test_failing_launch_is_reported() {
        let launcher = AppLauncher::new(vec!["false".to_owned()]);
        assert!(matches!(
            launcher.launch("com.example"),
            Err(LaunchError::Command { .. })
        ));
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let launcher = AppLauncher::new(Vec::new());
        assert!(matches!(
            launcher.launch("com.example"),
            Err(LaunchError::EmptyCommand)
        ));
    }
}
