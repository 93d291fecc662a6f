//! Relaunching the application after an update.
//!
//! The new process is started detached from the current one, then the
//! current process exits. There is no handshake with the new instance.

use crate::config::Config;
use crate::utils::errors::{Result, UpdaterError};
use std::convert::Infallible;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use tracing::info;

#[cfg(windows)]
const CREATE_NEW_CONSOLE: u32 = 0x0000_0010;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl RestartCommand {
    /// `<interpreter> <root>/<entry_point>`, run from the application root.
    pub fn from_config(config: &Config) -> Self {
        let entry_point = config.app.root.join(&config.app.entry_point);
        Self {
            program: config.app.interpreter.clone(),
            args: vec![entry_point.to_string_lossy().into_owned()],
            working_dir: config.app.root.clone(),
        }
    }

    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            command.creation_flags(CREATE_NEW_CONSOLE);
        }

        command
    }

    /// Start the new instance without waiting for it.
    pub fn spawn(&self) -> Result<Child> {
        self.command()
            .spawn()
            .map_err(|e| UpdaterError::Restart(format!("cannot start {}: {}", self.program, e)))
    }
}

/// Start a fresh instance and terminate this process. Only returns when the
/// new instance could not be started.
pub fn restart_application(restart: &RestartCommand) -> Result<Infallible> {
    let child = restart.spawn()?;
    info!("Started {} (pid {}), exiting", restart.program, child.id());
    std::process::exit(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_command_from_config() {
        let mut config = Config::default();
        config.app.root = PathBuf::from("/opt/pos");
        config.app.interpreter = "python3".to_string();

        let restart = RestartCommand::from_config(&config);
        assert_eq!(restart.program, "python3");
        assert_eq!(restart.working_dir, PathBuf::from("/opt/pos"));
        assert_eq!(Path::new(&restart.args[0]), Path::new("/opt/pos/pos_app.py"));

        let command = restart.command();
        assert_eq!(command.get_program(), "python3");
        assert_eq!(command.get_current_dir(), Some(Path::new("/opt/pos")));
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let restart = RestartCommand {
            program: "definitely-not-a-real-program-7f3a".to_string(),
            args: Vec::new(),
            working_dir: std::env::temp_dir(),
        };
        assert!(matches!(restart.spawn(), Err(UpdaterError::Restart(_))));
        assert!(matches!(restart_application(&restart), Err(UpdaterError::Restart(_))));
    }
}
