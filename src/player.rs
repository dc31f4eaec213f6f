//! Managed player process: liveness detection and one-shot detached launch.
//!
//! No handle is kept between invocations. Liveness is always re-derived
//! from the OS process table, so unrelated sessions of this tool agree on
//! whether the player is up.
use crate::channel::ControlChannel;
use crate::error::FatalError;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tokio::process::Command;

/// Query against the OS process table.
pub trait ProcessTable: Send + Sync {
    /// True iff a process owned by the invoking user has exactly this command name.
    fn is_running(&self, name: &str) -> bool;
}

/// Process table read through `sysinfo`.
///
/// Names are compared against the kernel's command name, which Linux
/// truncates to 15 bytes.
pub struct ProcessList;

impl ProcessTable for ProcessList {
    fn is_running(&self, name: &str) -> bool {
        let uid = nix::unistd::getuid().as_raw();
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_user(UpdateKind::Always),
        );
        system.processes().values().any(|process| {
            process.name() == OsStr::new(name)
                && process.user_id().is_some_and(|owner| **owner == uid)
        })
    }
}

/// Starts the player in the background.
pub trait Launcher: Send + Sync {
    /// Spawn the player detached, returning its pid.
    fn launch(&self) -> Result<u32, FatalError>;
}

/// Spawns the real binary with stdout and stderr appended to the output log.
pub struct PlayerLauncher {
    binary: String,
    output_log: PathBuf,
}

impl PlayerLauncher {
    pub fn new(binary: impl Into<String>, output_log: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            output_log: output_log.into(),
        }
    }
}

fn open_log(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}

impl Launcher for PlayerLauncher {
    fn launch(&self) -> Result<u32, FatalError> {
        let launch_err = |source| FatalError::Launch {
            binary: self.binary.clone(),
            source,
        };

        let stdout = open_log(&self.output_log).map_err(launch_err)?;
        let stderr = stdout.try_clone().map_err(launch_err)?;

        tracing::info!(
            binary = %self.binary,
            output = %self.output_log.display(),
            "launching player"
        );

        // Own process group: the player outlives this tool and is not hit
        // by the group teardown on exit.
        let child = Command::new(&self.binary)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .process_group(0)
            .spawn()
            .map_err(launch_err)?;

        let pid = child.id().unwrap_or(0);
        tracing::info!(pid, "player started");
        Ok(pid)
    }
}

/// Result of [`Monitor::launch_if_absent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// A new player process was started.
    Launched { pid: u32 },
    /// The player was already up; nothing was spawned.
    AlreadyRunning,
}

/// Detects, launches and (via the watchdog) watches the managed player.
#[derive(Clone)]
pub struct Monitor {
    binary: String,
    table: Arc<dyn ProcessTable>,
    launcher: Arc<dyn Launcher>,
    launch_grace: Duration,
}

impl Monitor {
    pub fn new(
        binary: impl Into<String>,
        table: Arc<dyn ProcessTable>,
        launcher: Arc<dyn Launcher>,
        launch_grace: Duration,
    ) -> Self {
        Self {
            binary: binary.into(),
            table,
            launcher,
            launch_grace,
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Query the process table on the blocking pool.
    pub async fn is_running(&self) -> bool {
        let table = self.table.clone();
        let binary = self.binary.clone();
        match tokio::task::spawn_blocking(move || table.is_running(&binary)).await {
            Ok(running) => running,
            Err(e) => {
                tracing::warn!(error = %e, "process table query failed");
                false
            }
        }
    }

    /// Start the player unless it is already up.
    ///
    /// A fresh launch creates the control channel first and then waits the
    /// grace period so the player has opened its FIFO and log before anyone
    /// uses them. An already running player must already have its channel.
    pub async fn launch_if_absent(
        &self,
        channel: &ControlChannel,
    ) -> Result<LaunchOutcome, FatalError> {
        if self.is_running().await {
            tracing::debug!(binary = %self.binary, "player already running");
            channel.ensure(false)?;
            return Ok(LaunchOutcome::AlreadyRunning);
        }

        channel.ensure(true)?;
        let pid = self.launcher.launch()?;
        if !self.launch_grace.is_zero() {
            tokio::time::sleep(self.launch_grace).await;
        }
        Ok(LaunchOutcome::Launched { pid })
    }
}
