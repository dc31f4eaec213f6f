//! Setup failures that abort the tool with a distinct exit status.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FatalError {
    /// The control FIFO could not be created, or something other than a
    /// FIFO occupies its path.
    #[error("control channel {} is unusable: {reason}", .path.display())]
    ControlChannel { path: PathBuf, reason: String },

    /// The player is running but its control FIFO does not exist.
    #[error(
        "control channel {} does not exist; the player is presumably not set up for remote control",
        .path.display()
    )]
    ControlChannelMissing { path: PathBuf },

    /// The output log is missing when streaming was requested.
    #[error(
        "output log {} does not exist; investigate the player or kill it manually",
        .path.display()
    )]
    OutputLogMissing { path: PathBuf },

    /// The player binary could not be started.
    #[error("failed to launch {binary}: {source}")]
    Launch {
        binary: String,
        source: std::io::Error,
    },
}

impl FatalError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            FatalError::ControlChannel { .. } | FatalError::ControlChannelMissing { .. } => 1,
            FatalError::OutputLogMissing { .. } => 2,
            FatalError::Launch { .. } => 3,
        }
    }
}
