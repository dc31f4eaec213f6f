//! Interactive session: launch or attach, follow output, relay keystrokes.
use crate::channel::{CommandSink, ControlChannel};
use crate::error::FatalError;
use crate::follower::OutputFollower;
use crate::input::{self, KeySource, RelayEnd};
use crate::lifecycle::{Coordinator, HelperRole};
use crate::player::Monitor;
use crate::signals::SignalHandler;
use crate::watchdog::Watchdog;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWrite;

/// Opens the foreground key source for a given quit key.
pub type OpenKeys = Box<dyn FnOnce(char) -> std::io::Result<Box<dyn KeySource>> + Send>;

pub struct Session {
    pub monitor: Monitor,
    pub channel: ControlChannel,
    pub output_log: PathBuf,
    pub tail_lines: usize,
    pub poll_interval: Duration,
    pub quit_key: char,
    /// Render output with `\r\n`, for a terminal in raw mode.
    pub crlf: bool,
}

impl Session {
    /// Run the session until one of the shutdown triggers fires.
    ///
    /// Setup order: launch or attach, start the follower (a missing log
    /// aborts here, before any other task exists), mark the coordinator
    /// running, spawn the death watcher, install signal listeners, then
    /// relay keys in the foreground.
    pub async fn attach<W>(
        self,
        coordinator: Arc<Coordinator>,
        output: W,
        sink: Arc<dyn CommandSink>,
        open_keys: OpenKeys,
    ) -> Result<i32, FatalError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let outcome = self.monitor.launch_if_absent(&self.channel).await?;
        tracing::debug!(?outcome, ctl = %self.channel.path().display(), "player ready");

        let follower = OutputFollower::new(&self.output_log, self.tail_lines)
            .crlf(self.crlf)
            .start(output, coordinator.clone())?;
        coordinator.register(HelperRole::OutputFollower, follower);
        coordinator.mark_running();

        let watcher = Watchdog::new(self.monitor, self.poll_interval).spawn(coordinator.clone());
        coordinator.register(HelperRole::DeathWatcher, watcher);

        if let Err(e) = SignalHandler::install(coordinator.clone()) {
            tracing::warn!(error = %e, "failed to install signal handlers");
        }

        let quit_key = self.quit_key;
        let end = tokio::task::spawn_blocking(move || match open_keys(quit_key) {
            Ok(mut keys) => input::relay(&mut *keys, &*sink),
            Err(e) => {
                tracing::warn!(error = %e, "cannot read from terminal");
                RelayEnd::ReadFailed
            }
        })
        .await;
        tracing::debug!(?end, "input relay finished");

        if !coordinator.shutdown() {
            // Another trigger owns the teardown and exits the process.
            coordinator.terminated().await;
        }
        Ok(0)
    }
}
