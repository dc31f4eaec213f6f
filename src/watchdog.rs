use crate::lifecycle::Coordinator;
use crate::player::Monitor;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Death watcher for the managed player.
///
/// Runs alongside the interactive session, polling the process table. Once
/// the player is gone it routes into the coordinator's shutdown path.
pub struct Watchdog {
    monitor: Monitor,
    poll_interval: Duration,
}

impl Watchdog {
    pub fn new(monitor: Monitor, poll_interval: Duration) -> Self {
        Self {
            monitor,
            poll_interval,
        }
    }

    /// Resolve once the player is no longer running.
    pub async fn watch(&self) {
        while self.monitor.is_running().await {
            tokio::time::sleep(self.poll_interval).await;
        }
        tracing::info!(binary = %self.monitor.binary(), "player exited");
    }

    /// Spawn the watch loop; player death triggers `coordinator.shutdown()`.
    pub fn spawn(self, coordinator: Arc<Coordinator>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.watch().await;
            coordinator.shutdown();
        })
    }
}
