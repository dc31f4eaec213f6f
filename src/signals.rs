//! Signal handling for graceful shutdown.
//!
//! SIGINT, SIGTERM, SIGHUP and SIGQUIT all route into the coordinator's
//! single shutdown path. The first one delivered wins; the teardown hands
//! the default dispositions back before exiting.
use crate::lifecycle::Coordinator;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

pub struct SignalHandler;

impl SignalHandler {
    /// Register the listeners and spawn the task waiting on them.
    pub fn install(coordinator: Arc<Coordinator>) -> std::io::Result<JoinHandle<()>> {
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sighup = signal(SignalKind::hangup())?;
        let mut sigquit = signal(SignalKind::quit())?;

        Ok(tokio::spawn(async move {
            let name = tokio::select! {
                _ = sigint.recv() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
                _ = sighup.recv() => "SIGHUP",
                _ = sigquit.recv() => "SIGQUIT",
            };
            tracing::info!(signal = name, "received signal");
            coordinator.shutdown();
        }))
    }
}
