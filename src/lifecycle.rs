//! Lifecycle coordinator: helper-task registry plus the single shutdown path.
//!
//! Shutdown can be triggered from a signal, from the death watcher, or from
//! the foreground input loop. An atomic state transition makes the first
//! caller run the teardown and every later caller return immediately.
use nix::sys::signal::{self, SigHandler, Signal};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Role of a registered background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HelperRole {
    OutputFollower,
    DeathWatcher,
}

/// Teardown order for registered helpers.
const TEARDOWN_ORDER: [HelperRole; 2] = [HelperRole::OutputFollower, HelperRole::DeathWatcher];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LifecycleState {
    Idle = 0,
    Running = 1,
    ShuttingDown = 2,
    Terminated = 3,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LifecycleState::Idle,
            1 => LifecycleState::Running,
            2 => LifecycleState::ShuttingDown,
            _ => LifecycleState::Terminated,
        }
    }
}

/// OS-level effects of the final teardown. Every step is best-effort.
pub trait Teardown: Send + Sync {
    fn restore_terminal(&self);
    fn restore_signals(&self);
    fn terminate_process_group(&self);
    fn exit(&self, code: i32);
}

/// Signals the tool takes over while running and hands back on exit.
pub(crate) const HANDLED_SIGNALS: [Signal; 4] = [
    Signal::SIGINT,
    Signal::SIGTERM,
    Signal::SIGHUP,
    Signal::SIGQUIT,
];

/// Teardown acting on the real process.
pub struct ProcessTeardown;

impl Teardown for ProcessTeardown {
    fn restore_terminal(&self) {
        if let Err(e) = crossterm::terminal::disable_raw_mode() {
            tracing::debug!(error = %e, "failed to leave raw mode");
        }
    }

    fn restore_signals(&self) {
        for sig in HANDLED_SIGNALS {
            // SAFETY: installs the default disposition, no handler code runs.
            if let Err(e) = unsafe { signal::signal(sig, SigHandler::SigDfl) } {
                tracing::debug!(signal = ?sig, error = %e, "failed to restore signal disposition");
            }
        }
    }

    fn terminate_process_group(&self) {
        let pgrp = nix::unistd::getpgrp();
        if pgrp != nix::unistd::getpid() {
            tracing::debug!(%pgrp, "not the process group leader, skipping group kill");
            return;
        }
        // SAFETY: ignoring a signal installs no handler code. Keeps the group
        // SIGTERM from overriding our own exit status.
        if let Err(e) = unsafe { signal::signal(Signal::SIGTERM, SigHandler::SigIgn) } {
            tracing::debug!(error = %e, "failed to ignore SIGTERM");
        }
        if let Err(e) = signal::killpg(pgrp, Signal::SIGTERM) {
            tracing::debug!(%pgrp, error = %e, "failed to signal process group");
        }
    }

    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}

pub struct Coordinator {
    state: AtomicU8,
    helpers: Mutex<HashMap<HelperRole, JoinHandle<()>>>,
    teardown: Arc<dyn Teardown>,
    terminated: Notify,
}

impl Coordinator {
    pub fn new(teardown: Arc<dyn Teardown>) -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Idle as u8),
            helpers: Mutex::new(HashMap::new()),
            teardown,
            terminated: Notify::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Idle → Running, once the player has been launched or attached to.
    pub fn mark_running(&self) {
        let _ = self.state.compare_exchange(
            LifecycleState::Idle as u8,
            LifecycleState::Running as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Track a spawned helper so shutdown can terminate it.
    ///
    /// A helper registered after shutdown began is aborted on the spot.
    pub fn register(&self, role: HelperRole, handle: JoinHandle<()>) {
        if self.state() >= LifecycleState::ShuttingDown {
            handle.abort();
            return;
        }
        let mut helpers = self.helpers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = helpers.insert(role, handle) {
            previous.abort();
        }
    }

    #[cfg(test)]
    pub fn is_registered(&self, role: HelperRole) -> bool {
        self.helpers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&role)
    }

    /// Tear everything down and exit 0.
    ///
    /// Returns false without doing anything if another caller already
    /// started the shutdown.
    pub fn shutdown(&self) -> bool {
        let entered = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |s| {
                (s < LifecycleState::ShuttingDown as u8)
                    .then_some(LifecycleState::ShuttingDown as u8)
            })
            .is_ok();
        if !entered {
            tracing::debug!("shutdown already in progress");
            return false;
        }

        tracing::info!("shutting down");
        {
            let mut helpers = self.helpers.lock().unwrap_or_else(|e| e.into_inner());
            for role in TEARDOWN_ORDER {
                if let Some(handle) = helpers.remove(&role) {
                    tracing::debug!(?role, "terminating helper");
                    handle.abort();
                }
            }
        }

        self.teardown.restore_terminal();
        self.teardown.restore_signals();
        self.teardown.terminate_process_group();
        self.state
            .store(LifecycleState::Terminated as u8, Ordering::SeqCst);
        self.terminated.notify_waiters();
        self.teardown.exit(0);
        true
    }

    /// Resolve once the teardown has run, whoever triggered it.
    pub async fn terminated(&self) {
        loop {
            let notified = self.terminated.notified();
            if self.state() == LifecycleState::Terminated {
                return;
            }
            notified.await;
        }
    }
}
