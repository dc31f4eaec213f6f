//! Batch mode: forward command-line keys to the player and exit.
use crate::channel::{CommandSink, ControlChannel};
use crate::config::Bindings;
use crate::error::FatalError;
use crate::player::{LaunchOutcome, Monitor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every key was handed to the channel.
    Sent { launched: bool, count: usize },
    /// The player is down and the first key may not start it.
    NotRunning,
}

/// Forward `keys` in order.
///
/// A stopped player is only started when the first key is the play or
/// toggle-pause shortcut. Otherwise nothing happens.
pub async fn run(
    monitor: &Monitor,
    channel: &ControlChannel,
    sink: &dyn CommandSink,
    bindings: &Bindings,
    keys: &[String],
) -> Result<BatchOutcome, FatalError> {
    let may_launch = keys.first().is_some_and(|k| bindings.is_shortcut(k));
    if !may_launch && !monitor.is_running().await {
        return Ok(BatchOutcome::NotRunning);
    }

    let launched = matches!(
        monitor.launch_if_absent(channel).await?,
        LaunchOutcome::Launched { .. }
    );

    for key in keys {
        tracing::debug!(key = %key, "sending batch key");
        if let Err(e) = sink.send(key.as_bytes()) {
            tracing::warn!(key = %key, error = %e, "failed to send key");
        }
    }

    Ok(BatchOutcome::Sent {
        launched,
        count: keys.len(),
    })
}
