//! Runs an initial pass, then one pass per interval until cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace};

use super::PassRunner;

/// Interval used when the configured one is below one minute.
pub const DEFAULT_INTERVAL_MINUTES: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running { initial: bool },
    Waiting,
    Cancelled,
}

/// Clamp a configured interval in minutes; values below 1 use the default.
pub fn effective_interval(minutes: i64) -> Duration {
    let minutes = u64::try_from(minutes)
        .ok()
        .filter(|m| *m >= 1)
        .unwrap_or(DEFAULT_INTERVAL_MINUTES);
    Duration::from_secs(minutes.saturating_mul(60))
}

pub struct Scheduler<P: PassRunner + ?Sized> {
    runner: Arc<P>,
    interval: Duration,
    state: watch::Sender<SchedulerState>,
}

impl<P: PassRunner + ?Sized> Scheduler<P> {
    pub fn new(runner: Arc<P>, interval: Duration) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            runner,
            interval,
            state,
        }
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SchedulerState) {
        trace!(?state, "Scheduler state changed");
        self.state.send_replace(state);
    }

    /// Loop until `cancel` fires.
    ///
    /// Cancellation is only observed between passes: a running pass always
    /// completes, only the wait before the next one is interrupted.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(interval = ?self.interval, "Scheduler started");
        let mut initial = true;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.set_state(SchedulerState::Running { initial });
            if let Err(e) = self.runner.run_pass().await {
                error!(error = ?e, initial, "Sync pass failed");
            }
            initial = false;

            self.set_state(SchedulerState::Waiting);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        self.set_state(SchedulerState::Cancelled);
        info!("Scheduler stopped");
    }
}
