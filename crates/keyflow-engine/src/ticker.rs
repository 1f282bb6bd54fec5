//! Periodic tick task with cancellation, driving the scheduler.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Bound on how long `shutdown` waits for the task to exit.
pub const STOP_WAIT_TIMEOUT_MS: u64 = 500;

/// A running tick task.
struct TickerEntry {
    /// Cancels the task.
    token: CancellationToken,
    /// Task handle.
    handle: JoinHandle<()>,
}

/// Runs a closure after an initial delay and then on each interval tick.
/// Missed ticks are skipped, never bunched up.
#[derive(Default)]
pub struct Ticker {
    /// Current task, if started.
    entry: Mutex<Option<TickerEntry>>,
}

impl Ticker {
    /// An idle ticker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a tick task is running.
    pub fn is_active(&self) -> bool {
        self.entry.lock().is_some()
    }

    /// Start or replace the tick task. Must be called inside a tokio runtime.
    pub fn start<F>(&self, initial: Duration, interval: Duration, mut on_tick: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.stop();

        let token = CancellationToken::new();
        let cancel = token.clone();
        let fut = async move {
            trace!(
                init_ms = initial.as_millis(),
                int_ms = interval.as_millis(),
                "ticker_start"
            );
            tokio::select! {
                _ = time::sleep(initial) => {}
                _ = cancel.cancelled() => {
                    trace!("ticker_cancelled_initial");
                    return;
                }
            }

            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        trace!("ticker_cancelled");
                        return;
                    }
                    _ = ticker.tick() => on_tick(),
                }
            }
        };

        let handle = tokio::spawn(fut);
        *self.entry.lock() = Some(TickerEntry { token, handle });
    }

    /// Cancel the tick task if present (non-blocking).
    pub fn stop(&self) {
        if let Some(entry) = self.entry.lock().take() {
            entry.token.cancel();
            trace!("ticker_stop");
        }
    }

    /// Cancel the tick task and wait briefly for it to exit.
    pub async fn shutdown(&self) {
        let entry = self.entry.lock().take();
        if let Some(entry) = entry {
            entry.token.cancel();
            time::timeout(Duration::from_millis(STOP_WAIT_TIMEOUT_MS), entry.handle)
                .await
                .ok();
            trace!("ticker_shutdown");
        }
    }
}
