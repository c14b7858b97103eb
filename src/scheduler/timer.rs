//! Cancellable repeating poll timer
//!
//! One spawned task per timer. The interval lives in a `watch` channel so
//! that rescheduling restarts the pending sleep with the new period, and a
//! [`CancellationToken`] stops the loop, including mid-tick.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Repeating timer driving drift sampling
#[derive(Debug)]
pub struct PollTimer {
    interval_tx: watch::Sender<Duration>,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollTimer {
    /// Spawn a timer calling `tick` every `interval`
    ///
    /// The first tick fires one interval after start. Must be called from
    /// within a tokio runtime.
    pub fn start<F, Fut>(interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (interval_tx, mut interval_rx) = watch::channel(interval);
        let token = CancellationToken::new();
        let loop_token = token.clone();

        let handle = tokio::spawn(async move {
            loop {
                let period = *interval_rx.borrow_and_update();
                tokio::select! {
                    biased;
                    () = loop_token.cancelled() => break,
                    changed = interval_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    () = tokio::time::sleep(period) => {
                        tokio::select! {
                            biased;
                            () = loop_token.cancelled() => break,
                            () = tick() => {}
                        }
                    }
                }
            }
            tracing::debug!("Poll timer stopped");
        });

        Self {
            interval_tx,
            token,
            handle,
        }
    }

    /// Current period
    #[must_use]
    pub fn interval(&self) -> Duration {
        *self.interval_tx.borrow()
    }

    /// Change the period, restarting the pending wait
    ///
    /// Setting the period it already has is a no-op.
    pub fn reschedule(&self, interval: Duration) {
        self.interval_tx.send_if_modified(|current| {
            if *current == interval {
                false
            } else {
                *current = interval;
                true
            }
        });
    }

    /// Stop the timer; an in-flight tick is abandoned at its next await
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Whether the timer task is still alive
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for PollTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
