//! Timed rate transitions
//!
//! Each applied correction that outlives the call that started it runs as a
//! spawned task paired with a cancellation token. Every write the task makes
//! to the media element happens under the phase lock after re-checking the
//! token, and cancellation also happens under that lock, so a cancelled
//! transition never touches the media element again.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::phase::{CorrectionPhase, SharedPhase, lock};
use super::tier::CorrectionTier;
use crate::session::MediaElement;

/// Neutral playback rate
pub const NEUTRAL_RATE: f64 = 1.0;

/// What a transition task does after it is spawned
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum TransitionPlan {
    /// Rate already applied; restore neutral after `hold`
    Revert {
        /// How long the applied rate stays
        hold: Duration,
    },
    /// Step from neutral to `target`, hold it, then restore neutral
    Ramp {
        /// Rate or extended rate
        tier: CorrectionTier,
        /// Final rate
        target: f64,
        /// Number of equal steps
        steps: u32,
        /// Delay before each step
        step_interval: Duration,
        /// How long the target is held
        hold: Duration,
    },
    /// Seek already issued; return to idle after `settle`
    Settle {
        /// Settle window
        settle: Duration,
    },
}

/// Handle to a running transition task
#[derive(Debug)]
pub struct RateTransition {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl RateTransition {
    /// Spawn the task carrying out `plan`
    pub(crate) fn spawn(
        plan: TransitionPlan,
        media: Arc<dyn MediaElement>,
        shared: SharedPhase,
    ) -> Self {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            run(plan, &*media, &shared, &task_token).await;
        });
        Self { token, handle }
    }

    /// Stop the task; callers hold the phase lock while cancelling
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the task has completed or been cancelled
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.token.is_cancelled() || self.handle.is_finished()
    }
}

/// Sleep unless cancelled first; returns false when cancelled
async fn wait(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        biased;
        () = token.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}

async fn run(
    plan: TransitionPlan,
    media: &dyn MediaElement,
    shared: &SharedPhase,
    token: &CancellationToken,
) {
    match plan {
        TransitionPlan::Revert { hold } => {
            if !wait(token, hold).await {
                return;
            }
            finish(media, shared, token, true);
        }
        TransitionPlan::Ramp {
            tier,
            target,
            steps,
            step_interval,
            hold,
        } => {
            let steps = steps.max(1);
            for step in 1..=steps {
                if !wait(token, step_interval).await {
                    return;
                }
                let rate =
                    NEUTRAL_RATE + (target - NEUTRAL_RATE) * f64::from(step) / f64::from(steps);
                let mut cell = lock(shared);
                if token.is_cancelled() {
                    return;
                }
                media.set_playback_rate(rate);
                cell.phase = CorrectionPhase::rate_phase(tier, rate, step < steps);
                tracing::trace!(%tier, step, rate, "Correction: ramp step");
            }
            if !wait(token, hold).await {
                return;
            }
            finish(media, shared, token, true);
        }
        TransitionPlan::Settle { settle } => {
            if !wait(token, settle).await {
                return;
            }
            finish(media, shared, token, false);
        }
    }
}

/// Return to idle unless cancelled in the meantime
fn finish(media: &dyn MediaElement, shared: &SharedPhase, token: &CancellationToken, restore: bool) {
    let mut cell = lock(shared);
    if token.is_cancelled() {
        return;
    }
    if restore {
        media.set_playback_rate(NEUTRAL_RATE);
    }
    tracing::debug!(phase = cell.phase.label(), "Correction: finished");
    cell.phase = CorrectionPhase::Idle;
}
