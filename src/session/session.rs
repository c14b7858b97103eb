//! Session owner tying the control loop together
//!
//! A [`SyncSession`] owns every piece of per-session state behind one async
//! mutex. Scheduled ticks only `try_lock` it, so a tick that fires during a
//! resync is skipped rather than queued behind it. Status changes are
//! published on a `watch` channel for the UI.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::watch;

use super::status::{SyncSnapshot, SyncStatus};
use super::transport::{DriftReport, MediaElement, SessionTransport, TimeSource};
use crate::clock::{LocalClock, OffsetEstimator, SystemClock, refresh_offset};
use crate::correction::{CorrectionDecision, CorrectionEngine, CorrectionPhase, NoopReason};
use crate::drift::{
    DriftAnalysis, DriftAnalyzer, DriftMeasurement, DriftSample, DriftSampler, SampleInputs,
    SyncMode,
};
use crate::error::{Result, SyncError};
use crate::network::NetworkQualityMonitor;
use crate::resync::{ResyncAttempt, ResyncContext, ResyncCoordinator, ResyncOutcome};
use crate::runtime::Runtime;
use crate::scheduler::{AdaptiveScheduler, PollTimer};
use crate::types::{CanonicalState, SyncConfig};

/// Result of one sampling pass
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A drift sample was taken and evaluated
    Sampled {
        /// The measurement
        measurement: DriftMeasurement,
        /// What the correction engine did with it
        decision: CorrectionDecision,
        /// Poll interval chosen for the next tick
        interval: Duration,
    },
    /// No usable canonical state; playback is left alone
    Held,
    /// The sample was discarded as invalid
    Rejected(String),
    /// The session was busy (usually a resync)
    Skipped(NoopReason),
}

impl TickOutcome {
    /// The correction decision, when a sample was taken
    #[must_use]
    pub fn decision(&self) -> Option<&CorrectionDecision> {
        match self {
            Self::Sampled { decision, .. } => Some(decision),
            _ => None,
        }
    }

    /// The measured drift, when a sample was taken
    #[must_use]
    pub fn drift(&self) -> Option<f64> {
        match self {
            Self::Sampled { measurement, .. } => Some(measurement.drift),
            _ => None,
        }
    }
}

/// Mutable per-session state
struct SessionCore {
    offset: OffsetEstimator,
    sampler: DriftSampler,
    analyzer: DriftAnalyzer,
    network: NetworkQualityMonitor,
    scheduler: AdaptiveScheduler,
    engine: CorrectionEngine,
    resync: ResyncCoordinator,
    /// Last canonical state that passed validation
    last_state: Option<CanonicalState>,
    /// Local time the last state was accepted (ms)
    state_received_at: Option<f64>,
    /// Track the history belongs to
    track_id: Option<String>,
    /// Local time of the last offset refresh (ms)
    last_offset_refresh: Option<f64>,
    last_analysis: Option<DriftAnalysis>,
    last_drift: Option<f64>,
    status: SyncStatus,
}

struct SessionInner {
    session_id: String,
    client_id: String,
    config: SyncConfig,
    transport: Arc<dyn SessionTransport>,
    time_source: Option<Arc<dyn TimeSource>>,
    clock: Arc<dyn LocalClock>,
    media: Arc<dyn MediaElement>,
    core: tokio::sync::Mutex<SessionCore>,
    timer: Mutex<Option<PollTimer>>,
    /// Set from the moment a resync is requested until it returns
    resync_in_flight: AtomicBool,
    status_tx: watch::Sender<SyncSnapshot>,
}

/// Clears the resync flag when the resync ends, however it ends
struct ResyncFlight<'a>(&'a AtomicBool);

impl<'a> ResyncFlight<'a> {
    fn claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ResyncFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Playback sync for one media element in one shared session
///
/// Cloning yields another handle to the same session.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use playsync::SyncSession;
/// use playsync::testing::{MockMediaElement, MockTransport};
///
/// # async fn example() -> Result<(), playsync::SyncError> {
/// let transport = Arc::new(MockTransport::new());
/// let media = Arc::new(MockMediaElement::new(0.0, true));
///
/// let session = SyncSession::builder("session-1", transport.clone(), media)
///     .client_id("kitchen")
///     .time_source(transport)
///     .build()?;
///
/// let mut status = session.subscribe();
/// session.start().await;
/// status.changed().await.ok();
/// println!("{}", status.borrow().status);
///
/// session.stop().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SyncSession {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("session_id", &self.inner.session_id)
            .field("client_id", &self.inner.client_id)
            .field("has_time_source", &self.inner.time_source.is_some())
            .finish_non_exhaustive()
    }
}

impl SyncSession {
    /// Start building a session
    #[must_use]
    pub fn builder(
        session_id: impl Into<String>,
        transport: Arc<dyn SessionTransport>,
        media: Arc<dyn MediaElement>,
    ) -> SyncSessionBuilder {
        SyncSessionBuilder::new(session_id, transport, media)
    }

    /// Session identifier
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Reporting client identifier
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    // === Lifecycle ===

    /// Start the poll timer
    ///
    /// The first tick fires one poll interval later. Starting a running
    /// session is a no-op.
    pub async fn start(&self) {
        let interval = {
            let mut core = self.inner.core.lock().await;
            if matches!(core.status, SyncStatus::Idle | SyncStatus::Stopped) {
                core.status = SyncStatus::WaitingForState;
            }
            self.inner.publish(&core);
            core.scheduler.current()
        };

        let mut timer = lock(&self.inner.timer);
        if timer.as_ref().is_some_and(PollTimer::is_running) {
            return;
        }
        *timer = Some(self.spawn_timer(interval));
        tracing::info!(
            session_id = %self.inner.session_id,
            interval_ms = interval.as_millis(),
            "Session: started"
        );
    }

    /// Stop the timer and return playback to the neutral rate
    ///
    /// Any correction in flight is cancelled. The session can be started
    /// again later.
    pub async fn stop(&self) {
        let timer = lock(&self.inner.timer).take();
        if let Some(timer) = timer {
            timer.stop();
        }

        let mut core = self.inner.core.lock().await;
        core.engine.reset();
        core.status = SyncStatus::Stopped;
        self.inner.publish(&core);
        tracing::info!(session_id = %self.inner.session_id, "Session: stopped");
    }

    /// Whether the poll timer is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.inner.timer)
            .as_ref()
            .is_some_and(PollTimer::is_running)
    }

    fn spawn_timer(&self, interval: Duration) -> PollTimer {
        let weak: Weak<SessionInner> = Arc::downgrade(&self.inner);
        PollTimer::start(interval, move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.tick().await;
                }
            }
        })
    }

    // === Sampling ===

    /// Poll the session and evaluate drift once
    ///
    /// This is what the poll timer runs. Calling it directly is useful when
    /// the host drives sampling itself.
    pub async fn tick(&self) -> TickOutcome {
        self.inner.tick().await
    }

    /// Handle a proactive `sync_state` push
    ///
    /// The state replaces the last known one and is sampled immediately.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::MalformedState` when the payload fails validation;
    /// the previous state is kept.
    pub async fn on_sync_state(&self, payload: &Value) -> Result<TickOutcome> {
        let state = CanonicalState::from_payload(payload).inspect_err(|e| {
            tracing::warn!(error = %e, "Session: discarding pushed state");
        })?;

        let mut guard = self.inner.core.lock().await;
        let core = &mut *guard;
        self.inner.accept_state(core, state, None)?;
        if core.status == SyncStatus::Stopped {
            return Ok(TickOutcome::Held);
        }
        if core.offset.is_converging() {
            core.offset.advance();
        }
        let now = self.inner.clock.now_ms();
        Ok(self.inner.sample(core, now))
    }

    // === Resync ===

    /// Force an immediate resync with the session
    ///
    /// Ticks that fire meanwhile are skipped, and so is a second resync
    /// requested before this one returns.
    pub async fn resync(&self) -> ResyncOutcome {
        let inner = &*self.inner;
        let Some(_flight) = ResyncFlight::claim(&inner.resync_in_flight) else {
            tracing::debug!("Session: resync already in flight");
            return ResyncOutcome::Skipped(NoopReason::InProgress);
        };
        let mut guard = inner.core.lock().await;
        let core = &mut *guard;

        let previous = core.status;
        core.status = SyncStatus::Resyncing;
        inner.publish(core);

        let outcome = core
            .resync
            .resync(ResyncContext {
                session_id: &inner.session_id,
                transport: inner.transport.as_ref(),
                time_source: inner.time_source.as_deref(),
                clock: inner.clock.as_ref(),
                media: inner.media.as_ref(),
                engine: &mut core.engine,
                offset: &mut core.offset,
                offset_config: &inner.config.offset,
                network: &mut core.network,
                sampler: &core.sampler,
                last_state: core.last_state.as_ref(),
                request_timeout: inner.config.network.probe_timeout,
            })
            .await;

        let status = match &outcome {
            ResyncOutcome::Synced { state, .. } => {
                if let Err(e) = inner.accept_state(core, state.clone(), None) {
                    tracing::debug!(error = %e, "Session: resync state not kept");
                }
                SyncStatus::InSync
            }
            ResyncOutcome::Failed { .. } => SyncStatus::ResyncFailed,
            ResyncOutcome::Skipped(_) => previous,
        };
        core.status = status;
        inner.publish(core);
        outcome
    }

    /// Attempts of the most recent resyncs, oldest first
    pub async fn resync_history(&self) -> Vec<ResyncAttempt> {
        self.inner.core.lock().await.resync.ledger().history()
    }

    /// Drift samples of the current track, oldest first
    pub async fn drift_history(&self) -> Vec<DriftSample> {
        self.inner
            .core
            .lock()
            .await
            .analyzer
            .history()
            .iter()
            .copied()
            .collect()
    }

    // === Track changes ===

    /// Track the drift history belongs to
    pub async fn track_id(&self) -> Option<String> {
        self.inner.core.lock().await.track_id.clone()
    }

    /// Switch to another track
    ///
    /// Drift history, RTT history and correction state are dropped; the
    /// clock offset is kept. A running poll timer is replaced by a fresh one.
    pub async fn change_track(&self, track_id: Option<String>) {
        let interval = {
            let mut guard = self.inner.core.lock().await;
            let core = &mut *guard;
            self.inner.reset_for_track(core, track_id);
            if core.status != SyncStatus::Stopped {
                core.status = SyncStatus::WaitingForState;
            }
            self.inner.publish(core);
            core.scheduler.current()
        };

        let mut timer = lock(&self.inner.timer);
        if let Some(old) = timer.take() {
            let was_running = old.is_running();
            old.stop();
            if was_running {
                *timer = Some(self.spawn_timer(interval));
            }
        }
    }

    // === Status ===

    /// Receive every status change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.inner.status_tx.subscribe()
    }

    /// Latest published status
    #[must_use]
    pub fn snapshot(&self) -> SyncSnapshot {
        self.inner.status_tx.borrow().clone()
    }
}

impl SessionInner {
    async fn tick(&self) -> TickOutcome {
        let Ok(mut guard) = self.core.try_lock() else {
            tracing::debug!("Session: tick skipped, session busy");
            return TickOutcome::Skipped(NoopReason::InProgress);
        };
        let core = &mut *guard;
        if core.status == SyncStatus::Stopped {
            return TickOutcome::Held;
        }

        self.refresh_offset_if_due(core).await;
        self.poll_state(core).await;
        if core.offset.is_converging() {
            core.offset.advance();
        }

        let now = self.clock.now_ms();
        let max_age_ms = self.config.drift.state_max_age.as_secs_f64() * 1000.0;
        let fresh = core.last_state.is_some()
            && core
                .state_received_at
                .is_some_and(|at| now - at <= max_age_ms);
        if !fresh {
            core.status = SyncStatus::WaitingForState;
            self.publish(core);
            return TickOutcome::Held;
        }

        self.sample(core, now)
    }

    async fn refresh_offset_if_due(&self, core: &mut SessionCore) {
        let Some(source) = self.time_source.as_deref() else {
            return;
        };
        let now = self.clock.now_ms();
        let refresh_ms = self.config.offset.refresh_interval.as_secs_f64() * 1000.0;
        if core
            .last_offset_refresh
            .is_some_and(|at| now - at < refresh_ms)
        {
            return;
        }
        core.last_offset_refresh = Some(now);

        if let Err(e) = refresh_offset(
            source,
            self.clock.as_ref(),
            &mut core.offset,
            &self.config.offset,
            self.config.network.probe_timeout,
            Some(&mut core.network),
        )
        .await
        {
            tracing::warn!(error = %e, "Session: offset refresh failed, keeping current offset");
        }
    }

    async fn poll_state(&self, core: &mut SessionCore) {
        let sent = self.clock.now_ms();
        let reply = Runtime::timeout(
            self.config.network.probe_timeout,
            self.transport.sync_request(&self.session_id),
        )
        .await;
        let rtt = self.clock.now_ms() - sent;

        match reply {
            Ok(Ok(payload)) => {
                if let Err(e) = core.network.record_rtt(rtt) {
                    tracing::debug!(error = %e, "Session: ignoring poll round trip");
                }
                let Some(payload) = payload else {
                    tracing::debug!("Session: poll answered without a state");
                    return;
                };
                let accepted = CanonicalState::from_payload(&payload)
                    .and_then(|state| self.accept_state(core, state, Some(rtt)));
                if let Err(e) = accepted {
                    tracing::warn!(error = %e, "Session: discarding polled state");
                }
            }
            Ok(Err(e)) | Err(e) => {
                core.network.record_loss();
                tracing::debug!(error = %e, "Session: poll failed");
            }
        }
    }

    /// Adopt a validated state, detecting track changes
    fn accept_state(
        &self,
        core: &mut SessionCore,
        state: CanonicalState,
        rtt_ms: Option<f64>,
    ) -> Result<()> {
        let now = self.clock.now_ms();
        state
            .check_not_future(now + core.offset.offset_ms(), core.offset.max_offset_ms())
            .map_err(|e| SyncError::malformed("lastUpdated", e.to_string()))?;

        if let Some(server_time) = state.server_time {
            let rtt = rtt_ms.or_else(|| core.network.latest_rtt()).unwrap_or(0.0);
            // Rejections are logged by the estimator
            let _ = core.offset.observe(server_time + rtt / 2.0 - now);
        }

        if !state.is_for_track(core.track_id.as_deref()) {
            self.reset_for_track(core, state.track_id.clone());
        } else if core.track_id.is_none() {
            core.track_id.clone_from(&state.track_id);
        }

        core.last_state = Some(state);
        core.state_received_at = Some(now);
        Ok(())
    }

    fn reset_for_track(&self, core: &mut SessionCore, track_id: Option<String>) {
        tracing::info!(
            from = ?core.track_id,
            to = ?track_id,
            "Session: track changed"
        );
        core.analyzer.clear();
        core.network.reset();
        core.engine.reset();
        core.scheduler = AdaptiveScheduler::new(&self.config.scheduler);
        core.last_state = None;
        core.state_received_at = None;
        core.last_analysis = None;
        core.last_drift = None;
        core.track_id = track_id;
    }

    fn sample(&self, core: &mut SessionCore, now: f64) -> TickOutcome {
        let Some(state) = core.last_state.as_ref() else {
            return TickOutcome::Held;
        };
        let inputs = SampleInputs {
            state,
            local_position: self.media.position(),
            now_ms: now,
            offset_secs: core.offset.offset_secs(),
            rtt_ms: core.network.latest_rtt(),
        };
        let measurement = match core.sampler.measure(&inputs) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "Session: discarding drift sample");
                return TickOutcome::Rejected(e.to_string());
            }
        };

        let magnitude = measurement.drift.abs();
        core.engine.record_observation(magnitude);

        let stability = core.network.stability();
        core.analyzer.record(DriftSample {
            drift: measurement.drift,
            observed_at: now,
            network_quality: stability,
            correction_count: core.engine.correction_count(),
        });
        let analysis = core
            .analyzer
            .analyze(&core.engine.analysis_context(stability));
        let decision = core.engine.evaluate(
            measurement.drift,
            measurement.expected,
            &analysis,
            now,
        );

        let interval =
            core.scheduler
                .next_interval(stability, analysis.sync_quality, analysis.variance);
        if let Some(timer) = lock(&self.timer).as_ref() {
            timer.reschedule(interval);
        }

        tracing::debug!(
            drift = measurement.drift,
            expected = measurement.expected,
            threshold = analysis.adaptive_threshold,
            mode = %analysis.sync_mode,
            quality = analysis.sync_quality,
            interval_ms = interval.as_millis(),
            "Session: sampled"
        );

        self.report(&measurement, &analysis, &decision, stability, now);

        core.last_drift = Some(measurement.drift);
        core.last_analysis = Some(analysis);
        let status = self.status_after(core, magnitude, analysis.adaptive_threshold);
        core.status = status;
        self.publish(core);

        TickOutcome::Sampled {
            measurement,
            decision,
            interval,
        }
    }

    fn status_after(&self, core: &SessionCore, magnitude: f64, threshold: f64) -> SyncStatus {
        if !self.media.is_playing() {
            return SyncStatus::Paused;
        }
        match core.engine.phase() {
            CorrectionPhase::EmergencySeeking { .. } => SyncStatus::Seeking,
            CorrectionPhase::Resyncing => SyncStatus::Resyncing,
            phase if phase.in_progress() || phase.rate_correction_active() => {
                SyncStatus::Correcting
            }
            _ if magnitude <= threshold => SyncStatus::InSync,
            _ => SyncStatus::DriftDetected,
        }
    }

    /// Fire-and-forget drift telemetry
    fn report(
        &self,
        measurement: &DriftMeasurement,
        analysis: &DriftAnalysis,
        decision: &CorrectionDecision,
        stability: f64,
        now: f64,
    ) {
        let report = DriftReport {
            session_id: self.session_id.clone(),
            drift: measurement.drift,
            expected: measurement.expected,
            current: measurement.current,
            client_id: self.client_id.clone(),
            timestamp: now,
            extra: json!({
                "trend": analysis.trend,
                "velocity": analysis.velocity,
                "variance": analysis.variance,
                "predictedDrift": analysis.predicted_drift,
                "adaptiveThreshold": analysis.adaptive_threshold,
                "syncQuality": analysis.sync_quality,
                "syncMode": analysis.sync_mode,
                "networkStability": stability,
                "tier": decision.tier().map(|t| t.to_string()),
                "skipped": decision.noop_reason().map(|r| r.to_string()),
            }),
        };
        let transport = Arc::clone(&self.transport);
        Runtime::spawn(async move {
            if let Err(e) = transport.drift_report(report).await {
                tracing::debug!(error = %e, "Session: drift report dropped");
            }
        });
    }

    fn publish(&self, core: &SessionCore) {
        let snapshot = SyncSnapshot {
            status: core.status,
            correction_in_progress: core.engine.in_progress(),
            rate_correction_active: core.engine.rate_correction_active(),
            resync_in_progress: core.status == SyncStatus::Resyncing
                || core.engine.resync_in_progress(),
            sync_quality: core.last_analysis.map_or(1.0, |a| a.sync_quality),
            sync_mode: core.last_analysis.map_or(SyncMode::Normal, |a| a.sync_mode),
            network_stability: core.network.stability(),
            last_drift: core.last_drift,
            offset_ms: core.offset.offset_ms(),
            poll_interval: core.scheduler.current(),
            stats: core.resync.stats(),
        };
        self.status_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

/// Builder for [`SyncSession`]
pub struct SyncSessionBuilder {
    session_id: String,
    client_id: String,
    config: SyncConfig,
    transport: Arc<dyn SessionTransport>,
    media: Arc<dyn MediaElement>,
    time_source: Option<Arc<dyn TimeSource>>,
    clock: Arc<dyn LocalClock>,
}

impl SyncSessionBuilder {
    /// Create a builder with the default configuration and system clock
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        transport: Arc<dyn SessionTransport>,
        media: Arc<dyn MediaElement>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            client_id: "client".to_string(),
            config: SyncConfig::default(),
            transport,
            media,
            time_source: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Set the identifier used in drift reports
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Set the configuration
    #[must_use]
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a high-precision time source for offset estimation
    #[must_use]
    pub fn time_source(mut self, source: Arc<dyn TimeSource>) -> Self {
        self.time_source = Some(source);
        self
    }

    /// Replace the local clock
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn LocalClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the session
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidParameter` if the configuration is inconsistent.
    pub fn build(self) -> Result<SyncSession> {
        self.config.validate()?;
        let config = self.config;

        let core = SessionCore {
            offset: OffsetEstimator::new(&config.offset),
            sampler: DriftSampler::new(&config.drift, self.media.output_latency()),
            analyzer: DriftAnalyzer::new(config.drift.history_capacity),
            network: NetworkQualityMonitor::new(&config.network),
            scheduler: AdaptiveScheduler::new(&config.scheduler),
            engine: CorrectionEngine::new(config.correction.clone(), Arc::clone(&self.media)),
            resync: ResyncCoordinator::new(&config.resync),
            last_state: None,
            state_received_at: None,
            track_id: None,
            last_offset_refresh: None,
            last_analysis: None,
            last_drift: None,
            status: SyncStatus::Idle,
        };

        let (status_tx, _) = watch::channel(SyncSnapshot {
            poll_interval: core.scheduler.current(),
            ..SyncSnapshot::default()
        });

        Ok(SyncSession {
            inner: Arc::new(SessionInner {
                session_id: self.session_id,
                client_id: self.client_id,
                config,
                transport: self.transport,
                time_source: self.time_source,
                clock: self.clock,
                media: self.media,
                core: tokio::sync::Mutex::new(core),
                timer: Mutex::new(None),
                resync_in_flight: AtomicBool::new(false),
                status_tx,
            }),
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
