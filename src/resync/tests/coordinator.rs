use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use crate::clock::{ManualClock, OffsetEstimator};
use crate::correction::{CorrectionEngine, CorrectionPhase, NoopReason};
use crate::drift::DriftSampler;
use crate::network::NetworkQualityMonitor;
use crate::resync::{AttemptResult, ResyncContext, ResyncCoordinator, ResyncOutcome};
use crate::testing::{MockMediaElement, MockReply, MockTransport};
use crate::types::{
    CanonicalState, CorrectionConfig, DriftConfig, NetworkConfig, OffsetConfig, ResyncConfig,
};

struct Fixture {
    transport: MockTransport,
    clock: ManualClock,
    media: Arc<MockMediaElement>,
    engine: CorrectionEngine,
    offset: OffsetEstimator,
    offset_config: OffsetConfig,
    network: NetworkQualityMonitor,
    sampler: DriftSampler,
    last_state: Option<CanonicalState>,
    use_time_source: bool,
}

impl Fixture {
    fn new() -> Self {
        let media = Arc::new(MockMediaElement::new(11.0, true));
        Self {
            transport: MockTransport::new(),
            clock: ManualClock::new(3_000.0),
            engine: CorrectionEngine::new(CorrectionConfig::default(), media.clone()),
            media,
            offset: OffsetEstimator::new(&OffsetConfig::default()),
            offset_config: OffsetConfig::default(),
            network: NetworkQualityMonitor::new(&NetworkConfig::default()),
            sampler: DriftSampler::new(&DriftConfig::default(), Some(Duration::ZERO)),
            last_state: None,
            use_time_source: true,
        }
    }

    fn ctx(&mut self) -> ResyncContext<'_> {
        ResyncContext {
            session_id: "session-1",
            transport: &self.transport,
            time_source: if self.use_time_source {
                Some(&self.transport)
            } else {
                None
            },
            clock: &self.clock,
            media: self.media.as_ref(),
            engine: &mut self.engine,
            offset: &mut self.offset,
            offset_config: &self.offset_config,
            network: &mut self.network,
            sampler: &self.sampler,
            last_state: self.last_state.as_ref(),
            request_timeout: Duration::from_secs(3),
        }
    }
}

/// Position 10s recorded at server time 1000ms
fn state_payload() -> Value {
    json!({"isPlaying": true, "timestamp": 10.0, "lastUpdated": 1000.0, "trackId": "t1"})
}

fn coordinator() -> ResyncCoordinator {
    ResyncCoordinator::new(&ResyncConfig::default())
}

#[tokio::test(start_paused = true)]
async fn test_resync_seeks_to_expected_position() {
    let mut fx = Fixture::new();
    fx.transport.push_reply(MockReply::State(state_payload()));
    let mut coordinator = coordinator();

    let outcome = coordinator.resync(fx.ctx()).await;

    let ResyncOutcome::Synced {
        expected,
        drift,
        attempts,
        state,
    } = outcome
    else {
        panic!("expected success, got {outcome:?}");
    };
    // 10s + 2s elapsed, no latency, no offset
    assert!((expected - 12.0).abs() < 1e-9);
    assert!((drift + 1.0).abs() < 1e-9);
    assert_eq!(attempts, 1);
    assert_eq!(state.track_id.as_deref(), Some("t1"));
    assert_eq!(fx.media.last_seek(), Some(expected));

    assert_eq!(fx.engine.phase(), CorrectionPhase::Idle);
    assert_eq!(fx.transport.time_syncs(), 5);

    let history = coordinator.ledger().history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].result, AttemptResult::Success);
    assert!(history[0].drift_after.unwrap().abs() < 1e-9);

    let stats = coordinator.stats();
    assert_eq!(stats.successful_resyncs, 1);
    assert!((stats.average_drift - 1.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_resync_applies_refreshed_offset() {
    let mut fx = Fixture::new();
    fx.transport = MockTransport::new().with_server_offset(40.0);
    fx.transport.push_reply(MockReply::State(state_payload()));
    let mut coordinator = coordinator();

    let outcome = coordinator.resync(fx.ctx()).await;
    let ResyncOutcome::Synced { expected, .. } = outcome else {
        panic!("expected success");
    };
    assert!((fx.offset.offset_ms() - 40.0).abs() < 1e-9);
    assert!((expected - 12.04).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_resync_takes_one_offset_step() {
    let mut fx = Fixture::new();
    fx.transport = MockTransport::new().with_server_offset(500.0);
    fx.transport.push_reply(MockReply::State(state_payload()));
    let mut coordinator = coordinator();

    let outcome = coordinator.resync(fx.ctx()).await;
    assert!(outcome.is_success());
    // 500ms target, five steps
    assert!((fx.offset.offset_ms() - 100.0).abs() < 1e-9);
    assert!((fx.offset.target_ms() - 500.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_resync_retries_transient_failure() {
    let mut fx = Fixture::new();
    fx.transport.push_reply(MockReply::Fail);
    fx.transport.push_reply(MockReply::State(state_payload()));
    let mut coordinator = coordinator();

    let outcome = coordinator.resync(fx.ctx()).await;
    assert!(outcome.is_success());

    let results: Vec<_> = coordinator.ledger().attempts().map(|a| a.result).collect();
    assert_eq!(results, vec![AttemptResult::Failed, AttemptResult::Success]);
    assert_eq!(fx.transport.sync_requests(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_resync_gives_up_after_malformed_states() {
    let mut fx = Fixture::new();
    fx.transport.push_replies(
        &MockReply::State(json!({"isPlaying": true, "lastUpdated": 1000.0})),
        5,
    );
    let mut coordinator = coordinator();

    let outcome = coordinator.resync(fx.ctx()).await;

    let ResyncOutcome::Failed {
        attempts,
        fallback_applied,
        reason,
    } = outcome
    else {
        panic!("expected failure, got {outcome:?}");
    };
    assert_eq!(attempts, 3);
    assert!(!fallback_applied);
    assert!(reason.contains("timestamp"));
    assert!(fx.media.seeks().is_empty());

    let history = coordinator.ledger().history();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|a| a.result == AttemptResult::Failed));
    assert_eq!(coordinator.stats().failed_resyncs, 1);
    assert_eq!(fx.engine.phase(), CorrectionPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_failed_resync_falls_back_to_last_state() {
    let mut fx = Fixture::new();
    fx.transport.push_replies(&MockReply::Fail, 3);
    fx.last_state = Some(CanonicalState::new(true, 20.0, 2_000.0));
    let mut coordinator = coordinator();

    let outcome = coordinator.resync(fx.ctx()).await;

    assert!(matches!(
        outcome,
        ResyncOutcome::Failed {
            fallback_applied: true,
            ..
        }
    ));
    // 20s + 1s since the last known update
    let seek = fx.media.last_seek().unwrap();
    assert!((seek - 21.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_recorded_as_timeout() {
    let mut fx = Fixture::new();
    fx.use_time_source = false;
    fx.transport.push_replies(&MockReply::Hang, 3);
    let mut coordinator = coordinator();

    let outcome = coordinator.resync(fx.ctx()).await;
    assert!(!outcome.is_success());
    assert!(
        coordinator
            .ledger()
            .attempts()
            .all(|a| a.result == AttemptResult::Timeout)
    );
}

#[tokio::test(start_paused = true)]
async fn test_empty_and_future_states_are_retried() {
    let mut fx = Fixture::new();
    fx.transport.push_reply(MockReply::Empty);
    // Two seconds ahead of the local clock
    fx.transport.push_reply(MockReply::State(
        json!({"isPlaying": true, "timestamp": 10.0, "lastUpdated": 5000.0}),
    ));
    fx.transport.push_reply(MockReply::State(state_payload()));
    let mut coordinator = coordinator();

    let outcome = coordinator.resync(fx.ctx()).await;
    assert!(matches!(outcome, ResyncOutcome::Synced { attempts: 3, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_resync_cooldown() {
    let mut fx = Fixture::new();
    fx.transport.set_fallback_state(Some(state_payload()));
    let mut coordinator = coordinator();

    assert!(coordinator.resync(fx.ctx()).await.is_success());

    fx.clock.advance_ms(1000.0);
    let outcome = coordinator.resync(fx.ctx()).await;
    let ResyncOutcome::Skipped(NoopReason::CoolingDown { remaining_ms }) = outcome else {
        panic!("expected cooldown, got {outcome:?}");
    };
    assert!((remaining_ms - 1000.0).abs() < 1e-9);

    fx.clock.advance_ms(1500.0);
    assert!(coordinator.resync(fx.ctx()).await.is_success());
    assert_eq!(coordinator.stats().total_resyncs, 2);
}

#[tokio::test(start_paused = true)]
async fn test_resync_is_single_flight() {
    let mut fx = Fixture::new();
    fx.transport.set_fallback_state(Some(state_payload()));
    assert!(fx.engine.begin_resync());
    let mut coordinator = coordinator();

    let outcome = coordinator.resync(fx.ctx()).await;
    assert_eq!(outcome, ResyncOutcome::Skipped(NoopReason::InProgress));
    assert_eq!(fx.transport.sync_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_resync_without_refresh_skips_time_source() {
    let mut fx = Fixture::new();
    fx.transport.push_reply(MockReply::State(state_payload()));
    let config = ResyncConfig {
        refresh_offset: false,
        ..ResyncConfig::default()
    };
    let mut coordinator = ResyncCoordinator::new(&config);

    assert!(coordinator.resync(fx.ctx()).await.is_success());
    assert_eq!(fx.transport.time_syncs(), 0);
}
