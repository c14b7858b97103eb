//! End-to-end checks of the documented drift scenarios

use std::sync::Arc;
use std::time::Duration;

use playsync::correction::{AppliedCorrection, SeekUrgency};
use playsync::drift::DriftSample;
use playsync::resync::AttemptResult;
use playsync::testing::{MockMediaElement, MockReply, MockTransport};
use playsync::types::DriftConfig;
use playsync::{
    AdaptiveScheduler, CanonicalState, CorrectionDecision, CorrectionEngine, CorrectionProfile,
    CorrectionTier, DriftAnalysis, DriftAnalyzer, DriftSampler, ManualClock, NoopReason,
    ResyncOutcome, SyncConfig, SyncMode, SyncSession,
};

const T: f64 = 1_000_000.0;

fn sampler() -> DriftSampler {
    let config = DriftConfig {
        compensate_one_way_delay: false,
        ..DriftConfig::default()
    };
    DriftSampler::new(&config, Some(Duration::ZERO))
}

fn analyze(engine: &CorrectionEngine, drifts: &[f64], stability: f64) -> DriftAnalysis {
    let mut analyzer = DriftAnalyzer::new(20);
    for (i, drift) in drifts.iter().enumerate() {
        analyzer.record(DriftSample {
            drift: *drift,
            observed_at: T + 1000.0 * i as f64,
            network_quality: stability,
            correction_count: 0,
        });
    }
    analyzer.analyze(&engine.analysis_context(stability))
}

/// Scenario A: 10.0s at T, sampled at T+2000ms with 12.05s playing locally
#[tokio::test(start_paused = true)]
async fn test_scenario_a_small_drift() {
    let state = CanonicalState::new(true, 10.0, T);
    let expected = sampler()
        .expected_position(&state, T + 2000.0, 0.0, None)
        .unwrap();
    assert!((expected - 12.0).abs() < 1e-9);
    let drift = 12.05 - expected;
    assert!((drift - 0.05).abs() < 1e-9);

    // Conservative profile: 0.05s is inside the dead band
    let media = Arc::new(MockMediaElement::new(12.05, true));
    let mut engine = CorrectionEngine::new(SyncConfig::default().correction, media.clone());
    let analysis = analyze(&engine, &[drift], 1.0);
    assert_eq!(
        engine.evaluate(drift, expected, &analysis, T),
        CorrectionDecision::Skipped(NoopReason::WithinThreshold)
    );
    assert!(media.rate_history().is_empty());

    // Responsive profile: above threshold and above the micro tier, so rate tier
    let config = SyncConfig::builder()
        .profile(CorrectionProfile::Responsive)
        .build();
    let mut engine = CorrectionEngine::new(config.correction, media.clone());
    let analysis = analyze(&engine, &[drift], 1.0);
    match engine.evaluate(drift, expected, &analysis, T) {
        CorrectionDecision::Applied(AppliedCorrection {
            tier, rate, seek_target, ..
        }) => {
            assert_eq!(tier, CorrectionTier::Rate);
            assert!(rate.unwrap() < 1.0, "ahead of the session must slow down");
            assert_eq!(seek_target, None);
        }
        other => panic!("expected a rate correction, got {other:?}"),
    }
}

/// Scenario B: 6s of drift seeks at once, twice in a row if needed
#[tokio::test(start_paused = true)]
async fn test_scenario_b_large_gap_seeks_immediately() {
    let media = Arc::new(MockMediaElement::new(18.0, true));
    let mut engine = CorrectionEngine::new(SyncConfig::default().correction, media.clone());
    let analysis = analyze(&engine, &[6.0], 1.0);

    match engine.evaluate(6.0, 12.0, &analysis, T) {
        CorrectionDecision::Applied(applied) => {
            assert_eq!(applied.tier, CorrectionTier::EmergencySeek);
            assert_eq!(applied.urgency, Some(SeekUrgency::LargeGap));
            assert_eq!(applied.seek_target, Some(12.0));
        }
        other => panic!("expected a seek, got {other:?}"),
    }
    assert_eq!(media.seeks(), vec![12.0]);

    // Let the settle window pass; the next large gap ignores both cooldowns
    tokio::time::sleep(Duration::from_millis(600)).await;
    media.set_position(20.0);
    let decision = engine.evaluate(6.0, 14.0, &analysis, T + 600.0);
    assert!(decision.is_applied());
    assert_eq!(media.seeks(), vec![12.0, 14.0]);
}

/// Scenario C: malformed state on every attempt exhausts the retry budget
#[tokio::test(start_paused = true)]
async fn test_scenario_c_malformed_resync_fails() {
    let transport = Arc::new(MockTransport::new());
    let malformed = serde_json::json!({"isPlaying": true, "lastUpdated": T});
    transport.push_replies(&MockReply::State(malformed), 5);
    let media = Arc::new(MockMediaElement::new(5.0, true));

    let session = SyncSession::builder("session-c", transport.clone(), media.clone())
        .clock(Arc::new(ManualClock::new(T)))
        .build()
        .unwrap();

    let outcome = session.resync().await;

    assert!(matches!(
        outcome,
        ResyncOutcome::Failed {
            attempts: 3,
            fallback_applied: false,
            ..
        }
    ));
    let history = session.resync_history().await;
    assert_eq!(history.len(), 3);
    assert!(
        history
            .iter()
            .all(|attempt| attempt.result == AttemptResult::Failed)
    );
    assert_eq!(transport.sync_requests(), 3);
    assert!(media.seeks().is_empty());
    assert_eq!(session.snapshot().stats.failed_resyncs, 1);
}

/// Scenario D: a degrading network tightens polling
#[tokio::test(start_paused = true)]
async fn test_scenario_d_unstable_network_polls_faster() {
    let config = SyncConfig::default();
    let scheduler = AdaptiveScheduler::new(&config.scheduler);
    let media = Arc::new(MockMediaElement::new(0.0, true));
    let engine = CorrectionEngine::new(config.correction.clone(), media);

    let steady = [0.01; 6];
    let good = analyze(&engine, &steady, 0.9);
    let bad = analyze(&engine, &steady, 0.3);

    let good_interval = scheduler.compute(0.9, good.sync_quality, good.variance);
    let bad_interval = scheduler.compute(0.3, bad.sync_quality, bad.variance);
    assert!(bad_interval < good_interval);

    assert_eq!(good.sync_mode, SyncMode::Conservative);
    assert_eq!(bad.sync_mode, SyncMode::Normal);
}
