use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use crate::clock::{ManualClock, OffsetEstimator, probe_once, refresh_offset};
use crate::network::NetworkQualityMonitor;
use crate::testing::{MockTransport, NetworkSimulator};
use crate::types::{NetworkConfig, OffsetConfig};

fn fast_batch() -> OffsetConfig {
    OffsetConfig {
        batch_spacing: Duration::ZERO,
        ..OffsetConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_probe_once_measures_offset() {
    let clock = ManualClock::new(10_000.0);
    let source = MockTransport::new().with_server_offset(120.0);

    let sample = assert_ok!(probe_once(&source, &clock, Duration::from_secs(3)).await);
    assert!((sample.offset_ms() - 120.0).abs() < 1e-9);
    assert!(sample.rtt_ms().abs() < f64::EPSILON);
}

#[tokio::test(start_paused = true)]
async fn test_probe_times_out_on_loss() {
    let clock = ManualClock::new(0.0);
    let mut sim = NetworkSimulator::perfect();
    sim.loss_rate = 1.0;
    let source = MockTransport::new().with_simulator(sim);

    let err = assert_err!(probe_once(&source, &clock, Duration::from_millis(500)).await);
    assert!(err.is_recoverable());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_moves_estimator_and_feeds_network() {
    let clock = ManualClock::new(5_000.0);
    let source = MockTransport::new().with_server_offset(30.0);
    let mut estimator = OffsetEstimator::new(&OffsetConfig::default());
    let mut network = NetworkQualityMonitor::new(&NetworkConfig::default());

    let batch = assert_ok!(
        refresh_offset(
            &source,
            &clock,
            &mut estimator,
            &fast_batch(),
            Duration::from_secs(3),
            Some(&mut network),
        )
        .await
    );

    assert_eq!(batch.accepted, 5);
    assert!((batch.offset_ms - 30.0).abs() < 1e-9);
    // Targeted only; within the smoothing threshold, so one step applies it
    assert!(estimator.offset_ms().abs() < f64::EPSILON);
    assert!((estimator.advance() - 30.0).abs() < 1e-9);
    assert_eq!(network.snapshot().rtt_history.len(), 5);
    assert_eq!(source.time_syncs(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_fails_when_all_probes_lost() {
    let clock = ManualClock::new(0.0);
    let mut sim = NetworkSimulator::perfect();
    sim.loss_rate = 1.0;
    let source = MockTransport::new().with_simulator(sim);
    let mut estimator = OffsetEstimator::new(&OffsetConfig::default());
    let mut network = NetworkQualityMonitor::new(&NetworkConfig::default());

    let result = refresh_offset(
        &source,
        &clock,
        &mut estimator,
        &fast_batch(),
        Duration::from_millis(100),
        Some(&mut network),
    )
    .await;

    assert!(result.unwrap_err().is_invalid_sample());
    assert!(estimator.offset_ms().abs() < f64::EPSILON);
    assert_eq!(network.loss_streak(), 5);
}
