use proptest::prelude::*;

use crate::clock::offset::{OffsetEstimator, TimeSample};
use crate::types::OffsetConfig;

fn estimator() -> OffsetEstimator {
    OffsetEstimator::new(&OffsetConfig::default())
}

fn sample(client_sent: f64, server_time: f64, client_received: f64) -> TimeSample {
    TimeSample {
        client_sent,
        server_time,
        server_received: server_time,
        client_received,
    }
}

// ===== TimeSample =====

#[test]
fn test_sample_symmetric_zero_offset() {
    // 20ms round trip, server stamps exactly halfway
    let s = sample(1_000.0, 1_010.0, 1_020.0);
    assert!((s.rtt_ms() - 20.0).abs() < 1e-9);
    assert!(s.offset_ms().abs() < 1e-9);
}

#[test]
fn test_sample_server_ahead() {
    // Server clock 200ms ahead
    let s = sample(1_000.0, 1_210.0, 1_020.0);
    assert!((s.offset_ms() - 200.0).abs() < 1e-9);
}

// ===== Single observations =====

#[test]
fn test_small_offset_applied_directly() {
    let mut est = estimator();
    let accepted = est.observe(30.0).unwrap();
    assert!((accepted - 30.0).abs() < 1e-9);
    assert!(est.is_converging());
    assert!((est.advance() - 30.0).abs() < 1e-9);
    assert!(!est.is_converging());
}

#[test]
fn test_large_offset_smoothed_in_five_steps() {
    let mut est = estimator();
    est.observe(500.0).unwrap();
    assert!(est.offset_ms().abs() < f64::EPSILON);
    let first = est.advance();
    assert!((first - 100.0).abs() < 1e-9);
    assert!(est.is_converging());

    let mut last = first;
    for _ in 0..4 {
        last = est.advance();
    }
    assert!((last - 500.0).abs() < 1e-9);
    assert!(!est.is_converging());

    // Further advances stay put
    assert!((est.advance() - 500.0).abs() < 1e-9);
}

#[test]
fn test_negative_target_smoothed() {
    let mut est = estimator();
    est.observe(-300.0).unwrap();
    assert!((est.advance() + 60.0).abs() < 1e-9);
}

#[test]
fn test_out_of_range_offset_rejected() {
    let mut est = estimator();
    est.observe(20.0).unwrap();
    est.advance();

    let err = est.observe(1_500.0).unwrap_err();
    assert!(err.is_invalid_sample());
    assert!((est.offset_ms() - 20.0).abs() < 1e-9);
    assert_eq!(est.counts(), (1, 1));
}

#[test]
fn test_non_finite_offset_rejected() {
    let mut est = estimator();
    assert!(est.observe(f64::NAN).is_err());
    assert!(est.observe(f64::INFINITY).is_err());
    assert!(est.offset_ms().abs() < f64::EPSILON);
}

#[test]
fn test_negative_rtt_sample_rejected() {
    let mut est = estimator();
    let s = sample(1_020.0, 1_010.0, 1_000.0);
    assert!(est.observe_sample(&s).is_err());
    assert!(est.offset_ms().abs() < f64::EPSILON);
}

// ===== Batches =====

#[test]
fn test_batch_mean_and_jitter() {
    let mut est = estimator();
    let samples = [
        sample(0.0, 30.0, 20.0),  // offset 20
        sample(0.0, 40.0, 20.0),  // offset 30
        sample(0.0, 50.0, 20.0),  // offset 40
    ];

    let batch = est.observe_batch(&samples).unwrap();
    assert!((batch.offset_ms - 30.0).abs() < 1e-9);
    assert!(batch.jitter_ms > 8.0 && batch.jitter_ms < 8.3);
    assert!((batch.rtt_ms - 20.0).abs() < 1e-9);
    assert_eq!(batch.accepted, 3);
    assert_eq!(batch.rejected, 0);
    assert!((est.target_ms() - 30.0).abs() < 1e-9);
    assert!((est.advance() - 30.0).abs() < 1e-9);
}

#[test]
fn test_batch_skips_corrupt_samples() {
    let mut est = estimator();
    let samples = [
        sample(0.0, 30.0, 20.0),
        sample(0.0, 5_000.0, 20.0), // 4990ms offset, corrupt
        sample(0.0, 30.0, 20.0),
        sample(0.0, f64::NAN, 20.0),
        sample(0.0, 30.0, 20.0),
    ];

    let batch = est.observe_batch(&samples).unwrap();
    assert_eq!(batch.accepted, 3);
    assert_eq!(batch.rejected, 2);
    assert!((batch.offset_ms - 20.0).abs() < 1e-9);
}

#[test]
fn test_batch_requires_minimum_samples() {
    let mut est = estimator();
    let samples = [sample(0.0, 30.0, 20.0), sample(0.0, 30.0, 20.0)];
    assert!(est.observe_batch(&samples).is_err());
    assert!(est.offset_ms().abs() < f64::EPSILON);
}

#[test]
fn test_reset() {
    let mut est = estimator();
    est.observe(40.0).unwrap();
    est.advance();
    est.reset();
    assert!(est.offset_ms().abs() < f64::EPSILON);
    assert!(!est.is_converging());
}

#[test]
fn test_observations_between_advances_take_one_step() {
    let mut est = estimator();
    est.observe(500.0).unwrap();
    est.observe(480.0).unwrap();
    est.observe_sample(&sample(0.0, 510.0, 20.0)).unwrap();
    assert!(est.offset_ms().abs() < f64::EPSILON);

    // Last target wins, one step of 500 / 5
    assert!((est.advance() - 100.0).abs() < 1e-9);
    assert!((est.target_ms() - 500.0).abs() < 1e-9);
}

#[test]
fn test_repeated_target_keeps_step() {
    let mut est = estimator();
    est.observe(500.0).unwrap();
    est.advance();
    est.observe(500.0).unwrap();
    assert!((est.advance() - 200.0).abs() < 1e-9);
}

// ===== Properties =====

proptest! {
    #[test]
    fn prop_invalid_offsets_leave_estimate_unchanged(
        start in -900.0f64..900.0,
        raw in prop_oneof![
            1000.001f64..1e9,
            -1e9f64..-1000.001,
            Just(f64::NAN),
            Just(f64::INFINITY),
            Just(f64::NEG_INFINITY),
        ],
    ) {
        let mut est = estimator();
        est.observe(start).unwrap();
        while est.is_converging() {
            est.advance();
        }
        let before = est.offset_ms();
        prop_assert!(est.observe(raw).is_err());
        prop_assert_eq!(est.offset_ms().to_bits(), before.to_bits());
    }

    #[test]
    fn prop_smoothing_step_bounded(start in -1000.0f64..1000.0, target in -1000.0f64..1000.0) {
        let mut est = estimator();
        est.observe(start).unwrap();
        while est.is_converging() {
            est.advance();
        }
        let before = est.offset_ms();
        let diff = target - before;
        prop_assume!(diff.abs() > 50.0);

        let bound = diff.abs() / 5.0 + 1e-9;
        est.observe(target).unwrap();
        prop_assert_eq!(est.offset_ms().to_bits(), before.to_bits());
        for _ in 0..10 {
            let previous = est.offset_ms();
            est.advance();
            prop_assert!((est.offset_ms() - previous).abs() <= bound);
        }
        prop_assert!((est.offset_ms() - target).abs() < 1e-6);
    }
}
