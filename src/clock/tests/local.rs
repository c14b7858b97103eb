use std::time::Duration;

use crate::clock::local::{LocalClock, ManualClock, SystemClock};

#[test]
fn test_manual_clock_starts_at_given_time() {
    let clock = ManualClock::new(1_000.0);
    assert!((clock.now_ms() - 1_000.0).abs() < f64::EPSILON);
}

#[test]
fn test_manual_clock_advance() {
    let clock = ManualClock::new(0.0);
    clock.advance(Duration::from_millis(1500));
    assert!((clock.now_ms() - 1500.0).abs() < 1e-9);

    clock.advance_ms(250.0);
    assert!((clock.now_ms() - 1750.0).abs() < 1e-9);
}

#[test]
fn test_manual_clock_clones_share_time() {
    let clock = ManualClock::new(0.0);
    let other = clock.clone();
    clock.set(42.0);
    assert!((other.now_ms() - 42.0).abs() < f64::EPSILON);
}

#[test]
fn test_system_clock_is_epoch_millis() {
    let now = SystemClock.now_ms();
    // 2020-01-01 in epoch milliseconds
    assert!(now > 1_577_836_800_000.0);
}
