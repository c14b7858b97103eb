use crate::error::SyncError;
use crate::resync::{AttemptResult, ResyncAttempt, ResyncLedger};

fn attempt(n: u32, result: AttemptResult) -> ResyncAttempt {
    ResyncAttempt {
        attempt_number: n,
        requested_at: f64::from(n) * 100.0,
        result,
        drift_before: None,
        drift_after: None,
    }
}

#[test]
fn test_history_is_bounded() {
    let mut ledger = ResyncLedger::new(5);
    for n in 1..=8 {
        ledger.record_attempt(attempt(n, AttemptResult::Failed));
    }
    let history = ledger.history();
    assert_eq!(history.len(), 5);
    assert_eq!(history[0].attempt_number, 4);
    assert_eq!(history[4].attempt_number, 8);
}

#[test]
fn test_stats_accumulate() {
    let mut ledger = ResyncLedger::default();
    ledger.record_resync(Some(-0.4));
    ledger.record_resync(None);
    ledger.record_resync(Some(0.2));

    let stats = ledger.stats();
    assert_eq!(stats.total_resyncs, 3);
    assert_eq!(stats.successful_resyncs, 2);
    assert_eq!(stats.failed_resyncs, 1);
    assert!((stats.average_drift - 0.3).abs() < 1e-12);
    assert_eq!(stats.last_drift, Some(0.2));
}

#[test]
fn test_attempt_result_from_error() {
    let timeout = SyncError::Timeout {
        duration: std::time::Duration::from_secs(3),
    };
    assert_eq!(AttemptResult::from_error(&timeout), AttemptResult::Timeout);
    assert_eq!(
        AttemptResult::from_error(&SyncError::malformed("timestamp", "missing")),
        AttemptResult::Failed
    );
}

#[test]
fn test_stats_serialize_camel_case() {
    let mut ledger = ResyncLedger::default();
    ledger.record_resync(Some(1.5));
    let value = serde_json::to_value(ledger.stats()).unwrap();
    assert_eq!(value["totalResyncs"], 1);
    assert_eq!(value["successfulResyncs"], 1);
    assert_eq!(value["lastDrift"], 1.5);
}
