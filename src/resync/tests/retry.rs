use std::cell::Cell;
use std::time::Duration;

use crate::error::SyncError;
use crate::resync::RetryPolicy;
use crate::types::ResyncConfig;

fn transport_error() -> SyncError {
    SyncError::TransportFailure {
        message: "connection reset".to_string(),
        source: None,
    }
}

#[test]
fn test_backoff_doubles_with_jitter() {
    let policy = RetryPolicy::new(3, Duration::from_millis(250), Duration::from_millis(100));
    for _ in 0..20 {
        let first = policy.backoff(1);
        assert!(first >= Duration::from_millis(250) && first <= Duration::from_millis(350));
        let second = policy.backoff(2);
        assert!(second >= Duration::from_millis(500) && second <= Duration::from_millis(600));
        let third = policy.backoff(3);
        assert!(third >= Duration::from_millis(1000) && third <= Duration::from_millis(1100));
    }
}

#[test]
fn test_backoff_without_jitter_is_exact() {
    let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::ZERO);
    assert_eq!(policy.backoff(1), Duration::from_millis(100));
    assert_eq!(policy.backoff(4), Duration::from_millis(800));
}

#[test]
fn test_first_backoff_is_the_configured_base() {
    let config = ResyncConfig {
        backoff_jitter: Duration::ZERO,
        ..ResyncConfig::default()
    };
    let policy = RetryPolicy::from_config(&config);
    assert_eq!(policy.backoff(1), config.backoff_base);
    assert_eq!(policy.backoff(2), config.backoff_base * 2);
    assert_eq!(policy.backoff(3), config.backoff_base * 4);
}

#[test]
fn test_zero_attempts_means_one() {
    let policy = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO);
    assert_eq!(policy.max_attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_until_success() {
    let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::ZERO);
    let mut seen = Vec::new();

    let result = policy
        .retry(
            |attempt| async move {
                if attempt < 2 {
                    Err(transport_error())
                } else {
                    Ok(attempt * 10)
                }
            },
            |info, result| seen.push((info.attempt, info.will_retry, result.is_ok())),
        )
        .await;

    assert_eq!(result.unwrap(), 20);
    assert_eq!(seen, vec![(1, true, false), (2, false, true)]);
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhausts_with_backoff() {
    let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::ZERO);
    let calls = Cell::new(0);
    let start = tokio::time::Instant::now();

    let result: crate::error::Result<()> = policy
        .retry(
            |_| {
                calls.set(calls.get() + 1);
                async { Err(transport_error()) }
            },
            |_, _| {},
        )
        .await;

    assert!(result.is_err());
    assert_eq!(calls.get(), 3);
    // 100ms after the first failure, 200ms after the second, none after the last
    assert_eq!(start.elapsed(), Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_retry_stops_on_unrecoverable_error() {
    let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::ZERO);
    let calls = Cell::new(0);

    let result: crate::error::Result<()> = policy
        .retry(
            |_| {
                calls.set(calls.get() + 1);
                async {
                    Err(SyncError::InvalidParameter {
                        name: "session".to_string(),
                        message: "unknown".to_string(),
                    })
                }
            },
            |info, _| assert!(!info.will_retry),
        )
        .await;

    assert!(matches!(result, Err(SyncError::InvalidParameter { .. })));
    assert_eq!(calls.get(), 1);
}
