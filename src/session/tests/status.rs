use std::time::Duration;

use crate::session::{SyncSnapshot, SyncStatus};

#[test]
fn test_status_labels() {
    assert_eq!(SyncStatus::Idle.to_string(), "Not started");
    assert_eq!(SyncStatus::InSync.to_string(), "In sync");
    assert_eq!(SyncStatus::Resyncing.label(), "Resyncing");
    assert_eq!(SyncStatus::ResyncFailed.label(), "Resync failed");
}

#[test]
fn test_snapshot_serializes_for_ui() {
    let snapshot = SyncSnapshot {
        status: SyncStatus::Correcting,
        rate_correction_active: true,
        poll_interval: Duration::from_millis(1500),
        ..SyncSnapshot::default()
    };

    let value = serde_json::to_value(&snapshot).unwrap();

    assert_eq!(value["status"], "correcting");
    assert_eq!(value["rateCorrectionActive"], true);
    assert_eq!(value["resyncInProgress"], false);
    assert_eq!(value["pollInterval"], 1500);
    assert_eq!(value["syncMode"], "normal");
    assert_eq!(value["stats"]["totalResyncs"], 0);
}
