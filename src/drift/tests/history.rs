use super::sample;
use crate::drift::history::DriftHistory;

#[test]
fn test_history_evicts_oldest() {
    let mut history = DriftHistory::new(3);
    for i in 0..5 {
        history.push(sample(f64::from(i), f64::from(i) * 1000.0));
    }

    assert_eq!(history.len(), 3);
    let drifts: Vec<f64> = history.iter().map(|s| s.drift).collect();
    assert_eq!(drifts, vec![2.0, 3.0, 4.0]);
    assert!((history.latest().unwrap().drift - 4.0).abs() < f64::EPSILON);
}

#[test]
fn test_history_default_capacity() {
    let mut history = DriftHistory::default();
    assert_eq!(history.capacity(), 20);
    for i in 0..50 {
        history.push(sample(0.0, f64::from(i)));
    }
    assert_eq!(history.len(), 20);
}

#[test]
fn test_history_recent() {
    let mut history = DriftHistory::new(10);
    for i in 0..4 {
        history.push(sample(f64::from(i), 0.0));
    }

    let recent: Vec<f64> = history.recent(2).iter().map(|s| s.drift).collect();
    assert_eq!(recent, vec![2.0, 3.0]);
    assert_eq!(history.recent(10).len(), 4);
}

#[test]
fn test_history_clear() {
    let mut history = DriftHistory::new(4);
    history.push(sample(0.1, 0.0));
    history.clear();
    assert!(history.is_empty());
    assert!(history.latest().is_none());
}

#[test]
fn test_history_zero_capacity_clamped() {
    let mut history = DriftHistory::new(0);
    history.push(sample(0.1, 0.0));
    history.push(sample(0.2, 0.0));
    assert_eq!(history.len(), 1);
}
