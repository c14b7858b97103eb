//! Bounded drift history

use std::collections::VecDeque;

use serde::Serialize;

/// One drift observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftSample {
    /// Local position minus expected position (seconds)
    pub drift: f64,
    /// Local time of the observation (ms)
    pub observed_at: f64,
    /// Network stability when the sample was taken
    pub network_quality: f64,
    /// Corrections applied so far in this session
    pub correction_count: u64,
}

/// Fixed-capacity ring buffer of drift samples, oldest evicted first
#[derive(Debug, Clone)]
pub struct DriftHistory {
    samples: VecDeque<DriftSample>,
    capacity: usize,
}

impl DriftHistory {
    /// Default capacity
    pub const DEFAULT_CAPACITY: usize = 20;

    /// Create an empty history
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when full
    pub fn push(&mut self, sample: DriftSample) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Number of samples held
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the history is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of samples held
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent sample
    #[must_use]
    pub fn latest(&self) -> Option<&DriftSample> {
        self.samples.back()
    }

    /// Samples from oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &DriftSample> + ExactSizeIterator {
        self.samples.iter()
    }

    /// The newest `n` samples, oldest first
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<DriftSample> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).copied().collect()
    }

    /// Drop every sample
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Default for DriftHistory {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
