//! Drift sampling and analysis

pub mod analyzer;
pub mod history;
pub mod sampler;


pub use analyzer::{AnalysisContext, DriftAnalysis, DriftAnalyzer, SyncMode};
pub use history::{DriftHistory, DriftSample};
pub use sampler::{DriftMeasurement, DriftSampler, SampleInputs};
