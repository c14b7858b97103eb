//! In-memory media element

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::session::MediaElement;

#[derive(Debug)]
struct MediaState {
    position: f64,
    playing: bool,
    rate: f64,
    rate_history: Vec<f64>,
    seeks: Vec<f64>,
    output_latency: Option<Duration>,
}

/// Media element double recording every rate change and seek
///
/// The position only moves when a test sets it, seeks, or calls
/// [`MockMediaElement::advance`].
#[derive(Debug)]
pub struct MockMediaElement {
    state: Mutex<MediaState>,
}

impl MockMediaElement {
    /// Create an element at `position` (seconds)
    #[must_use]
    pub fn new(position: f64, playing: bool) -> Self {
        Self {
            state: Mutex::new(MediaState {
                position,
                playing,
                rate: 1.0,
                rate_history: Vec::new(),
                seeks: Vec::new(),
                output_latency: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MediaState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the position without recording a seek
    pub fn set_position(&self, position: f64) {
        self.state().position = position;
    }

    /// Start or pause playback
    pub fn set_playing(&self, playing: bool) {
        self.state().playing = playing;
    }

    /// Report a device output latency
    pub fn set_output_latency(&self, latency: Option<Duration>) {
        self.state().output_latency = latency;
    }

    /// Play for `elapsed` at the current rate
    pub fn advance(&self, elapsed: Duration) {
        let mut state = self.state();
        if state.playing {
            state.position += elapsed.as_secs_f64() * state.rate;
        }
    }

    /// Every rate written, in order
    #[must_use]
    pub fn rate_history(&self) -> Vec<f64> {
        self.state().rate_history.clone()
    }

    /// Every seek target, in order
    #[must_use]
    pub fn seeks(&self) -> Vec<f64> {
        self.state().seeks.clone()
    }

    /// Most recent seek target
    #[must_use]
    pub fn last_seek(&self) -> Option<f64> {
        self.state().seeks.last().copied()
    }
}

impl MediaElement for MockMediaElement {
    fn position(&self) -> f64 {
        self.state().position
    }

    fn is_playing(&self) -> bool {
        self.state().playing
    }

    fn playback_rate(&self) -> f64 {
        self.state().rate
    }

    fn set_playback_rate(&self, rate: f64) {
        let mut state = self.state();
        state.rate = rate;
        state.rate_history.push(rate);
    }

    fn seek(&self, position: f64) {
        let mut state = self.state();
        state.position = position;
        state.seeks.push(position);
    }

    fn output_latency(&self) -> Option<Duration> {
        self.state().output_latency
    }
}
