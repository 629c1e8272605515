use std::collections::VecDeque;

use stm_core::config::OnsetMethod;

use crate::engine::{TempoEngine, TempoReading};
use crate::fft::PhaseVocoder;
use crate::onset::OnsetDetector;

/// Inter-onset intervals kept for the BPM estimate.
const MAX_INTERVALS: usize = 16;
/// Intervals needed before a BPM is reported.
const MIN_INTERVALS: usize = 4;
/// Accepted inter-onset interval range in seconds (240 down to 30 BPM).
const INTERVAL_RANGE: (f32, f32) = (0.25, 2.0);

/// Beat and tempo tracker: phase vocoder, onset detection, interval averaging.
///
/// Each call walks the window hop by hop. A beat is reported when any hop of
/// the window holds an onset; the BPM is `60 / mean inter-onset interval`
/// over the last few accepted intervals, 0 until enough were seen.
///
/// # Example
/// ```
/// use stm_audio::tempo::TempoTracker;
/// use stm_audio::engine::TempoEngine;
/// use stm_core::config::OnsetMethod;
/// let mut tracker = TempoTracker::new(OnsetMethod::Hfc, 512, 256, 44_100);
/// let reading = tracker.detect(&[0.0; 512]);
/// assert!(!reading.is_beat);
/// ```
pub struct TempoTracker {
    vocoder: PhaseVocoder,
    onsets: OnsetDetector,
    seconds_per_hop: f32,
    last_onset_hop: Option<u64>,
    /// Onset interval accumulator for BPM estimation (VecDeque for O(1) pop_front).
    intervals: VecDeque<f32>,
    bpm: f32,
}

impl TempoTracker {
    /// Create a tracker analysing `window_size` samples every `hop_size` samples.
    #[must_use]
    pub fn new(method: OnsetMethod, window_size: usize, hop_size: usize, sample_rate: u32) -> Self {
        let vocoder = PhaseVocoder::new(window_size, hop_size);
        let hop = vocoder.hop_size();
        Self {
            onsets: OnsetDetector::new(method, hop, sample_rate),
            seconds_per_hop: hop as f32 / sample_rate.max(1) as f32,
            vocoder,
            last_onset_hop: None,
            intervals: VecDeque::with_capacity(MAX_INTERVALS + 1),
            bpm: 0.0,
        }
    }

    /// Current BPM estimate.
    #[must_use]
    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    fn record_onset(&mut self) {
        let hop = self.onsets.hop_count();
        if let Some(last) = self.last_onset_hop.replace(hop) {
            let interval = (hop - last) as f32 * self.seconds_per_hop;
            if (INTERVAL_RANGE.0..=INTERVAL_RANGE.1).contains(&interval) {
                self.intervals.push_back(interval);
                if self.intervals.len() > MAX_INTERVALS {
                    self.intervals.pop_front();
                }
            }
        }
        if self.intervals.len() >= MIN_INTERVALS {
            let mean = self.intervals.iter().sum::<f32>() / self.intervals.len() as f32;
            self.bpm = 60.0 / mean;
        }
    }
}

impl TempoEngine for TempoTracker {
    fn detect(&mut self, window: &[f32]) -> TempoReading {
        let mut is_beat = false;
        let hop = self.vocoder.hop_size();
        for chunk in window.chunks(hop) {
            let spectrum = self.vocoder.analyze(chunk);
            if self.onsets.process(spectrum) {
                is_beat = true;
                self.record_onset();
            }
        }
        TempoReading {
            is_beat,
            bpm: self.bpm,
        }
    }
}
