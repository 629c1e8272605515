//! Pitch detection using the YIN algorithm.
//!
//! de Cheveigné & Kawahara (2002):
//!
//! 1. **Difference function** - d(τ) = Σ(x[j] - x[j+τ])²
//! 2. **Cumulative mean normalized difference** - d'(τ)
//! 3. **Absolute threshold** - first τ where d'(τ) < tolerance, walked to its local minimum
//! 4. **Parabolic interpolation** - sub-sample accuracy
//!
//! The result is reported in MIDI-note units; confidence is `1 − d'(τ)`.
//! Direct computation is O(W²/4) per hop, fine for the window sizes used here.

use crate::engine::PitchEngine;
use crate::window::HopBuffer;

/// Tolerance used when none is configured.
pub const DEFAULT_TOLERANCE: f32 = 0.15;

/// Smallest lag examined, in samples.
const MIN_PERIOD: usize = 2;

/// Convert a frequency to a fractional MIDI note (A4 = 440 Hz = 69).
///
/// # Example
/// ```
/// use stm_audio::yin::hz_to_midi;
/// assert!((hz_to_midi(440.0) - 69.0).abs() < 1e-4);
/// assert!((hz_to_midi(261.63) - 60.0).abs() < 0.01);
/// ```
#[inline]
#[must_use]
pub fn hz_to_midi(frequency: f32) -> f32 {
    69.0 + 12.0 * (frequency / 440.0).log2()
}

/// YIN pitch detector over a sliding window.
pub struct YinPitch {
    sample_rate: f32,
    hop_size: usize,
    tolerance: f32,
    frames: HopBuffer,
    // Pre-allocated buffers
    difference: Vec<f32>,
    cumulative_mean: Vec<f32>,
    note: f32,
    confidence: f32,
}

impl YinPitch {
    /// Analyse `window_size` samples every `hop_size` samples.
    ///
    /// `tolerance` is clamped to (0, 1]; `None` uses [`DEFAULT_TOLERANCE`].
    #[must_use]
    pub fn new(window_size: usize, hop_size: usize, sample_rate: u32, tolerance: Option<f32>) -> Self {
        let half = window_size / 2;
        Self {
            sample_rate: sample_rate as f32,
            hop_size: hop_size.clamp(1, window_size.max(1)),
            tolerance: tolerance.unwrap_or(DEFAULT_TOLERANCE).clamp(0.01, 1.0),
            frames: HopBuffer::new(window_size),
            difference: vec![0.0; half],
            cumulative_mean: vec![1.0; half],
            note: 0.0,
            confidence: 0.0,
        }
    }

    /// Current threshold on d'(τ).
    #[must_use]
    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    fn analyze(&mut self, hop: &[f32]) {
        let x = self.frames.push(hop);
        let half = self.difference.len();
        if half <= MIN_PERIOD + 1 {
            self.note = 0.0;
            self.confidence = 0.0;
            return;
        }

        self.difference[0] = 0.0;
        for tau in 1..half {
            self.difference[tau] = (0..half)
                .map(|j| {
                    let d = x[j] - x[j + tau];
                    d * d
                })
                .sum();
        }

        self.cumulative_mean[0] = 1.0;
        let mut running_sum = 0.0f32;
        for tau in 1..half {
            running_sum += self.difference[tau];
            self.cumulative_mean[tau] = if running_sum > 1e-10 {
                self.difference[tau] * tau as f32 / running_sum
            } else {
                1.0
            };
        }

        let d = &self.cumulative_mean;
        let mut period = None;
        let mut tau = MIN_PERIOD;
        while tau < half {
            if d[tau] < self.tolerance {
                while tau + 1 < half && d[tau + 1] < d[tau] {
                    tau += 1;
                }
                period = Some(tau);
                break;
            }
            tau += 1;
        }

        match period {
            Some(tau) => {
                self.confidence = (1.0 - d[tau]).clamp(0.0, 1.0);
                let refined = parabolic_interpolation(d, tau);
                self.note = hz_to_midi(self.sample_rate / refined);
            }
            None => {
                let floor = d[MIN_PERIOD..].iter().copied().fold(1.0f32, f32::min);
                self.confidence = (1.0 - floor).clamp(0.0, 1.0);
                self.note = 0.0;
            }
        }
    }
}

/// Fit a parabola through `d[tau-1..=tau+1]` and return the abscissa of its minimum.
fn parabolic_interpolation(d: &[f32], tau: usize) -> f32 {
    if tau == 0 || tau + 1 >= d.len() {
        return tau as f32;
    }
    let (s0, s1, s2) = (d[tau - 1], d[tau], d[tau + 1]);
    let denom = 2.0 * (2.0 * s1 - s2 - s0);
    if denom.abs() < f32::EPSILON {
        tau as f32
    } else {
        tau as f32 + (s2 - s0) / denom
    }
}

impl PitchEngine for YinPitch {
    fn detect(&mut self, window: &[f32]) -> f32 {
        let hop = self.hop_size;
        for chunk in window.chunks(hop) {
            self.analyze(chunk);
        }
        self.note
    }

    fn confidence(&self) -> f32 {
        self.confidence
    }
}
