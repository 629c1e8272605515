use stm_core::config::{RmsSettings, SoundcardSettings};
use stm_core::encode::MidiEncoder;
use stm_core::policy::{PeakDecay, RunningMax};
use stm_core::traits::{FeatureExtractor, MidiSink};
use stm_core::CoreError;

use crate::window::AnalysisWindow;

/// Root mean square of `samples`, 0 for an empty slice.
///
/// # Example
/// ```
/// use stm_audio::extract::rms;
/// assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
/// ```
#[inline]
#[must_use]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Loudness relative to the loudest window heard so far.
///
/// No external DSP: the window's RMS is divided by a running maximum that
/// never resets, scaled to 0-127 and held up by a peak-decay floor. A value
/// goes out when it changes, and again at every new peak.
pub struct RmsExtractor {
    window: AnalysisWindow,
    running_max: RunningMax,
    decay: PeakDecay,
    last: u8,
    encoder: MidiEncoder,
}

impl RmsExtractor {
    /// Build from settings.
    #[must_use]
    pub fn new(settings: &RmsSettings, soundcard: &SoundcardSettings) -> Self {
        Self {
            window: AnalysisWindow::new(soundcard.frame_size, settings.window.frame_multiplier),
            running_max: RunningMax::default(),
            decay: PeakDecay::new(settings.decay),
            last: 0,
            encoder: MidiEncoder::new(settings.controller, settings.sysex.clone()),
        }
    }

    /// Last value sent.
    #[must_use]
    pub fn last_value(&self) -> u8 {
        self.last
    }
}

impl FeatureExtractor for RmsExtractor {
    fn add_frame(&mut self, frame: &[f32], sink: &mut dyn MidiSink) -> Result<(), CoreError> {
        let Some(window) = self.window.add_frame(frame)? else {
            return Ok(());
        };
        let level = rms(window);
        let new_peak = self.running_max.observe(level);
        if self.running_max.get() <= 0.0 {
            return Ok(());
        }

        let scaled = (127.0 * self.running_max.normalize(level)).round().clamp(0.0, 127.0) as u8;
        let value = self.decay.floor_scaled(scaled, self.last);
        if new_peak || value != self.last {
            log::trace!("rms : {value}");
            self.encoder.send(sink, value, &[value]);
            self.last = value;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "rms"
    }
}
