use stm_core::config::{BeatSettings, SoundcardSettings};
use stm_core::encode::MidiEncoder;
use stm_core::midi::clamp_7bit;
use stm_core::policy::CyclicSequence;
use stm_core::traits::{FeatureExtractor, MidiSink};
use stm_core::CoreError;

use crate::engine::TempoEngine;
use crate::tempo::TempoTracker;
use crate::window::AnalysisWindow;

/// Beat onsets, one step of a repeating sequence per onset.
///
/// The control value is the sequence position, the sysex data the value
/// found at that position.
pub struct BeatExtractor<E = TempoTracker> {
    window: AnalysisWindow,
    engine: E,
    sequence: CyclicSequence,
    encoder: MidiEncoder,
}

impl BeatExtractor<TempoTracker> {
    /// Build with the default tempo tracker as onset detector.
    #[must_use]
    pub fn new(settings: &BeatSettings, soundcard: &SoundcardSettings) -> Self {
        let frame_size = soundcard.frame_size;
        let engine = TempoTracker::new(
            settings.algorithm,
            settings.window.window_size(frame_size),
            settings.window.hop_size(frame_size),
            soundcard.sample_rate,
        );
        Self::with_engine(engine, settings, frame_size)
    }
}

impl<E: TempoEngine> BeatExtractor<E> {
    /// Build around any tempo engine.
    #[must_use]
    pub fn with_engine(engine: E, settings: &BeatSettings, frame_size: usize) -> Self {
        Self {
            window: AnalysisWindow::new(frame_size, settings.window.frame_multiplier),
            engine,
            sequence: CyclicSequence::new(&settings.sequence),
            encoder: MidiEncoder::new(settings.controller, settings.sysex.clone()),
        }
    }

    /// Position the next beat will report.
    #[must_use]
    pub fn position(&self) -> usize {
        self.sequence.position()
    }
}

impl<E: TempoEngine> FeatureExtractor for BeatExtractor<E> {
    fn add_frame(&mut self, frame: &[f32], sink: &mut dyn MidiSink) -> Result<(), CoreError> {
        let Some(window) = self.window.add_frame(frame)? else {
            return Ok(());
        };
        if self.engine.detect(window).is_beat {
            let (position, value) = self.sequence.advance();
            log::trace!("beat : position {position}, valeur {value}");
            self.encoder.send(sink, clamp_7bit(position as i64), &[value]);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "beats"
    }
}
