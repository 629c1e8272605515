use stm_core::config::{SoundcardSettings, TempoSettings};
use stm_core::encode::{BpmEncoding, MidiEncoder};
use stm_core::policy::{ModeVote, RollingMean};
use stm_core::traits::{FeatureExtractor, MidiSink};
use stm_core::CoreError;

use crate::engine::TempoEngine;
use crate::tempo::TempoTracker;
use crate::window::AnalysisWindow;

/// Lowest BPM after octave correction.
pub const MIN_BPM: f32 = 60.0;
/// Highest BPM after octave correction (60 + 127).
pub const MAX_BPM: f32 = 187.0;

/// Bring a raw BPM into [60, 187]: double once if too slow, halve once if too fast.
///
/// # Example
/// ```
/// use stm_audio::extract::correct_octave;
/// assert_eq!(correct_octave(40.0), 80.0);
/// assert_eq!(correct_octave(375.0), 187.0);
/// assert_eq!(correct_octave(20.0), 60.0);
/// ```
#[must_use]
pub fn correct_octave(raw_bpm: f32) -> f32 {
    let bpm = if raw_bpm.is_finite() { raw_bpm } else { 0.0 };
    if bpm < MIN_BPM {
        (bpm * 2.0).max(MIN_BPM)
    } else if bpm > MAX_BPM {
        (bpm / 2.0).min(MAX_BPM)
    } else {
        bpm
    }
}

/// Tempo in BPM, stabilised by a rolling mean and a mode vote.
///
/// The vote runs over BPM tenths held as integers so equality is exact.
pub struct TempoExtractor<E = TempoTracker> {
    window: AnalysisWindow,
    engine: E,
    average: RollingMean,
    vote: ModeVote<u32>,
    encoder: MidiEncoder,
    control_encoding: BpmEncoding,
    sysex_encoding: BpmEncoding,
}

impl TempoExtractor<TempoTracker> {
    /// Build with the default tempo tracker.
    #[must_use]
    pub fn new(settings: &TempoSettings, soundcard: &SoundcardSettings) -> Self {
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

impl<E: TempoEngine> TempoExtractor<E> {
    /// Build around any tempo engine.
    #[must_use]
    pub fn with_engine(engine: E, settings: &TempoSettings, frame_size: usize) -> Self {
        Self {
            window: AnalysisWindow::new(frame_size, settings.window.frame_multiplier),
            engine,
            average: RollingMean::new(settings.average),
            vote: ModeVote::new(settings.count),
            encoder: MidiEncoder::new(settings.controller, settings.sysex.clone()),
            control_encoding: settings.control_encoding,
            sysex_encoding: settings.sysex_encoding,
        }
    }

    /// Last BPM sent, if any.
    #[must_use]
    pub fn last_bpm(&self) -> Option<f32> {
        self.vote.last().map(|tenths| tenths as f32 / 10.0)
    }
}

impl<E: TempoEngine> FeatureExtractor for TempoExtractor<E> {
    fn add_frame(&mut self, frame: &[f32], sink: &mut dyn MidiSink) -> Result<(), CoreError> {
        let Some(window) = self.window.add_frame(frame)? else {
            return Ok(());
        };
        let reading = self.engine.detect(window);
        let bpm = correct_octave(reading.bpm);
        let mean = self.average.push(bpm);
        let tenths = (mean * 10.0).round() as u32;

        if let Some(selected) = self.vote.push(tenths) {
            let bpm = selected as f32 / 10.0;
            log::trace!("tempo : {bpm} BPM");
            let control = self.control_encoding.encode(bpm);
            if let Some(&value) = control.first() {
                self.encoder.send_control(sink, value);
            }
            self.encoder.send_sysex(sink, &self.sysex_encoding.encode(bpm));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tempo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TempoReading;
    use stm_core::traits::RecordingSink;

    struct Scripted(Vec<f32>);

    impl TempoEngine for Scripted {
        fn detect(&mut self, _window: &[f32]) -> TempoReading {
            TempoReading {
                is_beat: false,
                bpm: if self.0.is_empty() { 0.0 } else { self.0.remove(0) },
            }
        }
    }

    fn extractor(bpms: &[f32], settings: &TempoSettings) -> TempoExtractor<Scripted> {
        TempoExtractor::with_engine(Scripted(bpms.to_vec()), settings, 4)
    }

    #[test]
    fn octave_correction_edges() {
        assert_eq!(correct_octave(59.9), 119.8);
        assert_eq!(correct_octave(60.0), 60.0);
        assert_eq!(correct_octave(187.0), 187.0);
        assert_eq!(correct_octave(200.0), 100.0);
        assert_eq!(correct_octave(f32::NAN), 60.0);
    }

    #[test]
    fn emits_only_on_change() {
        let settings = TempoSettings::default();
        let mut tempo = extractor(&[120.0, 120.0, 128.1, 128.1], &settings);
        let mut sink = RecordingSink::default();
        for _ in 0..4 {
            tempo.add_frame(&[0.1; 4], &mut sink).unwrap();
        }
        assert_eq!(sink.control_values(14), vec![60, 68]);
        assert_eq!(sink.sysex_payloads(), vec![vec![0x0B, 9, 48], vec![0x0B, 10, 1]]);
        assert_eq!(tempo.last_bpm(), Some(128.1));
    }

    #[test]
    fn mode_vote_smooths_outliers() {
        let settings = TempoSettings {
            count: 3,
            sysex: None,
            ..TempoSettings::default()
        };
        let mut tempo = extractor(&[120.0, 120.0, 150.0, 120.0, 150.0, 150.0], &settings);
        let mut sink = RecordingSink::default();
        for _ in 0..6 {
            tempo.add_frame(&[0.1; 4], &mut sink).unwrap();
        }
        // 150 only wins once it holds two of the three slots
        assert_eq!(sink.control_values(14), vec![60, 90]);
    }

    #[test]
    fn window_gates_engine_calls() {
        let settings = TempoSettings {
            window: stm_core::config::Windowing {
                frame_multiplier: 3,
                hop_multiplier: 1.0,
            },
            ..TempoSettings::default()
        };
        let mut tempo = extractor(&[120.0], &settings);
        let mut sink = RecordingSink::default();
        tempo.add_frame(&[0.1; 4], &mut sink).unwrap();
        tempo.add_frame(&[0.1; 4], &mut sink).unwrap();
        assert!(sink.events.is_empty());
        tempo.add_frame(&[0.1; 4], &mut sink).unwrap();
        assert_eq!(sink.control_values(14), vec![60]);
    }
}
