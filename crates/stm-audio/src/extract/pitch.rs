use stm_core::config::{PitchSettings, SoundcardSettings};
use stm_core::encode::MidiEncoder;
use stm_core::policy::mode_of;
use stm_core::traits::{FeatureExtractor, MidiSink};
use stm_core::CoreError;

use crate::engine::PitchEngine;
use crate::window::AnalysisWindow;
use crate::yin::YinPitch;

/// Votes added per engine call at confidence 1.0.
const MAX_WEIGHT: f32 = 10.0;

/// Candidate filtering: range check, cutoff band and optional octave folding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteFilter {
    /// Lowest note kept.
    pub low: u8,
    /// Highest note kept.
    pub high: u8,
    /// Base note when folding into one octave, `None` keeps absolute notes.
    pub fold_offset: Option<u8>,
}

impl NoteFilter {
    /// Round `note` and keep it only if it survives every filter; `None` means silence.
    ///
    /// # Example
    /// ```
    /// use stm_audio::extract::NoteFilter;
    /// let filter = NoteFilter { low: 0, high: 127, fold_offset: Some(60) };
    /// assert_eq!(filter.apply(69.2), Some(69));
    /// assert_eq!(filter.apply(81.0), Some(69));
    /// assert_eq!(filter.apply(0.0), None);
    /// ```
    #[must_use]
    pub fn apply(&self, note: f32) -> Option<u8> {
        let rounded = note.round();
        if !(1.0..=127.0).contains(&rounded) {
            return None;
        }
        let note = rounded as u8;
        if note < self.low || note > self.high {
            return None;
        }
        match self.fold_offset {
            Some(offset) if note <= 120 => Some((note % 12).saturating_add(offset).min(127)),
            Some(_) => None,
            None => Some(note),
        }
    }
}

/// Fundamental pitch, decided by a confidence-weighted vote every `count` windows.
///
/// Each engine call adds `round(confidence × 10)` copies of its filtered
/// candidate to a histogram seeded with one silence vote. The histogram's
/// mode is compared with the last decided note and only transitions emit.
pub struct PitchExtractor<E = YinPitch> {
    window: AnalysisWindow,
    engine: E,
    filter: NoteFilter,
    votes: Vec<Option<u8>>,
    calls: usize,
    count: usize,
    note_on: bool,
    note_off: bool,
    last: Option<u8>,
    encoder: MidiEncoder,
}

impl PitchExtractor<YinPitch> {
    /// Build with the YIN engine.
    #[must_use]
    pub fn new(settings: &PitchSettings, soundcard: &SoundcardSettings) -> Self {
        let frame_size = soundcard.frame_size;
        let engine = YinPitch::new(
            settings.window.window_size(frame_size),
            settings.window.hop_size(frame_size),
            soundcard.sample_rate,
            settings.tolerance,
        );
        Self::with_engine(engine, settings, frame_size)
    }
}

impl<E: PitchEngine> PitchExtractor<E> {
    /// Build around any pitch engine.
    #[must_use]
    pub fn with_engine(engine: E, settings: &PitchSettings, frame_size: usize) -> Self {
        let count = settings.count.max(1);
        let mut votes = Vec::with_capacity(count * MAX_WEIGHT as usize + 1);
        votes.push(None);
        Self {
            window: AnalysisWindow::new(frame_size, settings.window.frame_multiplier),
            engine,
            filter: NoteFilter {
                low: settings.low_cutoff,
                high: settings.high_cutoff,
                fold_offset: settings.fold_octaves.then_some(settings.fold_offset),
            },
            votes,
            calls: 0,
            count,
            note_on: settings.note_on,
            note_off: settings.note_off,
            last: None,
            encoder: MidiEncoder::new(settings.controller, settings.sysex.clone()),
        }
    }

    /// Note currently sounding, `None` for silence.
    #[must_use]
    pub fn current_note(&self) -> Option<u8> {
        self.last
    }

    fn decide(&mut self, sink: &mut dyn MidiSink) {
        let decided = mode_of(&self.votes).flatten();
        self.votes.clear();
        self.votes.push(None);
        if decided == self.last {
            return;
        }
        log::trace!("pitch : {:?} -> {decided:?}", self.last);

        if let Some(old) = self.last
            && self.note_off
        {
            sink.note_off(old);
        }
        if let Some(new) = decided {
            if self.note_on {
                sink.note_on(new);
            }
            self.encoder.send(sink, new, &[new]);
        }
        self.last = decided;
    }
}

impl<E: PitchEngine> FeatureExtractor for PitchExtractor<E> {
    fn add_frame(&mut self, frame: &[f32], sink: &mut dyn MidiSink) -> Result<(), CoreError> {
        let Some(window) = self.window.add_frame(frame)? else {
            return Ok(());
        };
        let note = self.engine.detect(window);
        let weight = (self.engine.confidence().clamp(0.0, 1.0) * MAX_WEIGHT).round() as usize;
        let candidate = self.filter.apply(note);
        self.votes.extend(std::iter::repeat_n(candidate, weight));

        self.calls += 1;
        if self.calls == self.count {
            self.calls = 0;
            self.decide(sink);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "pitch"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stm_core::midi::MidiEvent;
    use stm_core::traits::RecordingSink;

    /// Plays back `(note, confidence)` pairs, then silence.
    struct Scripted {
        script: Vec<(f32, f32)>,
        confidence: f32,
    }

    impl Scripted {
        fn new(script: Vec<(f32, f32)>) -> Self {
            Self {
                script,
                confidence: 0.0,
            }
        }
    }

    impl PitchEngine for Scripted {
        fn detect(&mut self, _window: &[f32]) -> f32 {
            let (note, confidence) = if self.script.is_empty() {
                (0.0, 1.0)
            } else {
                self.script.remove(0)
            };
            self.confidence = confidence;
            note
        }

        fn confidence(&self) -> f32 {
            self.confidence
        }
    }

    fn run(script: Vec<(f32, f32)>, settings: &PitchSettings, frames: usize) -> RecordingSink {
        let mut pitch = PitchExtractor::with_engine(Scripted::new(script), settings, 1);
        let mut sink = RecordingSink::default();
        for _ in 0..frames {
            pitch.add_frame(&[0.2], &mut sink).unwrap();
        }
        sink
    }

    fn one_window() -> PitchSettings {
        PitchSettings {
            window: stm_core::config::Windowing {
                frame_multiplier: 1,
                hop_multiplier: 1.0,
            },
            ..PitchSettings::default()
        }
    }

    #[test]
    fn note_then_silence_is_one_on_and_one_off() {
        let settings = one_window();
        let sink = run(vec![(60.0, 1.0); 8], &settings, 24);
        assert_eq!(
            sink.events,
            vec![
                MidiEvent::note_on(0, 60),
                MidiEvent::control_change(0, 21, 60),
                MidiEvent::sysex([0x0C, 60]),
                MidiEvent::note_off(0, 60),
            ]
        );
    }

    #[test]
    fn note_to_note_is_off_then_on() {
        let settings = PitchSettings {
            count: 1,
            controller: None,
            sysex: None,
            ..one_window()
        };
        let sink = run(vec![(60.0, 1.0), (64.0, 1.0)], &settings, 2);
        assert_eq!(
            sink.events,
            vec![
                MidiEvent::note_on(0, 60),
                MidiEvent::note_off(0, 60),
                MidiEvent::note_on(0, 64),
            ]
        );
    }

    #[test]
    fn low_confidence_leans_to_silence() {
        let settings = PitchSettings {
            count: 1,
            ..one_window()
        };
        // 0.04 rounds to zero votes: the silence seed wins
        let sink = run(vec![(60.0, 0.04)], &settings, 1);
        assert!(sink.events.is_empty());
    }

    #[test]
    fn cutoff_and_fold() {
        let band = NoteFilter {
            low: 40,
            high: 80,
            fold_offset: None,
        };
        assert_eq!(band.apply(39.6), Some(40));
        assert_eq!(band.apply(30.0), None);
        assert_eq!(band.apply(90.0), None);
        assert_eq!(band.apply(128.0), None);

        let folded = NoteFilter {
            low: 0,
            high: 127,
            fold_offset: Some(48),
        };
        assert_eq!(folded.apply(61.0), Some(49));
        assert_eq!(folded.apply(121.0), None);
    }

    #[test]
    fn disabled_note_messages_keep_cc() {
        let settings = PitchSettings {
            count: 1,
            note_on: false,
            note_off: false,
            sysex: None,
            ..one_window()
        };
        let sink = run(vec![(62.0, 1.0)], &settings, 2);
        assert_eq!(sink.events, vec![MidiEvent::control_change(0, 21, 62)]);
    }
}
