use stm_core::config::Settings;
use stm_core::traits::{FeatureExtractor, MidiSink};
use stm_core::CoreError;

use crate::extract::{BandExtractor, BeatExtractor, PitchExtractor, RmsExtractor, TempoExtractor};

/// Distribue chaque frame audio aux extracteurs actifs, dans un ordre fixe.
///
/// CONTRAT : appelé depuis le callback audio. Aucune erreur ne remonte : une
/// frame de mauvaise taille est journalisée puis ignorée. Les frames
/// entièrement nulles sont ignorées avant tout extracteur.
pub struct Dispatcher<S> {
    frame_size: usize,
    extractors: Vec<Box<dyn FeatureExtractor>>,
    sink: S,
    silent_frames: u64,
}

impl<S: MidiSink> Dispatcher<S> {
    /// Empty dispatcher; add extractors with [`push`](Self::push).
    #[must_use]
    pub fn new(frame_size: usize, sink: S) -> Self {
        Self {
            frame_size,
            extractors: Vec::new(),
            sink,
            silent_frames: 0,
        }
    }

    /// Build every enabled extractor, in order beat, tempo, rms, frequencies, pitch.
    ///
    /// # Errors
    /// Returns [`CoreError::Config`] if the settings do not validate.
    pub fn from_settings(settings: &Settings, sink: S) -> Result<Self, CoreError> {
        settings.validate()?;
        let soundcard = &settings.soundcard;
        let mut dispatcher = Self::new(soundcard.frame_size, sink);

        if settings.beats.enabled {
            dispatcher.push(Box::new(BeatExtractor::new(&settings.beats, soundcard)));
        }
        if settings.tempo.enabled {
            dispatcher.push(Box::new(TempoExtractor::new(&settings.tempo, soundcard)));
        }
        if settings.rms.enabled {
            dispatcher.push(Box::new(RmsExtractor::new(&settings.rms, soundcard)));
        }
        if settings.frequencies.enabled {
            dispatcher.push(Box::new(BandExtractor::new(&settings.frequencies, soundcard)));
        }
        if settings.pitch.enabled {
            dispatcher.push(Box::new(PitchExtractor::new(&settings.pitch, soundcard)));
        }

        if dispatcher.extractors.is_empty() {
            log::warn!("Aucun extracteur actif : aucun message ne sera envoyé");
        } else {
            log::info!("Extracteurs actifs : {}", dispatcher.names().join(", "));
        }
        Ok(dispatcher)
    }

    /// Append an extractor after the existing ones.
    pub fn push(&mut self, extractor: Box<dyn FeatureExtractor>) {
        self.extractors.push(extractor);
    }

    /// Names of the active extractors, in dispatch order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }

    /// Samples per frame.
    #[must_use]
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// All-zero frames skipped so far.
    #[must_use]
    pub fn silent_frames(&self) -> u64 {
        self.silent_frames
    }

    /// The sink every extractor writes to.
    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable access to the sink.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Give the sink back.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Route one frame through every extractor.
    pub fn process(&mut self, frame: &[f32]) {
        if frame.iter().all(|&s| s == 0.0) {
            self.silent_frames += 1;
            return;
        }
        for extractor in &mut self.extractors {
            if let Err(e) = extractor.add_frame(frame, &mut self.sink) {
                log::warn!("{} : frame ignorée ({e})", extractor.name());
            }
        }
    }
}

/// Re-blocks interleaved device buffers into exact frames of the first channel.
///
/// Device callbacks do not promise a buffer of `frame_size` samples; this
/// keeps the remainder between calls. Pre-allocated, no allocation per call.
///
/// # Example
/// ```
/// use stm_audio::dispatcher::FrameAssembler;
/// let mut assembler = FrameAssembler::new(2, 2);
/// let mut frames = Vec::new();
/// assembler.push_interleaved(&[1.0, 9.0, 2.0, 9.0, 3.0, 9.0], |f| frames.push(f.to_vec()));
/// assert_eq!(frames, vec![vec![1.0, 2.0]]);
/// ```
pub struct FrameAssembler {
    frame: Vec<f32>,
    filled: usize,
    channels: usize,
}

impl FrameAssembler {
    /// Assemble frames of `frame_size` samples from `channels`-wide interleaved input.
    #[must_use]
    pub fn new(frame_size: usize, channels: usize) -> Self {
        Self {
            frame: vec![0.0; frame_size],
            filled: 0,
            channels: channels.max(1),
        }
    }

    /// Consume interleaved samples, calling `on_frame` for each completed frame.
    pub fn push_interleaved(&mut self, data: &[f32], mut on_frame: impl FnMut(&[f32])) {
        if self.frame.is_empty() {
            return;
        }
        for chunk in data.chunks(self.channels) {
            self.frame[self.filled] = chunk[0];
            self.filled += 1;
            if self.filled == self.frame.len() {
                self.filled = 0;
                on_frame(&self.frame);
            }
        }
    }

    /// Samples waiting for the next frame.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stm_core::traits::RecordingSink;

    /// Sends its own tag as a control change on every frame.
    struct Tag(u8);

    impl FeatureExtractor for Tag {
        fn add_frame(&mut self, frame: &[f32], sink: &mut dyn MidiSink) -> Result<(), CoreError> {
            if frame.len() != 2 {
                return Err(CoreError::ShapeMismatch {
                    expected: 2,
                    actual: frame.len(),
                });
            }
            sink.control_change(self.0, 1);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "tag"
        }
    }

    fn tagged() -> Dispatcher<RecordingSink> {
        let mut dispatcher = Dispatcher::new(2, RecordingSink::default());
        for tag in 1..=3 {
            dispatcher.push(Box::new(Tag(tag)));
        }
        dispatcher
    }

    #[test]
    fn order_is_preserved() {
        let mut dispatcher = tagged();
        dispatcher.process(&[0.1, 0.0]);
        let tags: Vec<u8> = dispatcher
            .sink()
            .events
            .iter()
            .map(|e| e.to_bytes()[1])
            .collect();
        assert_eq!(tags, vec![1, 2, 3]);
    }

    #[test]
    fn silent_frames_are_skipped() {
        let mut dispatcher = tagged();
        dispatcher.process(&[0.0, 0.0]);
        assert!(dispatcher.sink().events.is_empty());
        assert_eq!(dispatcher.silent_frames(), 1);
    }

    #[test]
    fn wrong_length_is_dropped_quietly() {
        let mut dispatcher = tagged();
        dispatcher.process(&[0.1, 0.1, 0.1]);
        assert!(dispatcher.into_sink().events.is_empty());
    }

    #[test]
    fn default_settings_enable_all_five_in_order() {
        let dispatcher =
            Dispatcher::from_settings(&Settings::default(), RecordingSink::default()).unwrap();
        assert_eq!(
            dispatcher.names(),
            vec!["beats", "tempo", "rms", "frequencies", "pitch"]
        );
    }

    #[test]
    fn disabled_features_are_left_out() {
        let mut settings = Settings::default();
        settings.beats.enabled = false;
        settings.pitch.enabled = false;
        let dispatcher = Dispatcher::from_settings(&settings, RecordingSink::default()).unwrap();
        assert_eq!(dispatcher.names(), vec!["tempo", "rms", "frequencies"]);
    }

    #[test]
    fn invalid_settings_fail_before_building() {
        let mut settings = Settings::default();
        settings.midi.out_channel = 0;
        assert!(Dispatcher::from_settings(&settings, RecordingSink::default()).is_err());
    }

    #[test]
    fn assembler_keeps_remainder_between_calls() {
        let mut assembler = FrameAssembler::new(3, 1);
        let mut frames = Vec::new();
        assembler.push_interleaved(&[1.0, 2.0], |f| frames.push(f.to_vec()));
        assert_eq!(assembler.pending(), 2);
        assembler.push_interleaved(&[3.0, 4.0, 5.0, 6.0, 7.0], |f| frames.push(f.to_vec()));
        assert_eq!(frames, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        assert_eq!(assembler.pending(), 1);
    }
}
