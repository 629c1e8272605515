use stm_core::config::{FrequencySettings, SoundcardSettings};
use stm_core::encode::MidiEncoder;
use stm_core::policy::PeakDecay;
use stm_core::traits::{FeatureExtractor, MidiSink};
use stm_core::CoreError;

use crate::engine::{FilterBank, SpectralTransform};
use crate::fft::PhaseVocoder;
use crate::filterbank::TriangleFilterBank;
use crate::window::AnalysisWindow;

/// Per-band spectral energy, sent as one sysex every `count` windows.
///
/// Each bucket of `count` energy frames is reduced to its per-band maximum,
/// normalised by that band's running maximum and held up by the peak-decay
/// floor. Every bucket is sent, changed or not. There is no control-change
/// form.
pub struct BandExtractor<T = PhaseVocoder, B = TriangleFilterBank> {
    window: AnalysisWindow,
    transform: T,
    bank: B,
    /// `count` rows of `bands` energies.
    bucket: Vec<f32>,
    filled: usize,
    count: usize,
    running_max: Vec<f32>,
    previous: Vec<f32>,
    decay: PeakDecay,
    values: Vec<u8>,
    encoder: MidiEncoder,
}

impl BandExtractor<PhaseVocoder, TriangleFilterBank> {
    /// Build with the default phase vocoder and triangle filter bank.
    #[must_use]
    pub fn new(settings: &FrequencySettings, soundcard: &SoundcardSettings) -> Self {
        let frame_size = soundcard.frame_size;
        let window_size = settings.window.window_size(frame_size);
        let transform = PhaseVocoder::new(window_size, settings.window.hop_size(frame_size));
        let bank = TriangleFilterBank::new(settings.bands.edges(), soundcard.sample_rate, window_size);
        Self::with_engines(transform, bank, settings, frame_size)
    }
}

impl<T: SpectralTransform, B: FilterBank> BandExtractor<T, B> {
    /// Build around any transform and filter bank.
    #[must_use]
    pub fn with_engines(transform: T, bank: B, settings: &FrequencySettings, frame_size: usize) -> Self {
        let bands = bank.band_count();
        let count = settings.count.max(1);
        Self {
            window: AnalysisWindow::new(frame_size, settings.window.frame_multiplier),
            transform,
            bank,
            bucket: vec![0.0; count * bands],
            filled: 0,
            count,
            running_max: vec![0.0; bands],
            previous: vec![0.0; bands],
            decay: PeakDecay::new(settings.decay),
            values: vec![0; bands],
            encoder: MidiEncoder::new(None, settings.sysex.clone()),
        }
    }

    /// Values of the last message sent.
    #[must_use]
    pub fn last_values(&self) -> &[u8] {
        &self.values
    }

    fn flush(&mut self, sink: &mut dyn MidiSink) {
        let bands = self.values.len();
        for band in 0..bands {
            let peak = (0..self.count)
                .map(|row| self.bucket[row * bands + band])
                .fold(0.0f32, f32::max);
            if peak > self.running_max[band] {
                self.running_max[band] = peak;
            }
            let normalized = if self.running_max[band] > 0.0 {
                peak / self.running_max[band]
            } else {
                0.0
            };
            let floored = self.decay.floor(normalized, self.previous[band]);
            self.previous[band] = floored;
            self.values[band] = (floored * 127.0).clamp(0.0, 127.0) as u8;
        }
        log::trace!("bandes : {:?}", self.values);
        self.encoder.send_sysex(sink, &self.values);
    }
}

impl<T: SpectralTransform, B: FilterBank> FeatureExtractor for BandExtractor<T, B> {
    fn add_frame(&mut self, frame: &[f32], sink: &mut dyn MidiSink) -> Result<(), CoreError> {
        let Some(window) = self.window.add_frame(frame)? else {
            return Ok(());
        };
        let spectrum = self.transform.transform(window);
        let energies = self.bank.apply(spectrum);
        let bands = self.values.len();
        let row = &mut self.bucket[self.filled * bands..(self.filled + 1) * bands];
        for (slot, &energy) in row.iter_mut().zip(energies) {
            *slot = energy;
        }
        self.filled += 1;
        if self.filled == self.count {
            self.filled = 0;
            self.flush(sink);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "frequencies"
    }
}
