//! Seams between the extractors and the DSP that feeds them.
//!
//! Every extractor is generic over one of these traits so it can be driven by
//! a scripted engine in tests. The real implementations live in
//! [`tempo`](crate::tempo), [`yin`](crate::yin), [`fft`](crate::fft) and
//! [`filterbank`](crate::filterbank).

/// What the tempo engine reports for one window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TempoReading {
    /// An onset was detected inside this window.
    pub is_beat: bool,
    /// Current tempo estimate; 0 until enough onsets were seen.
    pub bpm: f32,
}

/// Beat and tempo tracking.
pub trait TempoEngine: Send {
    /// Analyse one full window.
    fn detect(&mut self, window: &[f32]) -> TempoReading;
}

/// Fundamental pitch estimation in MIDI-note units.
pub trait PitchEngine: Send {
    /// Analyse one full window; returns a fractional MIDI note, 0 when unvoiced.
    fn detect(&mut self, window: &[f32]) -> f32;

    /// Confidence of the last [`detect`](Self::detect) call, in [0, 1].
    fn confidence(&self) -> f32;
}

/// Window to magnitude spectrum.
pub trait SpectralTransform: Send {
    /// Transform one full window; the slice has `window_size / 2 + 1` bins.
    fn transform(&mut self, window: &[f32]) -> &[f32];
}

/// Magnitude spectrum to per-band energies.
pub trait FilterBank: Send {
    /// Number of bands produced by [`apply`](Self::apply).
    fn band_count(&self) -> usize;

    /// Weighted energy of each band.
    fn apply(&mut self, spectrum: &[f32]) -> &[f32];
}
