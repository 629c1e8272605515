use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use crate::engine::SpectralTransform;
use crate::window::HopBuffer;

/// Sliding windowed real FFT using realfft.
///
/// Keeps the last `window_size` samples and computes one Hann-windowed
/// magnitude spectrum every `hop_size` samples. Plan, scratch and output
/// buffers are pre-allocated for a zero-allocation hot path.
///
/// # Example
/// ```
/// use stm_audio::fft::PhaseVocoder;
/// let pv = PhaseVocoder::new(1024, 512);
/// assert_eq!(pv.bins(), 513);
/// ```
pub struct PhaseVocoder {
    window_size: usize,
    hop_size: usize,
    frames: HopBuffer,
    input_buf: Vec<f32>,
    spectrum_buf: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    plan: Arc<dyn RealToComplex<f32>>,
    /// Hann window coefficients.
    window: Vec<f32>,
    magnitudes: Vec<f32>,
}

impl PhaseVocoder {
    /// Create a vocoder analysing `window_size` samples every `hop_size` samples.
    ///
    /// # Panics
    /// Panics if `window_size` is 0.
    #[must_use]
    pub fn new(window_size: usize, hop_size: usize) -> Self {
        assert!(window_size > 0, "FFT size must be > 0");

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(window_size);

        let input_buf = plan.make_input_vec();
        let spectrum_buf = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();
        let magnitudes = vec![0.0; spectrum_buf.len()];

        let window: Vec<f32> = (0..window_size)
            .map(|i| {
                0.5 * (1.0
                    - (2.0 * std::f32::consts::PI * i as f32 / (window_size as f32 - 1.0).max(1.0))
                        .cos())
            })
            .collect();

        Self {
            window_size,
            hop_size: hop_size.clamp(1, window_size),
            frames: HopBuffer::new(window_size),
            input_buf,
            spectrum_buf,
            scratch,
            plan,
            window,
            magnitudes,
        }
    }

    /// Push one hop of samples and return the updated magnitude spectrum.
    ///
    /// # Example
    /// ```
    /// use stm_audio::fft::PhaseVocoder;
    /// let mut pv = PhaseVocoder::new(256, 128);
    /// let spectrum = pv.analyze(&[0.0f32; 128]);
    /// assert_eq!(spectrum.len(), 129); // N/2 + 1
    /// ```
    pub fn analyze(&mut self, hop: &[f32]) -> &[f32] {
        let frames = self.frames.push(hop);
        for ((slot, &sample), &w) in self.input_buf.iter_mut().zip(frames).zip(&self.window) {
            *slot = sample * w;
        }

        if self
            .plan
            .process_with_scratch(&mut self.input_buf, &mut self.spectrum_buf, &mut self.scratch)
            .is_err()
        {
            self.magnitudes.fill(0.0);
            return &self.magnitudes;
        }

        let norm = self.window_size as f32;
        for (mag, c) in self.magnitudes.iter_mut().zip(&self.spectrum_buf) {
            *mag = c.norm() / norm;
        }
        &self.magnitudes
    }

    /// FFT window size.
    #[must_use]
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Samples consumed per analysis.
    #[must_use]
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Number of spectrum bins, `window_size / 2 + 1`.
    #[must_use]
    pub fn bins(&self) -> usize {
        self.magnitudes.len()
    }
}

impl SpectralTransform for PhaseVocoder {
    /// Feed the window hop by hop; returns the spectrum of the last hop.
    fn transform(&mut self, window: &[f32]) -> &[f32] {
        let hop = self.hop_size;
        for chunk in window.chunks(hop) {
            self.analyze(chunk);
        }
        &self.magnitudes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn silence_has_empty_spectrum() {
        let mut pv = PhaseVocoder::new(512, 256);
        assert!(pv.transform(&[0.0; 512]).iter().all(|&m| m == 0.0));
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let sr = 8000.0;
        let n = 1024;
        let bin = 64;
        let freq = bin as f32 * sr / n as f32;
        let mut pv = PhaseVocoder::new(n, n);
        let spectrum = pv.transform(&sine(freq, sr, n));
        let peak = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, bin);
    }

    #[test]
    fn hop_is_clamped_to_window() {
        let pv = PhaseVocoder::new(256, 4096);
        assert_eq!(pv.hop_size(), 256);
        assert_eq!(PhaseVocoder::new(256, 0).hop_size(), 1);
    }
}
