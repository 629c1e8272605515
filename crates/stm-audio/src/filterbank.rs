use crate::engine::FilterBank;

/// Overlapping triangular filters over a magnitude spectrum.
///
/// `n` edge frequencies give `n − 2` bands. Band `i` rises from `edges[i]`
/// to a peak at `edges[i + 1]` and falls back to zero at `edges[i + 2]`; each
/// triangle is scaled to height `2 / (upper − lower)` so wide bands do not
/// dominate narrow ones. Bins above Nyquist are simply absent.
///
/// # Example
/// ```
/// use stm_audio::filterbank::TriangleFilterBank;
/// use stm_audio::engine::FilterBank;
/// let bank = TriangleFilterBank::new(&[100.0, 200.0, 400.0, 800.0], 44_100, 2048);
/// assert_eq!(bank.band_count(), 2);
/// ```
pub struct TriangleFilterBank {
    /// One row of `bins` weights per band.
    weights: Vec<f32>,
    bins: usize,
    energies: Vec<f32>,
}

impl TriangleFilterBank {
    /// Build the filters for a spectrum of `window_size / 2 + 1` bins.
    #[must_use]
    pub fn new(edges: &[f32], sample_rate: u32, window_size: usize) -> Self {
        let bands = edges.len().saturating_sub(2);
        let bins = window_size / 2 + 1;
        let bin_hz = sample_rate as f32 / window_size.max(1) as f32;
        let nyquist = sample_rate as f32 / 2.0;
        if edges.last().is_some_and(|&e| e > nyquist) {
            log::debug!("Bandes au-delà de Nyquist ({nyquist} Hz) : poids nuls");
        }

        let mut weights = vec![0.0; bands * bins];
        for (band, row) in weights.chunks_mut(bins.max(1)).enumerate().take(bands) {
            let (lower, center, upper) = (edges[band], edges[band + 1], edges[band + 2]);
            let height = 2.0 / (upper - lower);
            for (k, w) in row.iter_mut().enumerate() {
                let f = k as f32 * bin_hz;
                *w = if f >= lower && f < center {
                    height * (f - lower) / (center - lower)
                } else if f >= center && f < upper {
                    height * (upper - f) / (upper - center)
                } else {
                    0.0
                };
            }
        }

        Self {
            weights,
            bins,
            energies: vec![0.0; bands],
        }
    }

    /// Expected spectrum length.
    #[must_use]
    pub fn bins(&self) -> usize {
        self.bins
    }
}

impl FilterBank for TriangleFilterBank {
    fn band_count(&self) -> usize {
        self.energies.len()
    }

    fn apply(&mut self, spectrum: &[f32]) -> &[f32] {
        for (energy, row) in self.energies.iter_mut().zip(self.weights.chunks(self.bins)) {
            *energy = row.iter().zip(spectrum).map(|(w, m)| w * m).sum();
        }
        &self.energies
    }
}
