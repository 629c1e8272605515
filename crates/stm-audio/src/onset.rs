use stm_core::config::OnsetMethod;

/// EMA weight kept from the previous average.
const AVG_KEEP: f32 = 0.93;
/// Novelty must exceed `avg × THRESHOLD_RATIO + MIN_NOVELTY` to count.
const THRESHOLD_RATIO: f32 = 1.5;
const MIN_NOVELTY: f32 = 1e-4;
/// Minimum gap between two onsets, in seconds.
const COOLDOWN_SECS: f32 = 0.13;
/// Hops ignored at start-up while the average settles.
const WARMUP_HOPS: u64 = 10;

/// Onset detection on successive magnitude spectra.
///
/// A novelty value is computed per spectrum (see [`OnsetMethod`]) and
/// compared with an adaptive threshold that follows its running average.
/// A cooldown prevents one attack from being reported twice.
///
/// # Example
/// ```
/// use stm_audio::onset::OnsetDetector;
/// use stm_core::config::OnsetMethod;
/// let detector = OnsetDetector::new(OnsetMethod::Hfc, 256, 44_100);
/// ```
pub struct OnsetDetector {
    method: OnsetMethod,
    /// Previous spectrum for flux calculation (pre-allocated, reused via copy_from_slice).
    prev_spectrum: Vec<f32>,
    prev_energy: f32,
    /// Running average of novelty for adaptive threshold.
    novelty_avg: f32,
    hop_count: u64,
    last_onset_hop: u64,
    cooldown_hops: u64,
}

impl OnsetDetector {
    /// Create a detector for spectra produced every `hop_size` samples.
    #[must_use]
    pub fn new(method: OnsetMethod, hop_size: usize, sample_rate: u32) -> Self {
        let hops_per_sec = sample_rate as f32 / hop_size.max(1) as f32;
        Self {
            method,
            prev_spectrum: Vec::new(),
            prev_energy: 0.0,
            novelty_avg: 0.0,
            hop_count: 0,
            last_onset_hop: 0,
            cooldown_hops: (hops_per_sec * COOLDOWN_SECS).max(2.0) as u64,
        }
    }

    /// Novelty of `spectrum` relative to the previous one.
    pub fn novelty(&mut self, spectrum: &[f32]) -> f32 {
        let value = match self.method {
            OnsetMethod::Hfc => spectrum
                .iter()
                .enumerate()
                .map(|(k, &m)| k as f32 * m)
                .sum::<f32>(),
            OnsetMethod::SpecFlux => {
                if self.prev_spectrum.len() == spectrum.len() {
                    spectrum
                        .iter()
                        .zip(&self.prev_spectrum)
                        .map(|(&cur, &prev)| (cur - prev).max(0.0))
                        .sum()
                } else {
                    0.0
                }
            }
            OnsetMethod::Energy => {
                let energy: f32 = spectrum.iter().map(|m| m * m).sum();
                let rise = (energy - self.prev_energy).max(0.0);
                self.prev_energy = energy;
                rise
            }
        };

        if self.prev_spectrum.len() != spectrum.len() {
            self.prev_spectrum.resize(spectrum.len(), 0.0);
        }
        self.prev_spectrum.copy_from_slice(spectrum);
        value
    }

    /// Process one spectrum; returns `true` on an onset.
    pub fn process(&mut self, spectrum: &[f32]) -> bool {
        self.hop_count += 1;
        let novelty = self.novelty(spectrum);

        self.novelty_avg = self.novelty_avg * AVG_KEEP + novelty * (1.0 - AVG_KEEP);
        let threshold = self.novelty_avg * THRESHOLD_RATIO + MIN_NOVELTY;

        let hops_since = self.hop_count - self.last_onset_hop;
        let onset =
            self.hop_count > WARMUP_HOPS && novelty > threshold && hops_since > self.cooldown_hops;
        if onset {
            self.last_onset_hop = self.hop_count;
        }
        onset
    }

    /// Hops processed so far.
    #[must_use]
    pub fn hop_count(&self) -> u64 {
        self.hop_count
    }
}
