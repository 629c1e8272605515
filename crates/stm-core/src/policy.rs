//! Decision policies turning noisy measurements into stable MIDI values.
//!
//! Each extractor embeds one of these: a mode vote (tempo, pitch), a peak-decay
//! floor with a running maximum (RMS, frequency bands) or a cyclic sequence
//! (beat). Nothing here allocates after construction.

use std::collections::VecDeque;

/// Most frequent element of `items`; ties go to the element seen first.
///
/// Quadratic, which is fine for the short histories used here and keeps the
/// hot path allocation-free.
///
/// # Example
/// ```
/// use stm_core::policy::mode_of;
/// assert_eq!(mode_of(&[3, 1, 1, 3]), Some(3));
/// assert_eq!(mode_of(&[2, 5, 5]), Some(5));
/// assert_eq!(mode_of::<i32>(&[]), None);
/// ```
#[must_use]
pub fn mode_of<T: Copy + PartialEq>(items: &[T]) -> Option<T> {
    let mut best: Option<(T, usize)> = None;
    for (i, &candidate) in items.iter().enumerate() {
        if items[..i].contains(&candidate) {
            continue;
        }
        let count = items[i..].iter().filter(|&&v| v == candidate).count();
        if best.is_none_or(|(_, n)| count > n) {
            best = Some((candidate, count));
        }
    }
    best.map(|(v, _)| v)
}

/// Fixed-capacity FIFO with an emit-on-change mode vote.
#[derive(Debug, Clone)]
pub struct ModeVote<T> {
    history: VecDeque<T>,
    capacity: usize,
    last: Option<T>,
}

impl<T: Copy + PartialEq> ModeVote<T> {
    /// Create a vote over the `capacity` most recent values (at least 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity + 1),
            capacity,
            last: None,
        }
    }

    /// Push a value and return the new mode if it differs from the last one returned.
    ///
    /// # Example
    /// ```
    /// use stm_core::policy::ModeVote;
    /// let mut vote = ModeVote::new(3);
    /// assert_eq!(vote.push(120), Some(120));
    /// assert_eq!(vote.push(121), None); // 120 still first-seen among ties
    /// assert_eq!(vote.push(121), Some(121));
    /// ```
    pub fn push(&mut self, value: T) -> Option<T> {
        self.history.push_back(value);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
        let mode = mode_of(self.history.make_contiguous())?;
        if self.last == Some(mode) {
            None
        } else {
            self.last = Some(mode);
            Some(mode)
        }
    }

    /// Last value returned by [`push`](Self::push).
    #[must_use]
    pub fn last(&self) -> Option<T> {
        self.last
    }

    /// Values currently held, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &T> {
        self.history.iter()
    }
}

/// Bounded FIFO of `f32` with a mean, used for BPM averaging.
#[derive(Debug, Clone)]
pub struct RollingMean {
    values: VecDeque<f32>,
    capacity: usize,
}

impl RollingMean {
    /// Create a rolling mean over the `capacity` most recent values (at least 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Push a value and return the mean of the window.
    pub fn push(&mut self, value: f32) -> f32 {
        self.values.push_back(value);
        while self.values.len() > self.capacity {
            self.values.pop_front();
        }
        self.values.iter().sum::<f32>() / self.values.len() as f32
    }
}

/// Peak-decay floor: an output may not fall below `decay × previous`.
///
/// `decay` is clamped to [0, 1]. 0 disables the floor, 1 never lets a value drop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakDecay {
    decay: f32,
}

impl PeakDecay {
    /// Create a floor with the given decay factor.
    #[must_use]
    pub fn new(decay: f32) -> Self {
        Self {
            decay: if decay.is_finite() {
                decay.clamp(0.0, 1.0)
            } else {
                0.0
            },
        }
    }

    /// The configured decay factor.
    #[must_use]
    pub fn factor(&self) -> f32 {
        self.decay
    }

    /// Continuous floor: `max(value, previous × decay)`.
    #[inline]
    #[must_use]
    pub fn floor(&self, value: f32, previous: f32) -> f32 {
        value.max(previous * self.decay)
    }

    /// Floor on already-scaled MIDI values; the threshold is truncated.
    ///
    /// # Example
    /// ```
    /// use stm_core::policy::PeakDecay;
    /// let decay = PeakDecay::new(0.5);
    /// assert_eq!(decay.floor_scaled(0, 127), 63);
    /// assert_eq!(decay.floor_scaled(90, 127), 90);
    /// ```
    #[inline]
    #[must_use]
    pub fn floor_scaled(&self, value: u8, previous: u8) -> u8 {
        value.max((f32::from(previous) * self.decay) as u8)
    }
}

/// Maximum ever observed, never reset; used to normalise energies to [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningMax {
    max: f32,
}

impl RunningMax {
    /// Observe a value; returns `true` when it sets a new maximum.
    pub fn observe(&mut self, value: f32) -> bool {
        if value > self.max {
            self.max = value;
            true
        } else {
            false
        }
    }

    /// Current maximum (0 until a positive value is seen).
    #[must_use]
    pub fn get(&self) -> f32 {
        self.max
    }

    /// `value / max`, or 0 while nothing positive has been seen.
    #[inline]
    #[must_use]
    pub fn normalize(&self, value: f32) -> f32 {
        if self.max > 0.0 { value / self.max } else { 0.0 }
    }
}

/// Repeating list of values handed out one per event.
#[derive(Debug, Clone)]
pub struct CyclicSequence {
    values: Vec<u8>,
    position: usize,
}

/// Value used when the configured sequence is empty.
pub const EMPTY_SEQUENCE_FALLBACK: u8 = 64;

impl CyclicSequence {
    /// Create a sequence; an empty list falls back to `[64]`.
    #[must_use]
    pub fn new(values: &[u8]) -> Self {
        let values = if values.is_empty() {
            vec![EMPTY_SEQUENCE_FALLBACK]
        } else {
            values.iter().map(|&v| v.min(127)).collect()
        };
        Self {
            values,
            position: 0,
        }
    }

    /// Return `(position, value)` for this event, then advance and wrap.
    ///
    /// # Example
    /// ```
    /// use stm_core::policy::CyclicSequence;
    /// let mut seq = CyclicSequence::new(&[10, 20]);
    /// assert_eq!(seq.advance(), (0, 10));
    /// assert_eq!(seq.advance(), (1, 20));
    /// assert_eq!(seq.advance(), (0, 10));
    /// ```
    pub fn advance(&mut self) -> (usize, u8) {
        let current = (self.position, self.values[self.position]);
        self.position = (self.position + 1) % self.values.len();
        current
    }

    /// Position of the next value to be handed out.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of values in one cycle.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always `false`: an empty list is replaced by the fallback.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_prefers_first_seen_on_ties() {
        assert_eq!(mode_of(&[-1, 60, 60, -1]), Some(-1));
        assert_eq!(mode_of(&[60, -1, -1, 60, 62]), Some(60));
        assert_eq!(mode_of(&[1, 2, 3]), Some(1));
    }

    #[test]
    fn mode_vote_emits_only_on_change() {
        let mut vote = ModeVote::new(1);
        assert_eq!(vote.push(1200), Some(1200));
        assert_eq!(vote.push(1200), None);
        assert_eq!(vote.push(1281), Some(1281));
        assert_eq!(vote.last(), Some(1281));
    }

    #[test]
    fn mode_vote_is_bounded() {
        let mut vote = ModeVote::new(3);
        for v in [1, 1, 1, 2, 2] {
            vote.push(v);
        }
        assert_eq!(vote.history().count(), 3);
        assert_eq!(vote.last(), Some(2));
    }

    #[test]
    fn rolling_mean_forgets_old_values() {
        let mut mean = RollingMean::new(2);
        assert!((mean.push(100.0) - 100.0).abs() < f32::EPSILON);
        assert!((mean.push(120.0) - 110.0).abs() < f32::EPSILON);
        assert!((mean.push(140.0) - 130.0).abs() < f32::EPSILON);
    }

    #[test]
    fn decay_is_clamped() {
        assert!((PeakDecay::new(3.0).factor() - 1.0).abs() < f32::EPSILON);
        assert!(PeakDecay::new(-1.0).factor().abs() < f32::EPSILON);
        assert!(PeakDecay::new(f32::NAN).factor().abs() < f32::EPSILON);
    }

    #[test]
    fn decay_zero_passes_value_through() {
        let decay = PeakDecay::new(0.0);
        assert!((decay.floor(0.2, 1.0) - 0.2).abs() < f32::EPSILON);
        assert_eq!(decay.floor_scaled(3, 127), 3);
    }

    #[test]
    fn running_max_normalizes() {
        let mut max = RunningMax::default();
        assert!(max.normalize(1.0).abs() < f32::EPSILON);
        assert!(max.observe(2.0));
        assert!(!max.observe(1.0));
        assert!((max.normalize(1.0) - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_sequence_falls_back() {
        let mut seq = CyclicSequence::new(&[]);
        assert_eq!(seq.len(), 1);
        assert_eq!(seq.advance(), (0, EMPTY_SEQUENCE_FALLBACK));
        assert_eq!(seq.position(), 0);
    }
}
