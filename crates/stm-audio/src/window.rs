use stm_core::CoreError;

/// Accumulates frames until `frame_multiplier` of them form one window.
///
/// The window is released flattened in arrival order, then the position
/// resets. Between calls the position is always `< frame_multiplier`.
///
/// # Example
/// ```
/// use stm_audio::window::AnalysisWindow;
/// let mut window = AnalysisWindow::new(2, 3);
/// assert!(window.add_frame(&[1.0, 2.0]).unwrap().is_none());
/// assert!(window.add_frame(&[3.0, 4.0]).unwrap().is_none());
/// let full = window.add_frame(&[5.0, 6.0]).unwrap().unwrap();
/// assert_eq!(full, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
/// ```
#[derive(Debug, Clone)]
pub struct AnalysisWindow {
    buffer: Vec<f32>,
    frame_size: usize,
    frame_multiplier: usize,
    position: usize,
}

impl AnalysisWindow {
    /// Pre-allocate a window of `frame_size × frame_multiplier` samples.
    #[must_use]
    pub fn new(frame_size: usize, frame_multiplier: usize) -> Self {
        let frame_multiplier = frame_multiplier.max(1);
        Self {
            buffer: vec![0.0; frame_size * frame_multiplier],
            frame_size,
            frame_multiplier,
            position: 0,
        }
    }

    /// Copy one frame in; returns the full window every `frame_multiplier` calls.
    ///
    /// # Errors
    /// Returns [`CoreError::ShapeMismatch`] if `frame` is not `frame_size` long.
    /// The position is left untouched in that case.
    #[inline]
    pub fn add_frame(&mut self, frame: &[f32]) -> Result<Option<&[f32]>, CoreError> {
        if frame.len() != self.frame_size {
            return Err(CoreError::ShapeMismatch {
                expected: self.frame_size,
                actual: frame.len(),
            });
        }
        let start = self.position * self.frame_size;
        self.buffer[start..start + self.frame_size].copy_from_slice(frame);
        self.position += 1;
        if self.position == self.frame_multiplier {
            self.position = 0;
            Ok(Some(&self.buffer))
        } else {
            Ok(None)
        }
    }

    /// Frames currently held.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Frames per window.
    #[must_use]
    pub fn frame_multiplier(&self) -> usize {
        self.frame_multiplier
    }

    /// Samples per frame.
    #[must_use]
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Samples per window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// `true` only for a zero frame size.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Fixed-length sliding buffer: new samples push the oldest ones out.
///
/// Used by the engines that analyse a long window every `hop` samples.
#[derive(Debug, Clone)]
pub struct HopBuffer {
    data: Vec<f32>,
}

impl HopBuffer {
    /// Zero-filled buffer of `len` samples.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            data: vec![0.0; len],
        }
    }

    /// Shift `samples` in at the end and return the whole buffer.
    ///
    /// # Example
    /// ```
    /// use stm_audio::window::HopBuffer;
    /// let mut buf = HopBuffer::new(4);
    /// buf.push(&[1.0, 2.0]);
    /// assert_eq!(buf.push(&[3.0]), &[0.0, 1.0, 2.0, 3.0]);
    /// ```
    #[inline]
    pub fn push(&mut self, samples: &[f32]) -> &[f32] {
        let len = self.data.len();
        if samples.len() >= len {
            self.data.copy_from_slice(&samples[samples.len() - len..]);
        } else {
            let n = samples.len();
            self.data.copy_within(n.., 0);
            self.data[len - n..].copy_from_slice(samples);
        }
        &self.data
    }

    /// Current contents, oldest sample first.
    #[must_use]
    pub fn contents(&self) -> &[f32] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn releases_only_after_multiplier_frames() {
        let mut window = AnalysisWindow::new(4, 3);
        for _ in 0..2 {
            assert!(window.add_frame(&[0.5; 4]).unwrap().is_none());
        }
        assert_eq!(window.position(), 2);
        assert_eq!(window.add_frame(&[0.5; 4]).unwrap().map(<[f32]>::len), Some(12));
        assert_eq!(window.position(), 0);
    }

    #[test]
    fn multiplier_one_releases_every_frame() {
        let mut window = AnalysisWindow::new(2, 1);
        for i in 0..5 {
            let v = i as f32;
            assert_eq!(window.add_frame(&[v, v]).unwrap(), Some(&[v, v][..]));
        }
    }

    #[test]
    fn no_redelivery_without_refill() {
        let mut window = AnalysisWindow::new(1, 2);
        let mut released = 0;
        for i in 0..10 {
            if window.add_frame(&[i as f32]).unwrap().is_some() {
                released += 1;
            }
            assert!(window.position() < window.frame_multiplier());
        }
        assert_eq!(released, 5);
    }

    #[test]
    fn wrong_length_is_rejected_and_position_kept() {
        let mut window = AnalysisWindow::new(4, 2);
        window.add_frame(&[0.1; 4]).unwrap();
        assert_eq!(
            window.add_frame(&[0.1; 3]).unwrap_err(),
            CoreError::ShapeMismatch {
                expected: 4,
                actual: 3
            }
        );
        assert_eq!(window.position(), 1);
    }

    #[test]
    fn hop_buffer_keeps_latest_samples() {
        let mut buf = HopBuffer::new(3);
        assert_eq!(buf.push(&[1.0, 2.0, 3.0, 4.0, 5.0]), &[3.0, 4.0, 5.0]);
        assert_eq!(buf.push(&[6.0]), &[4.0, 5.0, 6.0]);
    }
}
