use serde::{Deserialize, Serialize};

use crate::midi::clamp_7bit;
use crate::traits::MidiSink;

/// Per-feature MIDI addressing: which controller and which sysex command.
///
/// Either side may be absent, which disables that form of output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MidiEncoder {
    controller: Option<u8>,
    sysex_command: Option<Vec<u8>>,
}

impl MidiEncoder {
    /// Create an encoder; bytes above 127 are clamped.
    #[must_use]
    pub fn new(controller: Option<u8>, sysex_command: Option<Vec<u8>>) -> Self {
        Self {
            controller: controller.map(|c| c.min(127)),
            sysex_command: sysex_command.map(|cmd| cmd.into_iter().map(|b| b.min(127)).collect()),
        }
    }

    /// Configured controller number, if control-change output is enabled.
    #[must_use]
    pub fn controller(&self) -> Option<u8> {
        self.controller
    }

    /// Configured sysex command bytes, if sysex output is enabled.
    #[must_use]
    pub fn sysex_command(&self) -> Option<&[u8]> {
        self.sysex_command.as_deref()
    }

    /// Send a control change if a controller is configured.
    pub fn send_control(&self, sink: &mut dyn MidiSink, value: u8) {
        if let Some(controller) = self.controller {
            sink.control_change(controller, value.min(127));
        }
    }

    /// Send a sysex message if a command is configured.
    pub fn send_sysex(&self, sink: &mut dyn MidiSink, data: &[u8]) {
        if let Some(command) = self.sysex_command.as_deref() {
            sink.sysex(command, data);
        }
    }

    /// Control change first, then sysex, each only if enabled.
    pub fn send(&self, sink: &mut dyn MidiSink, control_value: u8, sysex_data: &[u8]) {
        self.send_control(sink, control_value);
        self.send_sysex(sink, sysex_data);
    }
}

/// Lowest BPM representable by the offset encoding.
pub const BPM_OFFSET: f32 = 60.0;

/// How a BPM value is squeezed into 7-bit MIDI data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BpmEncoding {
    /// One byte: BPM − 60, clamped to [0, 127] (60 → 0, 187 → 127).
    #[default]
    Minus60,
    /// Two bytes: `n = round(bpm × 10)` split as `[n >> 7, n & 0x7F]`.
    TwoBytes,
}

impl BpmEncoding {
    /// Encode a BPM value.
    ///
    /// # Example
    /// ```
    /// use stm_core::encode::BpmEncoding;
    /// assert_eq!(BpmEncoding::Minus60.encode(120.0), vec![60]);
    /// assert_eq!(BpmEncoding::TwoBytes.encode(128.1), vec![10, 1]);
    /// ```
    #[must_use]
    pub fn encode(self, bpm: f32) -> Vec<u8> {
        match self {
            Self::Minus60 => vec![bpm_minus_sixty(bpm)],
            Self::TwoBytes => {
                let (msb, lsb) = bpm_to_two_bytes(bpm);
                vec![msb, lsb]
            }
        }
    }

    /// Decode bytes produced by [`encode`](Self::encode). Returns `None` if too short.
    #[must_use]
    pub fn decode(self, data: &[u8]) -> Option<f32> {
        match (self, data) {
            (Self::Minus60, [value, ..]) => Some(f32::from(*value) + BPM_OFFSET),
            (Self::TwoBytes, [msb, lsb, ..]) => Some(bpm_from_two_bytes(*msb, *lsb)),
            _ => None,
        }
    }
}

/// `clamp(trunc(bpm − 60), 0, 127)`.
#[inline]
#[must_use]
pub fn bpm_minus_sixty(bpm: f32) -> u8 {
    clamp_7bit((bpm - BPM_OFFSET) as i64)
}

/// Split `round(bpm × 10)` across two 7-bit bytes. Saturates at 1638.3 BPM.
#[inline]
#[must_use]
pub fn bpm_to_two_bytes(bpm: f32) -> (u8, u8) {
    let n = (bpm * 10.0).round().clamp(0.0, 16383.0) as u16;
    ((n >> 7) as u8, (n & 0x7F) as u8)
}

/// Reassemble a two-byte BPM: `(msb × 128 + lsb) / 10`.
#[inline]
#[must_use]
pub fn bpm_from_two_bytes(msb: u8, lsb: u8) -> f32 {
    f32::from(u16::from(msb & 0x7F) * 128 + u16::from(lsb & 0x7F)) / 10.0
}

/// Round to one decimal place.
#[inline]
#[must_use]
pub fn round_tenth(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MidiEvent;
    use crate::traits::RecordingSink;

    #[test]
    fn minus_sixty_clamps() {
        assert_eq!(bpm_minus_sixty(60.0), 0);
        assert_eq!(bpm_minus_sixty(120.0), 60);
        assert_eq!(bpm_minus_sixty(187.0), 127);
        assert_eq!(bpm_minus_sixty(40.0), 0);
        assert_eq!(bpm_minus_sixty(250.0), 127);
    }

    #[test]
    fn two_bytes_round_trip() {
        let (msb, lsb) = bpm_to_two_bytes(128.1);
        assert_eq!((msb, lsb), ((1281_u16 >> 7) as u8, (1281_u16 & 0x7F) as u8));
        assert!((bpm_from_two_bytes(msb, lsb) - 128.1).abs() < 1e-4);
        assert!((bpm_from_two_bytes(16, 1) - (16.0 * 128.0 + 1.0) / 10.0).abs() < 1e-4);
    }

    #[test]
    fn decode_needs_enough_bytes() {
        assert_eq!(BpmEncoding::TwoBytes.decode(&[10]), None);
        assert_eq!(BpmEncoding::Minus60.decode(&[60]), Some(120.0));
    }

    #[test]
    fn encoder_skips_disabled_outputs() {
        let mut sink = RecordingSink::default();
        MidiEncoder::new(None, Some(vec![0x0B])).send(&mut sink, 5, &[5]);
        MidiEncoder::new(Some(14), None).send(&mut sink, 6, &[6]);
        assert_eq!(
            sink.events,
            vec![
                MidiEvent::sysex([0x0B, 5]),
                MidiEvent::control_change(0, 14, 6)
            ]
        );
    }

    #[test]
    fn round_tenth_keeps_one_decimal() {
        assert!((round_tenth(128.14) - 128.1).abs() < 1e-4);
        assert!((round_tenth(128.16) - 128.2).abs() < 1e-4);
    }
}
