use std::fmt;

/// Status byte that opens a system-exclusive message.
pub const SYSEX_START: u8 = 0xF0;
/// Status byte that closes a system-exclusive message.
pub const SYSEX_END: u8 = 0xF7;
/// Velocity used for note-on and note-off messages.
pub const DEFAULT_VELOCITY: u8 = 64;

/// Clamp any integer into the MIDI data byte range [0, 127].
///
/// # Example
/// ```
/// use stm_core::midi::clamp_7bit;
/// assert_eq!(clamp_7bit(-4), 0);
/// assert_eq!(clamp_7bit(68), 68);
/// assert_eq!(clamp_7bit(300), 127);
/// ```
#[inline]
#[must_use]
pub fn clamp_7bit(value: i64) -> u8 {
    value.clamp(0, 127) as u8
}

/// A single outgoing MIDI message.
///
/// Every data byte is 7-bit clean: constructors clamp out-of-range values
/// instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiEvent {
    /// Control change on `channel` (0-15).
    ControlChange {
        /// Channel, 0-15.
        channel: u8,
        /// Controller number, 0-127.
        controller: u8,
        /// Controller value, 0-127.
        value: u8,
    },
    /// Note on at the default velocity.
    NoteOn {
        /// Channel, 0-15.
        channel: u8,
        /// Note number, 0-127.
        note: u8,
    },
    /// Note off at the default velocity.
    NoteOff {
        /// Channel, 0-15.
        channel: u8,
        /// Note number, 0-127.
        note: u8,
    },
    /// System exclusive payload, without the F0/F7 framing.
    SysEx(Vec<u8>),
}

impl MidiEvent {
    /// Build a control change, clamping every field.
    #[must_use]
    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        Self::ControlChange {
            channel: channel.min(15),
            controller: controller.min(127),
            value: value.min(127),
        }
    }

    /// Build a note on, clamping every field.
    #[must_use]
    pub fn note_on(channel: u8, note: u8) -> Self {
        Self::NoteOn {
            channel: channel.min(15),
            note: note.min(127),
        }
    }

    /// Build a note off, clamping every field.
    #[must_use]
    pub fn note_off(channel: u8, note: u8) -> Self {
        Self::NoteOff {
            channel: channel.min(15),
            note: note.min(127),
        }
    }

    /// Build a sysex message; bytes above 127 are clamped.
    #[must_use]
    pub fn sysex(payload: impl IntoIterator<Item = u8>) -> Self {
        Self::SysEx(payload.into_iter().map(|b| b.min(127)).collect())
    }

    /// Serialise to wire bytes, framing sysex with F0/F7.
    ///
    /// # Example
    /// ```
    /// use stm_core::midi::MidiEvent;
    /// let cc = MidiEvent::control_change(13, 14, 68);
    /// assert_eq!(cc.to_bytes(), vec![0xBD, 14, 68]);
    /// ```
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::ControlChange {
                channel,
                controller,
                value,
            } => vec![0xB0 | channel, *controller, *value],
            Self::NoteOn { channel, note } => vec![0x90 | channel, *note, DEFAULT_VELOCITY],
            Self::NoteOff { channel, note } => vec![0x80 | channel, *note, DEFAULT_VELOCITY],
            Self::SysEx(payload) => {
                let mut bytes = Vec::with_capacity(payload.len() + 2);
                bytes.push(SYSEX_START);
                bytes.extend_from_slice(payload);
                bytes.push(SYSEX_END);
                bytes
            }
        }
    }

    /// Parse one complete message from wire bytes.
    ///
    /// Note-on with velocity 0 is read as note-off, per the MIDI running convention.
    /// Returns `None` for message kinds this system never emits.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (&status, rest) = bytes.split_first()?;
        if status == SYSEX_START {
            let payload = rest.strip_suffix(&[SYSEX_END]).unwrap_or(rest);
            return Some(Self::SysEx(payload.to_vec()));
        }
        let channel = status & 0x0F;
        match (status & 0xF0, rest) {
            (0xB0, [controller, value, ..]) => {
                Some(Self::control_change(channel, *controller, *value))
            }
            (0x90, [note, 0, ..]) | (0x80, [note, ..]) => Some(Self::note_off(channel, *note)),
            (0x90, [note, ..]) => Some(Self::note_on(channel, *note)),
            _ => None,
        }
    }
}

/// Human-readable form, one message per line.
impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ControlChange {
                channel,
                controller,
                value,
            } => write!(
                f,
                "control_change channel={channel} control={controller} value={value}"
            ),
            Self::NoteOn { channel, note } => write!(
                f,
                "note_on channel={channel} note={note} velocity={DEFAULT_VELOCITY}"
            ),
            Self::NoteOff { channel, note } => write!(
                f,
                "note_off channel={channel} note={note} velocity={DEFAULT_VELOCITY}"
            ),
            Self::SysEx(payload) => {
                write!(f, "sysex data=(")?;
                for (i, b) in payload.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{b}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_clamp_to_seven_bits() {
        assert_eq!(
            MidiEvent::control_change(20, 200, 255),
            MidiEvent::ControlChange {
                channel: 15,
                controller: 127,
                value: 127
            }
        );
        assert_eq!(MidiEvent::sysex([0x7D, 0xFF]), MidiEvent::SysEx(vec![0x7D, 127]));
    }

    #[test]
    fn wire_bytes_and_back() {
        let events = [
            MidiEvent::control_change(13, 14, 68),
            MidiEvent::note_on(13, 60),
            MidiEvent::note_off(13, 60),
            MidiEvent::sysex([0x7D, 13, 0x0B, 5]),
        ];
        for event in events {
            assert_eq!(MidiEvent::from_bytes(&event.to_bytes()), Some(event));
        }
    }

    #[test]
    fn note_on_zero_velocity_is_note_off() {
        assert_eq!(
            MidiEvent::from_bytes(&[0x9D, 60, 0]),
            Some(MidiEvent::note_off(13, 60))
        );
    }

    #[test]
    fn sysex_is_framed() {
        let bytes = MidiEvent::sysex([0x7D, 13, 0x0B, 5]).to_bytes();
        assert_eq!(bytes, vec![0xF0, 0x7D, 13, 0x0B, 5, 0xF7]);
    }

    #[test]
    fn display_matches_text_echo() {
        assert_eq!(
            MidiEvent::control_change(13, 14, 68).to_string(),
            "control_change channel=13 control=14 value=68"
        );
        assert_eq!(
            MidiEvent::sysex([0x7D, 13]).to_string(),
            "sysex data=(125,13)"
        );
    }
}
