use std::fmt;

use stm_core::config::Settings;
use stm_core::encode::BpmEncoding;
use stm_core::midi::MidiEvent;

/// A feature value recovered from an incoming message.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureReading {
    /// Tempo in BPM.
    Tempo(f32),
    /// Value of the beat sequence (its position when the sequence is the default).
    Beat(u8),
    /// Scaled RMS level, 0-127.
    Rms(u8),
    /// Scaled band energies, lowest band first.
    Bands(Vec<u8>),
    /// Pitch sent as a controller or sysex value.
    Pitch(u8),
    /// Note on from the pitch extractor.
    NoteOn(u8),
    /// Note off from the pitch extractor.
    NoteOff(u8),
}

impl fmt::Display for FeatureReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tempo(bpm) => write!(f, "tempo {bpm:.1} BPM"),
            Self::Beat(value) => write!(f, "beat {value}"),
            Self::Rms(level) => write!(f, "rms {level}"),
            Self::Bands(values) => write!(f, "bands {values:?}"),
            Self::Pitch(note) => write!(f, "pitch {note}"),
            Self::NoteOn(note) => write!(f, "note on {note}"),
            Self::NoteOff(note) => write!(f, "note off {note}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Route {
    Tempo(BpmEncoding),
    Beat,
    Rms,
    Bands,
    Pitch,
}

impl Route {
    fn read(self, data: &[u8]) -> Option<FeatureReading> {
        match self {
            Self::Tempo(encoding) => encoding.decode(data).map(FeatureReading::Tempo),
            Self::Beat => data.first().copied().map(FeatureReading::Beat),
            Self::Rms => data.first().copied().map(FeatureReading::Rms),
            Self::Bands => Some(FeatureReading::Bands(data.to_vec())),
            Self::Pitch => data.first().copied().map(FeatureReading::Pitch),
        }
    }
}

/// Maps incoming MIDI bytes back to feature readings.
///
/// Built from the same [`Settings`] as the sending side: same channel, same
/// sysex prefix, same controller and command assignments. Messages on another
/// channel or with another prefix are ignored.
///
/// # Example
/// ```
/// use stm_core::config::Settings;
/// use stm_midi::decode::{FeatureDecoder, FeatureReading};
///
/// let decoder = FeatureDecoder::new(&Settings::default());
/// assert_eq!(decoder.decode(&[0xBD, 14, 60]), Some(FeatureReading::Tempo(120.0)));
/// ```
#[derive(Debug, Clone)]
pub struct FeatureDecoder {
    channel: u8,
    sysex_prefix: Vec<u8>,
    controls: Vec<(u8, Route)>,
    commands: Vec<(Vec<u8>, Route)>,
    note_on: bool,
    note_off: bool,
}

impl FeatureDecoder {
    /// Decoder matching what a sender with `settings` emits.
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        let mut controls = Vec::new();
        let mut commands = Vec::new();
        let mut assign = |controller: Option<u8>, sysex: Option<&[u8]>, control: Route, command: Route| {
            if let Some(cc) = controller {
                controls.push((cc, control));
            }
            if let Some(bytes) = sysex {
                commands.push((bytes.to_vec(), command));
            }
        };

        let beats = &settings.beats;
        if beats.enabled {
            assign(beats.controller, beats.sysex.as_deref(), Route::Beat, Route::Beat);
        }
        let tempo = &settings.tempo;
        if tempo.enabled {
            assign(
                tempo.controller,
                tempo.sysex.as_deref(),
                Route::Tempo(tempo.control_encoding),
                Route::Tempo(tempo.sysex_encoding),
            );
        }
        let rms = &settings.rms;
        if rms.enabled {
            assign(rms.controller, rms.sysex.as_deref(), Route::Rms, Route::Rms);
        }
        let bands = &settings.frequencies;
        if bands.enabled {
            assign(None, bands.sysex.as_deref(), Route::Bands, Route::Bands);
        }
        let pitch = &settings.pitch;
        if pitch.enabled {
            assign(pitch.controller, pitch.sysex.as_deref(), Route::Pitch, Route::Pitch);
        }

        Self {
            channel: settings.midi.channel_index(),
            sysex_prefix: settings.midi.sysex_prefix(),
            controls,
            commands,
            note_on: pitch.enabled && pitch.note_on,
            note_off: pitch.enabled && pitch.note_off,
        }
    }

    /// Decode one complete message. `None` for anything this system did not send.
    #[must_use]
    pub fn decode(&self, bytes: &[u8]) -> Option<FeatureReading> {
        match MidiEvent::from_bytes(bytes)? {
            MidiEvent::ControlChange {
                channel,
                controller,
                value,
            } if channel == self.channel => self
                .controls
                .iter()
                .find(|(cc, _)| *cc == controller)
                .and_then(|(_, route)| route.read(&[value])),
            MidiEvent::NoteOn { channel, note } if channel == self.channel && self.note_on => {
                Some(FeatureReading::NoteOn(note))
            }
            MidiEvent::NoteOff { channel, note } if channel == self.channel && self.note_off => {
                Some(FeatureReading::NoteOff(note))
            }
            MidiEvent::SysEx(payload) => {
                let rest = payload.strip_prefix(self.sysex_prefix.as_slice())?;
                self.commands.iter().find_map(|(command, route)| {
                    rest.strip_prefix(command.as_slice())
                        .and_then(|data| route.read(data))
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> FeatureDecoder {
        FeatureDecoder::new(&Settings::default())
    }

    #[test]
    fn tempo_control_is_minus_sixty() {
        assert_eq!(decoder().decode(&[0xBD, 14, 0]), Some(FeatureReading::Tempo(60.0)));
        assert_eq!(decoder().decode(&[0xBD, 14, 127]), Some(FeatureReading::Tempo(187.0)));
    }

    #[test]
    fn tempo_sysex_is_two_bytes() {
        let reading = decoder().decode(&[0xF0, 0x7D, 13, 0x0B, 10, 1, 0xF7]);
        assert_eq!(reading, Some(FeatureReading::Tempo(128.1)));
    }

    #[test]
    fn tempo_sysex_can_be_minus_sixty() {
        let mut settings = Settings::default();
        settings.tempo.sysex_encoding = BpmEncoding::Minus60;
        let reading = FeatureDecoder::new(&settings).decode(&[0xF0, 0x7D, 13, 0x0B, 8, 0xF7]);
        assert_eq!(reading, Some(FeatureReading::Tempo(68.0)));
    }

    #[test]
    fn beat_rms_and_pitch_controls() {
        let d = decoder();
        assert_eq!(d.decode(&[0xBD, 15, 2]), Some(FeatureReading::Beat(2)));
        assert_eq!(d.decode(&[0xBD, 20, 99]), Some(FeatureReading::Rms(99)));
        assert_eq!(d.decode(&[0xBD, 21, 69]), Some(FeatureReading::Pitch(69)));
    }

    #[test]
    fn band_sysex_keeps_every_value() {
        let reading = decoder().decode(&[0xF0, 0x7D, 13, 0x0F, 1, 2, 3, 0xF7]);
        assert_eq!(reading, Some(FeatureReading::Bands(vec![1, 2, 3])));
    }

    #[test]
    fn notes_follow_the_pitch_switches() {
        assert_eq!(decoder().decode(&[0x9D, 69, 64]), Some(FeatureReading::NoteOn(69)));
        assert_eq!(decoder().decode(&[0x8D, 69, 64]), Some(FeatureReading::NoteOff(69)));

        let mut settings = Settings::default();
        settings.pitch.note_off = false;
        assert_eq!(FeatureDecoder::new(&settings).decode(&[0x8D, 69, 64]), None);
    }

    #[test]
    fn foreign_channel_and_prefix_are_ignored() {
        let d = decoder();
        assert_eq!(d.decode(&[0xB0, 14, 60]), None);
        assert_eq!(d.decode(&[0xF0, 0x7D, 2, 0x0B, 10, 1, 0xF7]), None);
        assert_eq!(d.decode(&[0xF0, 0x43, 13, 0x0B, 10, 1, 0xF7]), None);
        assert_eq!(d.decode(&[0xBD, 99, 1]), None);
    }

    #[test]
    fn disabled_features_are_not_decoded() {
        let mut settings = Settings::default();
        settings.rms.enabled = false;
        let d = FeatureDecoder::new(&settings);
        assert_eq!(d.decode(&[0xBD, 20, 99]), None);
        assert_eq!(d.decode(&[0xF0, 0x7D, 13, 0x1F, 99, 0xF7]), None);
    }

    #[test]
    fn readings_print_for_the_monitor() {
        assert_eq!(FeatureReading::Tempo(128.1).to_string(), "tempo 128.1 BPM");
        assert_eq!(FeatureReading::NoteOn(69).to_string(), "note on 69");
    }
}
