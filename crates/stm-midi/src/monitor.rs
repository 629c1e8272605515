use midir::{Ignore, MidiInput, MidiInputConnection};

use crate::decode::{FeatureDecoder, FeatureReading};
use crate::error::MidiError;
use crate::transport::{select_port, CLIENT_NAME};

/// Receive side: listens on an input port and prints what a sender emits.
///
/// Lines are delivered on midir's input thread. The connection closes
/// when this value is dropped.
pub struct Monitor {
    _connection: MidiInputConnection<()>,
    port_name: String,
}

impl Monitor {
    /// Connect to `wanted` (`"default"` for the first input port).
    ///
    /// # Errors
    /// Returns [`MidiError::PortNotFound`] when no port matches, or the
    /// underlying init / connect error.
    pub fn connect<F>(wanted: &str, decoder: FeatureDecoder, mut on_line: F) -> Result<Self, MidiError>
    where
        F: FnMut(String) + Send + 'static,
    {
        let mut input = MidiInput::new(CLIENT_NAME)?;
        // Sysex carries most of the features.
        input.ignore(Ignore::None);
        let ports = input.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|p| input.port_name(p).unwrap_or_default())
            .collect();
        let index =
            select_port(&names, wanted).ok_or_else(|| MidiError::PortNotFound(wanted.to_owned()))?;
        let port_name = names[index].clone();

        let connection = input.connect(
            &ports[index],
            "soundtomidi-in",
            move |stamp, bytes, _data| {
                if let Some(line) = decode_line(&decoder, stamp, bytes) {
                    on_line(line);
                }
            },
            (),
        )?;
        log::info!("Entrée MIDI : {port_name}");
        Ok(Self {
            _connection: connection,
            port_name,
        })
    }

    /// Name of the connected input port.
    #[must_use]
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

/// One monitor line: the input timestamp in seconds, then the reading.
///
/// # Example
/// ```
/// use stm_midi::decode::FeatureReading;
/// use stm_midi::monitor::format_line;
/// assert_eq!(format_line(1_500_000, &FeatureReading::Rms(99)), "[1.500] rms 99");
/// ```
#[must_use]
pub fn format_line(stamp_us: u64, reading: &FeatureReading) -> String {
    format!("[{:.3}] {reading}", stamp_us as f64 / 1_000_000.0)
}

/// Decode one incoming message into a monitor line, `None` when it does not
/// belong to this channel and prefix.
#[must_use]
pub fn decode_line(decoder: &FeatureDecoder, stamp_us: u64, bytes: &[u8]) -> Option<String> {
    let reading = decoder.decode(bytes);
    if reading.is_none() {
        log::trace!("Message ignoré : {bytes:?}");
    }
    reading.map(|r| format_line(stamp_us, &r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stm_core::Settings;

    fn decoder() -> FeatureDecoder {
        FeatureDecoder::new(&Settings::default())
    }

    #[test]
    fn control_change_becomes_a_line() {
        let line = decode_line(&decoder(), 2_000_000, &[0xBD, 14, 68]);
        assert_eq!(line.as_deref(), Some("[2.000] tempo 128.0 BPM"));
    }

    #[test]
    fn sysex_becomes_a_line() {
        let line = decode_line(&decoder(), 250, &[0xF0, 0x7D, 13, 0x0F, 1, 2, 3, 0xF7]);
        assert_eq!(line.as_deref(), Some("[0.000] bands [1, 2, 3]"));
    }

    #[test]
    fn foreign_messages_give_no_line() {
        let d = decoder();
        assert_eq!(decode_line(&d, 0, &[0xB0, 14, 68]), None);
        assert_eq!(decode_line(&d, 0, &[0xF0, 0x43, 13, 0x0B, 10, 1, 0xF7]), None);
        assert_eq!(decode_line(&d, 0, &[]), None);
    }

    #[test]
    fn monitor_follows_the_sender_settings() {
        let mut settings = Settings::default();
        settings.midi.out_channel = 1;
        settings.pitch.controller = Some(30);
        let d = FeatureDecoder::new(&settings);
        assert_eq!(decode_line(&d, 1_000, &[0xB0, 30, 69]).as_deref(), Some("[0.001] pitch 69"));
        assert_eq!(decode_line(&d, 1_000, &[0xBD, 21, 69]), None);
    }
}
