use stm_core::config::{MidiSettings, Settings};
use stm_core::midi::MidiEvent;
use stm_core::traits::MidiSink;

use crate::echo::Echo;
use crate::error::MidiError;
use crate::transport::{open_output, MidiTransport};

/// Turns extractor decisions into addressed MIDI messages.
///
/// Channel messages go out on `out_channel − 1`; sysex payloads are prefixed
/// with the manufacturer bytes and, when enabled, the channel. Without a
/// transport messages are dropped silently; the echo works either way.
///
/// # Example
/// ```
/// use stm_core::config::MidiSettings;
/// use stm_core::traits::MidiSink;
/// use stm_midi::MidiProcessor;
///
/// let mut processor = MidiProcessor::new(&MidiSettings::default());
/// processor.control_change(14, 68);
/// assert_eq!(processor.sent(), 1);
/// ```
pub struct MidiProcessor {
    channel: u8,
    sysex_prefix: Vec<u8>,
    transport: Option<Box<dyn MidiTransport>>,
    echo: Option<Echo>,
    sent: u64,
    failed: u64,
}

impl MidiProcessor {
    /// Processor with neither transport nor echo.
    #[must_use]
    pub fn new(settings: &MidiSettings) -> Self {
        Self {
            channel: settings.channel_index(),
            sysex_prefix: settings.sysex_prefix(),
            transport: None,
            echo: None,
            sent: 0,
            failed: 0,
        }
    }

    /// Open the configured port and echo, as enabled.
    ///
    /// A missing port is logged and leaves the processor without transport.
    ///
    /// # Errors
    /// Returns [`MidiError::Io`] if the echo thread cannot be spawned.
    pub fn from_settings(settings: &Settings) -> Result<Self, MidiError> {
        let mut processor = Self::new(&settings.midi);
        if settings.midi.enabled {
            if let Some(output) = open_output(&settings.midi.out_port) {
                processor.transport = Some(Box::new(output));
            }
        } else {
            log::info!("Sortie MIDI désactivée");
        }
        if settings.echo.enabled {
            processor.echo = Some(Echo::spawn(settings.echo.format)?);
        }
        log::info!(
            "Canal MIDI {}, préfixe sysex {:?}",
            processor.channel + 1,
            processor.sysex_prefix
        );
        Ok(processor)
    }

    /// Replace the transport.
    #[must_use]
    pub fn with_transport(mut self, transport: Box<dyn MidiTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace the echo.
    #[must_use]
    pub fn with_echo(mut self, echo: Echo) -> Self {
        self.echo = Some(echo);
        self
    }

    /// Whether messages reach a port.
    #[must_use]
    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// Zero-based channel of channel messages.
    #[must_use]
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Bytes placed before every sysex command.
    #[must_use]
    pub fn sysex_prefix(&self) -> &[u8] {
        &self.sysex_prefix
    }

    /// Messages produced so far.
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Messages the transport refused.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed
    }

    fn emit(&mut self, event: &MidiEvent) {
        self.sent += 1;
        if let Some(transport) = self.transport.as_mut()
            && let Err(e) = transport.send(&event.to_bytes())
        {
            self.failed += 1;
            log::debug!("{e}");
        }
        if let Some(echo) = self.echo.as_mut() {
            echo.emit(event);
        }
    }
}

impl MidiSink for MidiProcessor {
    fn control_change(&mut self, controller: u8, value: u8) {
        self.emit(&MidiEvent::control_change(self.channel, controller, value));
    }

    fn note_on(&mut self, note: u8) {
        self.emit(&MidiEvent::note_on(self.channel, note));
    }

    fn note_off(&mut self, note: u8) {
        self.emit(&MidiEvent::note_off(self.channel, note));
    }

    fn sysex(&mut self, command: &[u8], data: &[u8]) {
        let event = MidiEvent::sysex(
            self.sysex_prefix
                .iter()
                .chain(command)
                .chain(data)
                .copied(),
        );
        self.emit(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stm_core::config::EchoFormat;

    struct Capture(flume::Sender<Vec<u8>>);

    impl MidiTransport for Capture {
        fn send(&mut self, bytes: &[u8]) -> Result<(), MidiError> {
            self.0
                .send(bytes.to_vec())
                .map_err(|e| MidiError::Send(e.to_string()))
        }
    }

    struct Refuse;

    impl MidiTransport for Refuse {
        fn send(&mut self, _bytes: &[u8]) -> Result<(), MidiError> {
            Err(MidiError::Send("refusé".into()))
        }
    }

    fn captured(settings: &MidiSettings) -> (MidiProcessor, flume::Receiver<Vec<u8>>) {
        let (tx, rx) = flume::unbounded();
        (
            MidiProcessor::new(settings).with_transport(Box::new(Capture(tx))),
            rx,
        )
    }

    #[test]
    fn sysex_carries_manufacturer_and_channel() {
        let (mut processor, rx) = captured(&MidiSettings::default());
        processor.sysex(&[0x0B], &[5]);
        assert_eq!(rx.try_recv().unwrap(), vec![0xF0, 0x7D, 13, 0x0B, 5, 0xF7]);
    }

    #[test]
    fn sysex_channel_can_be_left_out() {
        let settings = MidiSettings {
            sysex_channel: false,
            ..MidiSettings::default()
        };
        let (mut processor, rx) = captured(&settings);
        processor.sysex(&[0x1B], &[3]);
        assert_eq!(rx.try_recv().unwrap(), vec![0xF0, 0x7D, 0x1B, 3, 0xF7]);
    }

    #[test]
    fn channel_messages_use_zero_based_channel() {
        let settings = MidiSettings {
            out_channel: 1,
            ..MidiSettings::default()
        };
        let (mut processor, rx) = captured(&settings);
        processor.control_change(14, 68);
        processor.note_on(60);
        processor.note_off(60);
        let sent: Vec<Vec<u8>> = rx.try_iter().collect();
        assert_eq!(
            sent,
            vec![vec![0xB0, 14, 68], vec![0x90, 60, 64], vec![0x80, 60, 64]]
        );
    }

    #[test]
    fn no_transport_still_echoes() {
        let (tx, rx) = flume::unbounded();
        let mut processor =
            MidiProcessor::new(&MidiSettings::default()).with_echo(Echo::new(EchoFormat::Verbose, tx));
        assert!(!processor.has_transport());
        processor.control_change(14, 68);
        assert_eq!(
            rx.try_recv().unwrap(),
            "control_change channel=13 control=14 value=68"
        );
        assert_eq!(processor.sent(), 1);
    }

    #[test]
    fn refused_sends_are_counted_not_raised() {
        let mut processor = MidiProcessor::new(&MidiSettings::default()).with_transport(Box::new(Refuse));
        processor.note_on(60);
        processor.note_off(60);
        assert_eq!(processor.failed(), 2);
        assert_eq!(processor.sent(), 2);
    }
}
