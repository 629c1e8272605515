use std::io::Write;
use std::thread;

use flume::{Sender, TrySendError};
use stm_core::config::EchoFormat;
use stm_core::midi::MidiEvent;

use crate::error::MidiError;

/// Lines waiting for the printer before new ones are dropped.
pub const ECHO_QUEUE: usize = 1024;

/// Render one message as a line of text.
///
/// # Example
/// ```
/// use stm_core::config::EchoFormat;
/// use stm_core::midi::MidiEvent;
/// use stm_midi::echo::render;
/// let cc = MidiEvent::control_change(13, 14, 68);
/// assert_eq!(render(EchoFormat::Bytes, &cc), "[189, 14, 68]");
/// assert_eq!(render(EchoFormat::Hex, &cc), "BD 0E 44");
/// ```
#[must_use]
pub fn render(format: EchoFormat, event: &MidiEvent) -> String {
    let bytes = event.to_bytes();
    match format {
        EchoFormat::Verbose => event.to_string(),
        EchoFormat::Bytes => format!("{bytes:?}"),
        EchoFormat::Bin => join(&bytes, |b| format!("{b:08b}")),
        EchoFormat::Hex => join(&bytes, |b| format!("{b:02X}")),
    }
}

fn join(bytes: &[u8], fmt: impl Fn(u8) -> String) -> String {
    bytes.iter().map(|&b| fmt(b)).collect::<Vec<_>>().join(" ")
}

/// Text echo of every outgoing message.
///
/// Lines go through a bounded channel to a printer thread; when stdout cannot
/// keep up, lines are dropped and counted instead of stalling the caller.
pub struct Echo {
    format: EchoFormat,
    sender: Sender<String>,
    dropped: u64,
}

impl Echo {
    /// Echo into an existing channel.
    #[must_use]
    pub fn new(format: EchoFormat, sender: Sender<String>) -> Self {
        Self {
            format,
            sender,
            dropped: 0,
        }
    }

    /// Start the `stm-echo` printer thread writing to stdout.
    ///
    /// The thread ends once this value (the only sender) is dropped.
    ///
    /// # Errors
    /// Returns [`MidiError::Io`] if the thread cannot be spawned.
    pub fn spawn(format: EchoFormat) -> Result<Self, MidiError> {
        let (sender, receiver) = flume::bounded::<String>(ECHO_QUEUE);
        thread::Builder::new()
            .name("stm-echo".into())
            .spawn(move || {
                let stdout = std::io::stdout();
                for line in receiver.iter() {
                    let mut out = stdout.lock();
                    if writeln!(out, "{line}").is_err() {
                        break;
                    }
                }
            })?;
        Ok(Self::new(format, sender))
    }

    /// Queue one message; never blocks.
    pub fn emit(&mut self, event: &MidiEvent) {
        match self.sender.try_send(render(self.format, event)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.dropped += 1,
            Err(TrySendError::Disconnected(_)) => {
                if self.dropped == 0 {
                    log::warn!("Echo arrêté, lignes ignorées");
                }
                self.dropped += 1;
            }
        }
    }

    /// Lines lost to a full or closed channel.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Rendering in use.
    #[must_use]
    pub fn format(&self) -> EchoFormat {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_uses_the_message_text() {
        let note = MidiEvent::note_on(13, 60);
        assert_eq!(
            render(EchoFormat::Verbose, &note),
            "note_on channel=13 note=60 velocity=64"
        );
    }

    #[test]
    fn bin_shows_eight_digit_groups() {
        let note = MidiEvent::note_off(0, 1);
        assert_eq!(
            render(EchoFormat::Bin, &note),
            "10000000 00000001 01000000"
        );
    }

    #[test]
    fn sysex_hex_is_framed() {
        let sysex = MidiEvent::sysex([0x7D, 13, 0x0B, 5]);
        assert_eq!(render(EchoFormat::Hex, &sysex), "F0 7D 0D 0B 05 F7");
    }

    #[test]
    fn full_channel_drops_instead_of_blocking() {
        let (sender, receiver) = flume::bounded(1);
        let mut echo = Echo::new(EchoFormat::Bytes, sender);
        echo.emit(&MidiEvent::control_change(0, 1, 2));
        echo.emit(&MidiEvent::control_change(0, 1, 3));
        assert_eq!(echo.dropped(), 1);
        assert_eq!(receiver.try_recv().unwrap(), "[176, 1, 2]");
    }
}
