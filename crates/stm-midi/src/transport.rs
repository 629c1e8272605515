use std::thread::{self, JoinHandle};

use flume::{Sender, TrySendError};
use midir::{MidiIO, MidiInput, MidiOutput, MidiOutputConnection};

use crate::error::MidiError;

/// Port name that selects the first port found.
pub const DEFAULT_PORT: &str = "default";
/// Client name announced to the platform MIDI service.
pub const CLIENT_NAME: &str = "soundtomidi";
/// Messages waiting for the output thread before new ones are refused.
pub const OUTPUT_QUEUE: usize = 1024;

/// Tout ce qui sait poser des octets MIDI bruts sur un fil.
///
/// CONTRAT : appelé depuis le callback audio, ne doit pas bloquer.
pub trait MidiTransport: Send {
    /// Send one complete message (sysex framed with F0/F7).
    ///
    /// # Errors
    /// Returns [`MidiError::Send`] if the message could not be queued or sent.
    fn send(&mut self, bytes: &[u8]) -> Result<(), MidiError>;
}

/// Index of the port matching `wanted`; [`DEFAULT_PORT`] picks the first one.
///
/// # Example
/// ```
/// use stm_midi::transport::select_port;
/// let ports = vec!["Midi Through".to_string(), "loopMIDI".to_string()];
/// assert_eq!(select_port(&ports, "default"), Some(0));
/// assert_eq!(select_port(&ports, "loopMIDI"), Some(1));
/// assert_eq!(select_port(&ports, "absent"), None);
/// ```
#[must_use]
pub fn select_port(names: &[String], wanted: &str) -> Option<usize> {
    if wanted == DEFAULT_PORT {
        return if names.is_empty() { None } else { Some(0) };
    }
    names.iter().position(|n| n == wanted)
}

fn port_names<T: MidiIO>(io: &T, ports: &[T::Port]) -> Vec<String> {
    ports
        .iter()
        .map(|p| io.port_name(p).unwrap_or_default())
        .collect()
}

/// Names of every MIDI output port.
///
/// # Errors
/// Returns [`MidiError::Init`] if the MIDI client cannot be created.
pub fn list_output_ports() -> Result<Vec<String>, MidiError> {
    let output = MidiOutput::new(CLIENT_NAME)?;
    Ok(port_names(&output, &output.ports()))
}

/// Names of every MIDI input port.
///
/// # Errors
/// Returns [`MidiError::Init`] if the MIDI client cannot be created.
pub fn list_input_ports() -> Result<Vec<String>, MidiError> {
    let input = MidiInput::new(CLIENT_NAME)?;
    Ok(port_names(&input, &input.ports()))
}

fn connect_output(wanted: &str) -> Result<(MidiOutputConnection, String), MidiError> {
    let output = MidiOutput::new(CLIENT_NAME)?;
    let ports = output.ports();
    let names = port_names(&output, &ports);
    let index =
        select_port(&names, wanted).ok_or_else(|| MidiError::PortNotFound(wanted.to_owned()))?;
    let name = names[index].clone();
    let connection = output.connect(&ports[index], "soundtomidi-out")?;
    Ok((connection, name))
}

/// MIDI output port driven by its own thread.
///
/// The connection lives on the `stm-midi-out` thread; [`send`](MidiTransport::send)
/// only queues bytes with `try_send`, so the audio callback never waits on the
/// platform MIDI service. Dropping the value closes the port.
pub struct MidirOutput {
    sender: Option<Sender<Vec<u8>>>,
    worker: Option<JoinHandle<()>>,
    port_name: String,
}

impl MidirOutput {
    /// Connect to `wanted` ([`DEFAULT_PORT`] for the first port).
    ///
    /// # Errors
    /// Returns [`MidiError::PortNotFound`] when no port matches, or the
    /// underlying init / connect / thread error.
    pub fn connect(wanted: &str) -> Result<Self, MidiError> {
        let (ready_tx, ready_rx) = flume::bounded::<Result<String, MidiError>>(1);
        let (sender, receiver) = flume::bounded::<Vec<u8>>(OUTPUT_QUEUE);
        let wanted = wanted.to_owned();

        let worker = thread::Builder::new()
            .name("stm-midi-out".into())
            .spawn(move || {
                let mut connection = match connect_output(&wanted) {
                    Ok((connection, name)) => {
                        let _ = ready_tx.send(Ok(name));
                        connection
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                for bytes in receiver.iter() {
                    if let Err(e) = connection.send(&bytes) {
                        log::debug!("Message MIDI perdu : {e}");
                    }
                }
                connection.close();
            })?;

        let port_name = ready_rx
            .recv()
            .map_err(|_| MidiError::Connect("thread de sortie arrêté".into()))??;
        log::info!("Sortie MIDI : {port_name}");
        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            port_name,
        })
    }

    /// Name of the connected port.
    #[must_use]
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl MidiTransport for MidirOutput {
    fn send(&mut self, bytes: &[u8]) -> Result<(), MidiError> {
        let Some(sender) = &self.sender else {
            return Err(MidiError::Send("port fermé".into()));
        };
        sender.try_send(bytes.to_vec()).map_err(|e| match e {
            TrySendError::Full(_) => MidiError::Send("file de sortie pleine".into()),
            TrySendError::Disconnected(_) => MidiError::Send("thread de sortie arrêté".into()),
        })
    }
}

impl Drop for MidirOutput {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop.
        drop(self.sender.take());
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            log::warn!("Le thread de sortie MIDI a paniqué");
        }
    }
}

/// Open the named output, or log why not and carry on without one.
///
/// `"default"` resolves to the first port; an empty port list or an unknown
/// name yields `None` rather than an error.
#[must_use]
pub fn open_output(wanted: &str) -> Option<MidirOutput> {
    match MidirOutput::connect(wanted) {
        Ok(output) => Some(output),
        Err(e) => {
            log::warn!("Pas de sortie MIDI ({e}), messages non envoyés");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn default_picks_the_first_port() {
        assert_eq!(select_port(&names(&["a", "b"]), DEFAULT_PORT), Some(0));
    }

    #[test]
    fn default_with_no_ports_is_none() {
        assert_eq!(select_port(&[], DEFAULT_PORT), None);
    }

    #[test]
    fn names_must_match_exactly() {
        let ports = names(&["loopMIDI Port", "loopMIDI Port 2"]);
        assert_eq!(select_port(&ports, "loopMIDI Port 2"), Some(1));
        assert_eq!(select_port(&ports, "loopMIDI"), None);
    }
}
