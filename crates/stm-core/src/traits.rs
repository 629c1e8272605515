use crate::error::CoreError;
use crate::midi::MidiEvent;

/// Reçoit les messages décidés par les extracteurs.
///
/// Implémenté par : `MidiProcessor` (stm-midi) et `RecordingSink` (tests).
/// Le canal et le préfixe sysex sont l'affaire du sink ; un extracteur ne
/// connaît que des numéros de contrôleur, des notes et des octets de commande.
///
/// # Exemple
/// ```
/// use stm_core::traits::MidiSink;
///
/// #[derive(Default)]
/// struct Count(usize);
/// impl MidiSink for Count {
///     fn control_change(&mut self, _controller: u8, _value: u8) { self.0 += 1; }
///     fn note_on(&mut self, _note: u8) { self.0 += 1; }
///     fn note_off(&mut self, _note: u8) { self.0 += 1; }
///     fn sysex(&mut self, _command: &[u8], _data: &[u8]) { self.0 += 1; }
/// }
/// ```
pub trait MidiSink {
    /// Send a control change on the output channel.
    fn control_change(&mut self, controller: u8, value: u8);

    /// Send a note on on the output channel.
    fn note_on(&mut self, note: u8);

    /// Send a note off on the output channel.
    fn note_off(&mut self, note: u8);

    /// Send a sysex message: addressing prefix ++ `command` ++ `data`.
    fn sysex(&mut self, command: &[u8], data: &[u8]);
}

/// Analyse un flux de frames audio et émet des messages MIDI.
///
/// CONTRAT : appelé uniquement depuis le callback audio, une frame à la fois.
/// Ne doit PAS bloquer ; tous les buffers sont pré-alloués dans le constructeur.
pub trait FeatureExtractor: Send {
    /// Ajoute une frame de `frame_size` échantillons, en émettant au besoin dans `sink`.
    ///
    /// # Erreurs
    /// [`CoreError::ShapeMismatch`] si la frame n'a pas la bonne longueur.
    fn add_frame(&mut self, frame: &[f32], sink: &mut dyn MidiSink) -> Result<(), CoreError>;

    /// Nom lisible pour les logs.
    fn name(&self) -> &'static str;
}

/// Sink that keeps every message, addressed on channel 0 with no sysex prefix.
///
/// Handy for tests and for offline inspection of what an extractor decided.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    /// Messages in emission order.
    pub events: Vec<MidiEvent>,
}

impl RecordingSink {
    /// Control values sent to `controller`, in order.
    #[must_use]
    pub fn control_values(&self, controller: u8) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                MidiEvent::ControlChange {
                    controller: c,
                    value,
                    ..
                } if *c == controller => Some(*value),
                _ => None,
            })
            .collect()
    }

    /// Sysex payloads, command bytes included.
    #[must_use]
    pub fn sysex_payloads(&self) -> Vec<Vec<u8>> {
        self.events
            .iter()
            .filter_map(|e| match e {
                MidiEvent::SysEx(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl MidiSink for RecordingSink {
    fn control_change(&mut self, controller: u8, value: u8) {
        self.events
            .push(MidiEvent::control_change(0, controller, value));
    }

    fn note_on(&mut self, note: u8) {
        self.events.push(MidiEvent::note_on(0, note));
    }

    fn note_off(&mut self, note: u8) {
        self.events.push(MidiEvent::note_off(0, note));
    }

    fn sysex(&mut self, command: &[u8], data: &[u8]) {
        self.events
            .push(MidiEvent::sysex(command.iter().chain(data).copied()));
    }
}
