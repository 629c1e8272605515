use stm_core::config::Settings;
use stm_core::encode::BpmEncoding;
use stm_core::traits::MidiSink;
use stm_midi::{FeatureDecoder, FeatureReading, MidiError, MidiProcessor, MidiTransport};

struct Wire(flume::Sender<Vec<u8>>);

impl MidiTransport for Wire {
    fn send(&mut self, bytes: &[u8]) -> Result<(), MidiError> {
        self.0
            .send(bytes.to_vec())
            .map_err(|e| MidiError::Send(e.to_string()))
    }
}

fn wired(settings: &Settings) -> (MidiProcessor, flume::Receiver<Vec<u8>>) {
    let (tx, rx) = flume::unbounded();
    (
        MidiProcessor::new(&settings.midi).with_transport(Box::new(Wire(tx))),
        rx,
    )
}

fn readings(settings: &Settings, rx: &flume::Receiver<Vec<u8>>) -> Vec<FeatureReading> {
    let decoder = FeatureDecoder::new(settings);
    rx.try_iter().filter_map(|bytes| decoder.decode(&bytes)).collect()
}

#[test]
fn tempo_messages_read_back_on_the_receiving_end() {
    let settings = Settings::default();
    let (mut processor, rx) = wired(&settings);
    processor.control_change(14, BpmEncoding::Minus60.encode(128.1)[0]);
    processor.sysex(&[0x0B], &BpmEncoding::TwoBytes.encode(128.1));
    assert_eq!(
        readings(&settings, &rx),
        vec![FeatureReading::Tempo(128.0), FeatureReading::Tempo(128.1)]
    );
}

#[test]
fn another_channel_hears_nothing() {
    let settings = Settings::default();
    let (mut processor, rx) = wired(&settings);
    processor.control_change(20, 90);
    processor.sysex(&[0x1F], &[90]);
    processor.note_on(69);

    let mut listener = Settings::default();
    listener.midi.out_channel = 3;
    assert!(readings(&listener, &rx).is_empty());
}

#[test]
fn pitch_transition_reads_as_off_then_on() {
    let settings = Settings::default();
    let (mut processor, rx) = wired(&settings);
    processor.note_off(60);
    processor.note_on(62);
    processor.control_change(21, 62);
    processor.sysex(&[0x0C], &[62]);
    assert_eq!(
        readings(&settings, &rx),
        vec![
            FeatureReading::NoteOff(60),
            FeatureReading::NoteOn(62),
            FeatureReading::Pitch(62),
            FeatureReading::Pitch(62),
        ]
    );
}
