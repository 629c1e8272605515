use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use stm_audio::Dispatcher;
use stm_audio::decode::decode_file;
use stm_audio::engine::{TempoEngine, TempoReading};
use stm_audio::extract::{BeatExtractor, TempoExtractor};
use stm_core::config::{BeatSettings, Settings, TempoSettings, Windowing};
use stm_core::midi::MidiEvent;
use stm_core::traits::RecordingSink;

/// Counts engine calls; reports a beat every call.
struct Counting(Arc<AtomicUsize>);

impl TempoEngine for Counting {
    fn detect(&mut self, _window: &[f32]) -> TempoReading {
        self.0.fetch_add(1, Ordering::SeqCst);
        TempoReading {
            is_beat: true,
            bpm: 120.0,
        }
    }
}

fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
        .collect()
}

fn beat_dispatcher(frame_multiplier: usize, calls: &Arc<AtomicUsize>) -> Dispatcher<RecordingSink> {
    let settings = BeatSettings {
        window: Windowing {
            frame_multiplier,
            hop_multiplier: 1.0,
        },
        ..BeatSettings::default()
    };
    let mut dispatcher = Dispatcher::new(4, RecordingSink::default());
    dispatcher.push(Box::new(BeatExtractor::with_engine(
        Counting(Arc::clone(calls)),
        &settings,
        4,
    )));
    dispatcher
}

#[test]
fn engine_runs_once_per_full_window() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = beat_dispatcher(4, &calls);
    for _ in 0..3 {
        dispatcher.process(&[0.1; 4]);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    dispatcher.process(&[0.1; 4]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for _ in 0..8 {
        dispatcher.process(&[0.1; 4]);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn silence_holds_partial_windows() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = beat_dispatcher(2, &calls);
    dispatcher.process(&[0.1; 4]);
    for _ in 0..10 {
        dispatcher.process(&[0.0; 4]);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    dispatcher.process(&[0.1; 4]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(dispatcher.silent_frames(), 10);
}

#[test]
fn extractors_share_one_sink_in_order() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = beat_dispatcher(1, &calls);
    let tempo = TempoSettings {
        window: Windowing {
            frame_multiplier: 1,
            hop_multiplier: 1.0,
        },
        ..TempoSettings::default()
    };
    dispatcher.push(Box::new(TempoExtractor::with_engine(
        Counting(Arc::clone(&calls)),
        &tempo,
        4,
    )));
    dispatcher.process(&[0.1; 4]);
    assert_eq!(
        dispatcher.sink().events,
        vec![
            MidiEvent::control_change(0, 15, 0),
            MidiEvent::sysex([0x1B, 0]),
            MidiEvent::control_change(0, 14, 60),
            MidiEvent::sysex([0x0B, 9, 48]),
        ]
    );
}

#[test]
fn default_pipeline_tracks_a_sustained_a4() {
    let settings = Settings::default();
    let frame_size = settings.soundcard.frame_size;
    let signal = sine(440.0, settings.soundcard.sample_rate, frame_size * 64);
    let mut dispatcher = Dispatcher::from_settings(&settings, RecordingSink::default()).unwrap();
    for frame in signal.chunks_exact(frame_size) {
        dispatcher.process(frame);
    }
    let sink = dispatcher.into_sink();

    assert_eq!(sink.control_values(20).first(), Some(&127));
    assert!(sink.events.contains(&MidiEvent::note_on(0, 69)));
    assert_eq!(sink.control_values(21), vec![69]);
    // 30 third-octave bands after the command byte
    assert!(sink.sysex_payloads().iter().any(|p| p[0] == 0x0F && p.len() == 31));
}

/// Minimal 16-bit PCM mono WAV.
fn wav_bytes(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut bytes = Vec::with_capacity(44 + samples.len() * 2);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVEfmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for s in samples {
        bytes.extend_from_slice(&((s * 32767.0) as i16).to_le_bytes());
    }
    bytes
}

#[test]
fn decoded_file_feeds_the_same_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a4.wav");
    let signal = sine(440.0, 22_050, 22_050);
    std::fs::write(&path, wav_bytes(&signal, 22_050)).unwrap();

    let (samples, sample_rate) = decode_file(&path).unwrap();
    assert_eq!(sample_rate, 22_050);
    assert_eq!(samples.len(), signal.len());
    assert!((samples[100] - signal[100]).abs() < 1e-3);

    let mut settings = Settings::default();
    settings.soundcard.sample_rate = sample_rate;
    let mut dispatcher = Dispatcher::from_settings(&settings, RecordingSink::default()).unwrap();
    for frame in samples.chunks_exact(settings.soundcard.frame_size) {
        dispatcher.process(frame);
    }
    assert!(dispatcher.sink().events.contains(&MidiEvent::note_on(0, 69)));
}
