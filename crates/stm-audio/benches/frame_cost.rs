//! Per-frame DSP cost at the default settings (512-sample frames, 44.1 kHz).
//!
//! One frame lasts about 11.6 ms; everything here has to stay well below that
//! to keep up with the capture callback.

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use stm_audio::Dispatcher;
use stm_audio::engine::{FilterBank, PitchEngine, SpectralTransform};
use stm_audio::fft::PhaseVocoder;
use stm_audio::filterbank::TriangleFilterBank;
use stm_audio::yin::YinPitch;
use stm_core::Settings;
use stm_core::traits::MidiSink;

struct NullSink;

impl MidiSink for NullSink {
    fn control_change(&mut self, _controller: u8, _value: u8) {}
    fn note_on(&mut self, _note: u8) {}
    fn note_off(&mut self, _note: u8) {}
    fn sysex(&mut self, _command: &[u8], _data: &[u8]) {}
}

fn tone(len: usize, freq: f32, sample_rate: u32) -> Vec<f32> {
    (0..len)
        .map(|i| 0.5 * (std::f32::consts::TAU * freq * i as f32 / sample_rate as f32).sin())
        .collect()
}

fn bench_yin(c: &mut Criterion) {
    let settings = Settings::default();
    let sr = settings.soundcard.sample_rate;
    let frame = settings.soundcard.frame_size;
    let window = settings.pitch.window.window_size(frame);
    let hop = settings.pitch.window.hop_size(frame);
    let mut yin = YinPitch::new(window, hop, sr, settings.pitch.tolerance);
    let signal = tone(window, 440.0, sr);

    c.bench_function("yin_detect", |b| {
        b.iter(|| black_box(yin.detect(black_box(&signal))));
    });
}

fn bench_filterbank(c: &mut Criterion) {
    let settings = Settings::default();
    let sr = settings.soundcard.sample_rate;
    let frame = settings.soundcard.frame_size;
    let window = settings.frequencies.window.window_size(frame);
    let hop = settings.frequencies.window.hop_size(frame);
    let mut vocoder = PhaseVocoder::new(window, hop);
    let mut bank = TriangleFilterBank::new(settings.frequencies.bands.edges(), sr, window);
    let signal = tone(window, 1000.0, sr);

    let mut group = c.benchmark_group("bands");
    group.bench_function("phase_vocoder", |b| {
        b.iter(|| black_box(vocoder.transform(black_box(&signal)).len()));
    });
    group.bench_function("vocoder_and_filterbank", |b| {
        b.iter(|| {
            let spectrum = vocoder.transform(black_box(&signal)).to_vec();
            black_box(bank.apply(&spectrum)[0])
        });
    });
    group.finish();
}

fn bench_dispatcher(c: &mut Criterion) {
    let settings = Settings::default();
    let frame = settings.soundcard.frame_size;
    let signal = tone(frame * 64, 440.0, settings.soundcard.sample_rate);
    let Ok(mut dispatcher) = Dispatcher::from_settings(&settings, NullSink) else {
        panic!("réglages par défaut invalides");
    };
    let mut frames = signal.chunks_exact(frame).cycle();

    c.bench_function("dispatcher_frame", |b| {
        b.iter(|| {
            if let Some(f) = frames.next() {
                dispatcher.process(black_box(f));
            }
        });
    });
}

criterion_group!(benches, bench_yin, bench_filterbank, bench_dispatcher);
criterion_main!(benches);
