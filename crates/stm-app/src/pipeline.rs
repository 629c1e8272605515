use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use stm_audio::Dispatcher;
use stm_audio::capture::AudioCapture;
use stm_audio::decode::decode_file;
use stm_core::Settings;
use stm_midi::MidiProcessor;
use stm_midi::decode::FeatureDecoder;
use stm_midi::monitor::Monitor;

/// Pause between checks of the shutdown flag.
const POLL: Duration = Duration::from_millis(100);

/// What a file run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileReport {
    /// Frames fed to the dispatcher.
    pub frames: usize,
    /// Frames skipped as silence.
    pub silent_frames: u64,
    /// MIDI messages produced.
    pub messages: u64,
}

fn build_dispatcher(settings: &Settings) -> Result<Dispatcher<MidiProcessor>> {
    let processor =
        MidiProcessor::from_settings(settings).context("Initialisation de la sortie MIDI")?;
    Dispatcher::from_settings(settings, processor).context("Construction des extracteurs")
}

/// Capture the configured input until `running` goes false.
///
/// The dispatcher moves into the audio callback. A missing input device is
/// logged and ends the run without error.
///
/// # Errors
/// Returns an error if the settings are invalid or the echo cannot start.
pub fn run_live(settings: &Settings, running: &AtomicBool) -> Result<()> {
    let mut dispatcher = build_dispatcher(settings)?;
    let capture = match AudioCapture::open(&settings.soundcard, move |frame| {
        dispatcher.process(frame);
    }) {
        Ok(capture) => capture,
        Err(e) => {
            log::warn!("Pas de capture audio : {e}");
            return Ok(());
        }
    };

    eprintln!(
        "Écoute de « {} » à {} Hz. Ctrl-C pour quitter.",
        capture.device_name(),
        capture.sample_rate()
    );
    while running.load(Ordering::SeqCst) {
        thread::sleep(POLL);
    }
    drop(capture);
    log::info!("Capture arrêtée");
    Ok(())
}

/// Feed a decoded audio file through the same extractors as live input.
///
/// The file's own sample rate replaces the configured one. With `realtime`,
/// each frame waits for its due time so a downstream device sees live pacing.
///
/// # Errors
/// Returns an error if the file cannot be decoded or the settings are invalid.
pub fn run_file(
    settings: &Settings,
    path: &Path,
    realtime: bool,
    running: &AtomicBool,
) -> Result<FileReport> {
    let (samples, sample_rate) = decode_file(path)?;
    let mut settings = settings.clone();
    if settings.soundcard.sample_rate != sample_rate {
        log::info!(
            "Fréquence du fichier : {sample_rate} Hz (configurée : {} Hz)",
            settings.soundcard.sample_rate
        );
        settings.soundcard.sample_rate = sample_rate;
    }
    let mut dispatcher = build_dispatcher(&settings)?;

    let frame_size = settings.soundcard.frame_size;
    let period = Duration::from_secs_f64(frame_size as f64 / f64::from(sample_rate));
    let start = Instant::now();
    let mut frames = 0;
    for frame in samples.chunks_exact(frame_size) {
        if !running.load(Ordering::SeqCst) {
            log::info!("Analyse interrompue");
            break;
        }
        dispatcher.process(frame);
        frames += 1;
        if realtime {
            let due = period.mul_f64(frames as f64);
            let wait = due.saturating_sub(start.elapsed());
            if !wait.is_zero() {
                thread::sleep(wait);
            }
        }
    }

    let report = FileReport {
        frames,
        silent_frames: dispatcher.silent_frames(),
        messages: dispatcher.sink().sent(),
    };
    log::info!(
        "{} : {} frames ({} silencieuses), {} messages MIDI",
        path.display(),
        report.frames,
        report.silent_frames,
        report.messages
    );
    Ok(report)
}

/// Print the readings decoded from an input port until `running` goes false.
///
/// # Errors
/// Returns an error if the port cannot be opened.
pub fn run_monitor(settings: &Settings, port: &str, running: &AtomicBool) -> Result<()> {
    let (tx, rx) = flume::bounded(256);
    let monitor = Monitor::connect(port, FeatureDecoder::new(settings), move |line| {
        let _ = tx.try_send(line);
    })
    .with_context(|| format!("Impossible d'écouter le port MIDI « {port} »"))?;

    eprintln!(
        "Réception sur « {} », canal {}. Ctrl-C pour quitter.",
        monitor.port_name(),
        settings.midi.out_channel
    );
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL) {
            Ok(line) => println!("{line}"),
            Err(flume::RecvTimeoutError::Timeout) => {}
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(samples: &[f32], sample_rate: u32) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let mut bytes = Vec::new();
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

    fn offline() -> Settings {
        let mut settings = Settings::default();
        settings.midi.enabled = false;
        settings
    }

    #[test]
    fn file_run_counts_frames_and_silence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("half_silent.wav");
        let mut signal: Vec<f32> = (0..8192)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44_100.0).sin())
            .collect();
        signal.extend(std::iter::repeat_n(0.0, 4096));
        std::fs::write(&path, wav_bytes(&signal, 44_100)).unwrap();

        let report = run_file(&offline(), &path, false, &AtomicBool::new(true)).unwrap();
        assert_eq!(report.frames, 24);
        assert_eq!(report.silent_frames, 8);
        assert!(report.messages > 0);
    }

    #[test]
    fn stopped_flag_processes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        std::fs::write(&path, wav_bytes(&[0.25; 4096], 44_100)).unwrap();

        let report = run_file(&offline(), &path, false, &AtomicBool::new(false)).unwrap();
        assert_eq!(report.frames, 0);
        assert_eq!(report.messages, 0);
    }

    #[test]
    fn missing_file_is_reported() {
        let result = run_file(
            &offline(),
            Path::new("/nonexistent/tone.wav"),
            false,
            &AtomicBool::new(true),
        );
        assert!(result.is_err());
    }
}
