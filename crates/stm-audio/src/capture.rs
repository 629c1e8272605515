use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use stm_core::config::SoundcardSettings;

use crate::dispatcher::FrameAssembler;
use crate::error::AudioError;

/// Device name that selects the platform default input.
pub const DEFAULT_DEVICE: &str = "default";

/// Names of every input device of the default host.
///
/// # Errors
/// Returns an error if the host cannot enumerate its devices.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    let mut names = Vec::new();
    for device in host.input_devices()? {
        match device.name() {
            Ok(name) => {
                let marker = if default_name.as_deref() == Some(name.as_str()) { " (default)" } else { "" };
                names.push(format!("{name}{marker}"));
            }
            Err(e) => log::debug!("Périphérique sans nom ignoré : {e}"),
        }
    }
    Ok(names)
}

/// Live audio capture via cpal.
///
/// The stream callback re-blocks device buffers into frames of exactly
/// `frame_size` samples of the first channel and hands each one to the
/// caller's closure, on the audio thread. Capture stops when this value is
/// dropped.
///
/// # Example
/// ```no_run
/// use stm_audio::capture::AudioCapture;
/// use stm_core::config::SoundcardSettings;
/// let capture = AudioCapture::open(&SoundcardSettings::default(), |frame| {
///     assert_eq!(frame.len(), 512);
/// }).unwrap();
/// ```
pub struct AudioCapture {
    stream: cpal::Stream,
    device_name: String,
    sample_rate: u32,
}

impl AudioCapture {
    /// Open the configured device and start the stream.
    ///
    /// # Errors
    /// Returns [`AudioError::NoInputDevice`] or [`AudioError::DeviceNotFound`]
    /// when no device matches, [`AudioError::StreamError`] if the stream
    /// cannot be built or started.
    pub fn open<F>(settings: &SoundcardSettings, mut on_frame: F) -> Result<Self, AudioError>
    where
        F: FnMut(&[f32]) + Send + 'static,
    {
        let host = cpal::default_host();
        let device = if settings.input_device == DEFAULT_DEVICE {
            host.default_input_device().ok_or(AudioError::NoInputDevice)?
        } else {
            host.input_devices()
                .map_err(|e| AudioError::StreamError(e.to_string()))?
                .find(|d| d.name().is_ok_and(|n| n == settings.input_device))
                .ok_or_else(|| AudioError::DeviceNotFound(settings.input_device.clone()))?
        };
        let device_name = device.name().unwrap_or_else(|_| settings.input_device.clone());

        let config = cpal::StreamConfig {
            channels: settings.channels,
            sample_rate: cpal::SampleRate(settings.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let mut assembler = FrameAssembler::new(settings.frame_size, usize::from(settings.channels));

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    assembler.push_interleaved(data, &mut on_frame);
                },
                |err| {
                    log::error!("Audio stream error: {err}");
                },
                None,
            )
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        log::info!(
            "Capture : {device_name}, {} canal(aux) @ {} Hz, frames de {}",
            settings.channels,
            settings.sample_rate,
            settings.frame_size
        );
        Ok(Self {
            stream,
            device_name,
            sample_rate: settings.sample_rate,
        })
    }

    /// Reference to the underlying cpal stream (kept alive for capture).
    pub fn stream(&self) -> &cpal::Stream {
        &self.stream
    }

    /// Name of the opened device.
    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// The sample rate of the capture stream.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
