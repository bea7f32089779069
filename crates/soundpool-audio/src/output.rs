//! Audio output using cpal.
//!
//! One device stream sums every channel ring of the pool.

use crate::buffer::SampleRing;
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, SampleFormat, Stream, StreamConfig,
};
use soundpool_core::{Error, Result};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Sample layout the device expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
        }
    }
}

/// Running output stream. Not `Send`; keep it on the thread that built it.
pub struct AudioOutput {
    _stream: Stream,
    format: OutputFormat,
    device_name: String,
}

impl AudioOutput {
    /// Open the default output device and start mixing `rings` into it.
    pub fn new(rings: Arc<[Arc<SampleRing>]>) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::AudioOutput("No output device found".to_string()))?;

        Self::with_device(device, rings)
    }

    #[allow(clippy::needless_pass_by_value)] // Device is typically moved
    pub fn with_device(device: Device, rings: Arc<[Arc<SampleRing>]>) -> Result<Self> {
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get output config: {e}")))?;

        debug!("Supported output config: {:?}", supported_config);

        let sample_format = supported_config.sample_format();
        let config: StreamConfig = supported_config.into();

        let format = OutputFormat {
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        };

        let stream = match sample_format {
            SampleFormat::F32 => Self::build_stream::<f32>(&device, &config, rings)?,
            SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, rings)?,
            SampleFormat::U16 => Self::build_stream::<u16>(&device, &config, rings)?,
            _ => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {sample_format:?}"
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {e}")))?;

        info!(
            "Audio output started on {device_name}: {}Hz, {} channels",
            format.sample_rate, format.channels
        );

        Ok(Self {
            _stream: stream,
            format,
            device_name,
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &Device,
        config: &StreamConfig,
        rings: Arc<[Arc<SampleRing>]>,
    ) -> Result<Stream> {
        let err_fn = |err| {
            error!("Audio stream error: {err}");
        };

        // Grows to the largest callback size once, then reused.
        let mut mix: Vec<f32> = Vec::new();

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    mix.clear();
                    mix.resize(data.len(), 0.0);
                    for ring in rings.iter() {
                        ring.mix_into(&mut mix);
                    }
                    for (out, sample) in data.iter_mut().zip(&mix) {
                        *out = T::from_sample(soft_limit(*sample));
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {e}")))
    }

    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

/// Tanh limiting above 0.9 so summed channels do not hard-clip.
fn soft_limit(sample: f32) -> f32 {
    if sample.abs() > 0.9 {
        sample.tanh()
    } else {
        sample
    }
}

/// List available output devices.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();

    let devices: Vec<String> = host
        .output_devices()
        .map_err(|e| Error::AudioOutput(format!("Failed to list devices: {e}")))?
        .filter_map(|d| d.name().ok())
        .collect();

    Ok(devices)
}
