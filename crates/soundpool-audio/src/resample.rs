//! Sample-rate conversion using rubato.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use rubato::{FftFixedIn, Resampler as RubatoResampler};
use soundpool_core::{Error, Result};
use tracing::debug;

const CHUNK_FRAMES: usize = 1024;

/// Streaming resampler for interleaved blocks.
///
/// Input is buffered until a full chunk is available, so early calls to
/// [`Resampler::process`] may return nothing; [`Resampler::flush`] pushes
/// out whatever remains at the end of a stream.
pub struct Resampler {
    inner: FftFixedIn<f32>,
    input_rate: u32,
    output_rate: u32,
    channels: usize,
    /// Deinterleaved input not yet processed.
    pending: Vec<Vec<f32>>,
}

impl Resampler {
    pub fn new(input_rate: u32, output_rate: u32, channels: usize) -> Result<Self> {
        if channels == 0 || input_rate == 0 || output_rate == 0 {
            return Err(Error::InvalidArgument(format!(
                "cannot resample {channels} channels at {input_rate} -> {output_rate} Hz"
            )));
        }

        let inner = FftFixedIn::new(
            input_rate as usize,
            output_rate as usize,
            CHUNK_FRAMES,
            2,
            channels,
        )
        .map_err(|e| Error::Resample(format!("Failed to create resampler: {e}")))?;

        debug!("Resampler created: {input_rate}Hz -> {output_rate}Hz, {channels} channels");

        Ok(Self {
            inner,
            input_rate,
            output_rate,
            channels,
            pending: vec![Vec::new(); channels],
        })
    }

    pub const fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub const fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Frames buffered but not yet converted.
    pub fn buffered_frames(&self) -> usize {
        self.pending[0].len()
    }

    /// Feed interleaved samples; returns whatever full chunks produced.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        for frame in input.chunks_exact(self.channels) {
            for (buffer, sample) in self.pending.iter_mut().zip(frame) {
                buffer.push(*sample);
            }
        }

        let mut output = Vec::new();
        while self.pending[0].len() >= CHUNK_FRAMES {
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|ch| ch.drain(..CHUNK_FRAMES).collect())
                .collect();
            let resampled = self.run(&chunk)?;
            interleave_into(&resampled, usize::MAX, &mut output);
        }

        Ok(output)
    }

    /// Convert the buffered tail, padding the last chunk with silence.
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        let remaining = self.buffered_frames();
        if remaining == 0 {
            return Ok(Vec::new());
        }

        let chunk: Vec<Vec<f32>> = self
            .pending
            .iter_mut()
            .map(|ch| {
                let mut data = std::mem::take(ch);
                data.resize(CHUNK_FRAMES, 0.0);
                data
            })
            .collect();
        let resampled = self.run(&chunk)?;

        // Only take the non-padded portion
        let frames = (remaining as f64 * f64::from(self.output_rate) / f64::from(self.input_rate))
            .round() as usize;
        let mut output = Vec::with_capacity(frames * self.channels);
        interleave_into(&resampled, frames, &mut output);
        Ok(output)
    }

    pub fn reset(&mut self) {
        self.inner.reset();
        self.pending.iter_mut().for_each(Vec::clear);
    }

    fn run(&mut self, chunk: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        self.inner
            .process(chunk, None)
            .map_err(|e| Error::Resample(format!("Resample failed: {e}")))
    }
}

fn interleave_into(channels: &[Vec<f32>], max_frames: usize, output: &mut Vec<f32>) {
    let Some(first) = channels.first() else {
        return;
    };
    for frame in 0..first.len().min(max_frames) {
        for ch in channels {
            output.push(ch[frame]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resampler_creation() {
        let resampler = Resampler::new(44100, 48000, 2).unwrap();
        assert_eq!(resampler.input_rate(), 44100);
        assert_eq!(resampler.output_rate(), 48000);
        assert_eq!(resampler.channels(), 2);
    }

    #[test]
    fn test_rejects_zero_channels() {
        assert!(Resampler::new(44100, 48000, 0).is_err());
    }

    #[test]
    fn test_buffers_partial_chunks() {
        let mut resampler = Resampler::new(44100, 48000, 2).unwrap();
        let out = resampler.process(&[0.1; 200]).unwrap();
        assert!(out.is_empty());
        assert_eq!(resampler.buffered_frames(), 100);
    }

    #[test]
    fn test_process_and_flush_length() {
        let mut resampler = Resampler::new(24000, 48000, 1).unwrap();
        let mut total = resampler.process(&vec![0.0; 3000]).unwrap().len();
        total += resampler.flush().unwrap().len();

        // Roughly doubled; the FFT resampler adds some delay at the start.
        assert!(total > 5000 && total <= 6200, "got {total}");
        assert_eq!(resampler.buffered_frames(), 0);
    }
}
