//! Hardware-backed channel pool.
//!
//! [`MixerPool`] owns the device stream on its own thread and exposes one
//! [`SampleRing`] per channel. A [`HardwareSlot`] converts blocks to the
//! device format and pushes them into its ring; the device callback sums
//! the rings.

use crate::buffer::SampleRing;
use crate::channel::{ChannelLease, ChannelPool, ChannelSemaphore, Slot, Submit};
use crate::output::{AudioOutput, OutputFormat};
use crate::resample::Resampler;
use crossbeam_channel::{bounded, Sender};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use soundpool_core::{Error, PcmBlock, Result, MAX_CHANNELS};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of channels; capped at [`MAX_CHANNELS`].
    pub channels: usize,
    /// Per-channel ring size in samples.
    pub ring_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            channels: MAX_CHANNELS,
            // ~0.34 s of 48kHz stereo
            ring_capacity: 32 * 1024,
        }
    }
}

static SHARED_POOL: OnceCell<Arc<MixerPool>> = OnceCell::new();

/// Channel pool playing through the default output device.
pub struct MixerPool {
    semaphore: Arc<ChannelSemaphore>,
    rings: Arc<[Arc<SampleRing>]>,
    format: OutputFormat,
    device_name: String,
    shutdown_tx: Sender<()>,
    output_thread: Mutex<Option<JoinHandle<()>>>,
}

impl MixerPool {
    /// Open the default output device with `config.channels` channels.
    pub fn new(config: PoolConfig) -> Result<Self> {
        if config.channels == 0 {
            return Err(Error::InvalidArgument("pool needs at least one channel".into()));
        }
        let channels = if config.channels > MAX_CHANNELS {
            warn!(
                "Requested {} channels, capping at {MAX_CHANNELS}",
                config.channels
            );
            MAX_CHANNELS
        } else {
            config.channels
        };

        let rings: Arc<[Arc<SampleRing>]> = (0..channels)
            .map(|_| Arc::new(SampleRing::new(config.ring_capacity)))
            .collect();

        let (init_tx, init_rx) = bounded(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        // cpal::Stream is not Send, so it lives and dies on this thread
        let output_rings = Arc::clone(&rings);
        let output_thread = std::thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || match AudioOutput::new(output_rings) {
                Ok(output) => {
                    let _ = init_tx.send(Ok((output.format(), output.device_name().to_string())));
                    // Blocks until shutdown is sent or the pool is dropped
                    let _ = shutdown_rx.recv();
                    debug!("Audio output thread shutting down");
                }
                Err(e) => {
                    error!("Failed to initialize audio output: {e}");
                    let _ = init_tx.send(Err(e));
                }
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn output thread: {e}")))?;

        let (format, device_name) = init_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Output thread exited during startup".into()))??;

        info!("Channel pool ready: {channels} channels on {device_name}");

        Ok(Self {
            semaphore: Arc::new(ChannelSemaphore::new(channels)),
            rings,
            format,
            device_name,
            shutdown_tx,
            output_thread: Mutex::new(Some(output_thread)),
        })
    }

    /// The process-wide pool, opened with default settings on first use.
    pub fn shared() -> Result<Arc<Self>> {
        SHARED_POOL
            .get_or_try_init(|| Self::new(PoolConfig::default()).map(Arc::new))
            .cloned()
    }

    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn slot(&self, lease: ChannelLease) -> Box<dyn Slot> {
        let ring = Arc::clone(&self.rings[lease.index()]);
        Box::new(HardwareSlot::new(lease, ring, self.format))
    }
}

impl ChannelPool for MixerPool {
    fn capacity(&self) -> usize {
        self.semaphore.capacity()
    }

    fn available(&self) -> usize {
        self.semaphore.available()
    }

    fn try_acquire(&self) -> Option<Box<dyn Slot>> {
        self.semaphore.try_lease().map(|lease| self.slot(lease))
    }

    fn acquire_timeout(&self, timeout: Duration) -> Option<Box<dyn Slot>> {
        self.semaphore
            .lease_timeout(timeout)
            .map(|lease| self.slot(lease))
    }
}

impl Drop for MixerPool {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.output_thread.lock().take() {
            if handle.join().is_err() {
                error!("Audio output thread panicked");
            }
        }
    }
}

/// One leased mixer channel.
///
/// Samples enter the ring at unit gain; the volume is the ring's gain,
/// applied by the device callback.
pub struct HardwareSlot {
    ring: Arc<SampleRing>,
    format: OutputFormat,
    resampler: Option<Resampler>,
    /// Converted samples that did not fit in the ring yet.
    pending: Vec<f32>,
    lease: ChannelLease,
}

impl HardwareSlot {
    pub const fn new(lease: ChannelLease, ring: Arc<SampleRing>, format: OutputFormat) -> Self {
        Self {
            ring,
            format,
            resampler: None,
            pending: Vec::new(),
            lease,
        }
    }

    /// Push as much of `pending` as fits; true when it is empty.
    fn flush_pending(&mut self) -> bool {
        if !self.pending.is_empty() {
            let written = self.ring.write(&self.pending);
            self.pending.drain(..written);
        }
        self.pending.is_empty()
    }

    fn convert(&mut self, block: &PcmBlock) -> Result<Vec<f32>> {
        let channels = usize::from(self.format.channels);
        let remixed = remix(&block.samples, usize::from(block.channels), channels);

        if block.sample_rate == self.format.sample_rate {
            return Ok(remixed);
        }

        let stale = self
            .resampler
            .as_ref()
            .map_or(true, |r| r.input_rate() != block.sample_rate);
        if stale {
            self.resampler = Some(Resampler::new(
                block.sample_rate,
                self.format.sample_rate,
                channels,
            )?);
        }
        match self.resampler.as_mut() {
            Some(resampler) => resampler.process(&remixed),
            None => Ok(remixed),
        }
    }
}

impl Slot for HardwareSlot {
    fn index(&self) -> usize {
        self.lease.index()
    }

    fn submit(&mut self, block: &PcmBlock, volume: f32) -> Result<Submit> {
        self.ring.set_gain(volume);
        if !self.flush_pending() {
            return Ok(Submit::Backpressure);
        }

        self.pending = self.convert(block)?;
        self.flush_pending();

        Ok(Submit::Ack)
    }

    fn set_volume(&mut self, volume: f32) {
        self.ring.set_gain(volume);
    }

    fn is_drained(&mut self) -> bool {
        if let Some(mut resampler) = self.resampler.take() {
            match resampler.flush() {
                Ok(tail) => self.pending.extend(tail),
                Err(e) => warn!("Dropping resampler tail: {e}"),
            }
        }
        self.flush_pending() && self.ring.is_empty()
    }
}

impl Drop for HardwareSlot {
    fn drop(&mut self) {
        // Silence whatever is still queued so the next owner starts clean
        self.ring.discard();
        self.ring.set_gain(1.0);
    }
}

/// Map interleaved samples from `from` channels to `to` channels.
///
/// Mono is copied to every output channel, anything to mono is averaged,
/// otherwise channels wrap around.
fn remix(samples: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }

    let frames = samples.len() / from;
    let mut output = Vec::with_capacity(frames * to);
    for frame in samples.chunks_exact(from) {
        if to == 1 {
            output.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            output.extend((0..to).map(|ch| frame[ch % from]));
        }
    }
    output
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn leased_slot(
        capacity: usize,
        format: OutputFormat,
    ) -> (Arc<ChannelSemaphore>, Arc<SampleRing>, HardwareSlot) {
        let semaphore = Arc::new(ChannelSemaphore::new(1));
        let ring = Arc::new(SampleRing::new(capacity));
        let lease = semaphore.try_lease().unwrap();
        let slot = HardwareSlot::new(lease, Arc::clone(&ring), format);
        (semaphore, ring, slot)
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_remix() {
        assert_eq!(remix(&[0.5, 0.25], 1, 2), vec![0.5, 0.5, 0.25, 0.25]);
        assert_eq!(remix(&[0.5, 0.25], 2, 1), vec![0.375]);
        assert_eq!(remix(&[0.1, 0.2], 2, 2), vec![0.1, 0.2]);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_submit_applies_volume() {
        let (_semaphore, ring, mut slot) = leased_slot(64, OutputFormat::default());
        let block = PcmBlock::new(vec![0.5; 8], 2, 48000);

        assert_eq!(slot.submit(&block, 0.5).unwrap(), Submit::Ack);

        let mut out = [0.0f32; 8];
        assert_eq!(ring.read(&mut out), 8);
        assert_eq!(out, [0.25; 8]);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_volume_change_reaches_queued_samples() {
        let (_semaphore, ring, mut slot) = leased_slot(64, OutputFormat::default());
        let block = PcmBlock::new(vec![0.5; 16], 2, 48000);
        // Four blocks fill the ring, the fifth waits in pending
        for _ in 0..5 {
            assert_eq!(slot.submit(&block, 1.0).unwrap(), Submit::Ack);
        }
        assert_eq!(slot.submit(&block, 0.0).unwrap(), Submit::Backpressure);

        let mut out = [1.0f32; 64];
        assert_eq!(ring.read(&mut out), 64);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_backpressure_when_ring_full() {
        let (_semaphore, ring, mut slot) = leased_slot(8, OutputFormat::default());
        let block = PcmBlock::new(vec![0.1; 6], 2, 48000);

        assert_eq!(slot.submit(&block, 1.0).unwrap(), Submit::Ack);
        // 2 of 6 fit; the rest stays pending
        assert_eq!(slot.submit(&block, 1.0).unwrap(), Submit::Ack);
        assert_eq!(slot.submit(&block, 1.0).unwrap(), Submit::Backpressure);
        assert!(!slot.is_drained());

        let mut out = [0.0f32; 8];
        ring.read(&mut out);
        assert!(!slot.is_drained());
        ring.read(&mut out);
        assert!(slot.is_drained());
    }

    #[test]
    fn test_drop_returns_channel_and_discards() {
        let (semaphore, ring, mut slot) = leased_slot(64, OutputFormat::default());
        slot.submit(&PcmBlock::new(vec![0.1; 16], 2, 48000), 0.3).unwrap();
        assert_eq!(semaphore.available(), 0);

        Box::new(slot).release();

        assert_eq!(semaphore.available(), 1);
        let mut out = [0.0f32; 16];
        assert_eq!(ring.read(&mut out), 0);
        assert_eq!(ring.gain().to_bits(), 1.0f32.to_bits());
    }

    #[test]
    fn test_resamples_to_device_rate() {
        let format = OutputFormat {
            sample_rate: 48000,
            channels: 1,
        };
        let (_semaphore, ring, mut slot) = leased_slot(16 * 1024, format);
        let block = PcmBlock::new(vec![0.0; 2048], 1, 24000);

        assert_eq!(slot.submit(&block, 1.0).unwrap(), Submit::Ack);
        assert_eq!(ring.available(), 4096);
    }
}
