//! Lock-free sample ring feeding one output channel.
//!
//! Single producer (the slot owner's playback thread) and single consumer
//! (the device callback). Ownership of the producer side moves between
//! threads as slots are leased; the lease hand-off goes through the channel
//! semaphore's mutex, which orders the writes.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

/// Lock-free single-producer, single-consumer ring of `f32` samples.
///
/// Samples are stored as their bit patterns in `AtomicU32` cells, so neither
/// side needs `unsafe` to touch the storage.
pub struct SampleRing {
    buffer: Box<[AtomicU32]>,
    read_pos: AtomicUsize,
    write_pos: AtomicUsize,
    /// Set by the producer; the consumer skips ahead to `discard_to`.
    discard: AtomicBool,
    discard_to: AtomicUsize,
    /// Applied when samples are consumed, so changes are heard at once.
    gain: AtomicU32,
    capacity: usize,
    mask: usize,
}

impl SampleRing {
    /// Create a new ring with the specified capacity.
    ///
    /// The capacity will be rounded up to the next power of 2.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2).next_power_of_two();
        let buffer = (0..capacity).map(|_| AtomicU32::new(0)).collect();

        Self {
            buffer,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
            discard: AtomicBool::new(false),
            discard_to: AtomicUsize::new(0),
            gain: AtomicU32::new(1.0f32.to_bits()),
            capacity,
            mask: capacity - 1,
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the number of samples waiting to be played.
    pub fn available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    /// Get the number of free slots for writing.
    pub fn free(&self) -> usize {
        self.capacity - self.available()
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Write samples to the ring. Producer side.
    ///
    /// Returns the number of samples actually written.
    pub fn write(&self, samples: &[f32]) -> usize {
        let write_pos = self.write_pos.load(Ordering::Relaxed);
        let read_pos = self.read_pos.load(Ordering::Acquire);

        let space = self.capacity - write_pos.wrapping_sub(read_pos);
        let to_write = samples.len().min(space);

        for (offset, sample) in samples[..to_write].iter().enumerate() {
            let idx = write_pos.wrapping_add(offset) & self.mask;
            self.buffer[idx].store(sample.to_bits(), Ordering::Relaxed);
        }

        self.write_pos
            .store(write_pos.wrapping_add(to_write), Ordering::Release);

        to_write
    }

    /// Drop everything written so far. Producer side.
    ///
    /// Takes effect on the consumer's next read; samples written after this
    /// call are kept.
    pub fn discard(&self) {
        let write_pos = self.write_pos.load(Ordering::Relaxed);
        self.discard_to.store(write_pos, Ordering::Relaxed);
        self.discard.store(true, Ordering::Release);
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    /// Scale every sample read from now on, including ones already queued.
    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.to_bits(), Ordering::Relaxed);
    }

    /// Add up to `output.len()` samples onto `output`. Consumer side.
    ///
    /// Returns the number of samples consumed.
    pub fn mix_into(&self, output: &mut [f32]) -> usize {
        let gain = self.gain();
        self.consume(output, |out, sample| *out += sample * gain)
    }

    /// Copy up to `output.len()` samples into `output`. Consumer side.
    pub fn read(&self, output: &mut [f32]) -> usize {
        let gain = self.gain();
        self.consume(output, |out, sample| *out = sample * gain)
    }

    fn consume(&self, output: &mut [f32], mut apply: impl FnMut(&mut f32, f32)) -> usize {
        let mut read_pos = self.read_pos.load(Ordering::Relaxed);

        if self.discard.swap(false, Ordering::Acquire) {
            let target = self.discard_to.load(Ordering::Relaxed);
            // Only ever move forward; the consumer may already be past target.
            if target.wrapping_sub(read_pos) <= self.capacity {
                read_pos = target;
                self.read_pos.store(read_pos, Ordering::Release);
            }
        }

        let write_pos = self.write_pos.load(Ordering::Acquire);
        let to_read = output.len().min(write_pos.wrapping_sub(read_pos));

        for (offset, out) in output[..to_read].iter_mut().enumerate() {
            let idx = read_pos.wrapping_add(offset) & self.mask;
            apply(out, f32::from_bits(self.buffer[idx].load(Ordering::Relaxed)));
        }

        self.read_pos
            .store(read_pos.wrapping_add(to_read), Ordering::Release);

        to_read
    }
}
