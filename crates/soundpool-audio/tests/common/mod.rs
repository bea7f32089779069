//! Test doubles: a channel pool that records every submit and a decoder
//! that produces numbered blocks.

#![allow(dead_code, clippy::unwrap_used)]

use parking_lot::Mutex;
use soundpool_audio::channel::ChannelLease;
use soundpool_audio::{ChannelPool, ChannelSemaphore, Decoder, Reader, Slot, Submit};
use soundpool_core::{Error, FileType, PcmBlock, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// One block as the pool saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct Submitted {
    pub channel: usize,
    /// First sample of the block; scripted blocks carry their index here.
    pub tag: f32,
    pub volume: f32,
}

#[derive(Default)]
pub struct PoolStats {
    pub submitted: Mutex<Vec<Submitted>>,
    pub held: AtomicUsize,
    pub peak_held: AtomicUsize,
}

impl PoolStats {
    pub fn tags(&self) -> Vec<f32> {
        self.submitted.lock().iter().map(|s| s.tag).collect()
    }

    pub fn count(&self) -> usize {
        self.submitted.lock().len()
    }
}

/// Pool that accepts blocks without playing them.
pub struct RecordingPool {
    semaphore: Arc<ChannelSemaphore>,
    pub stats: Arc<PoolStats>,
    submit_delay: Duration,
    /// Number of `Backpressure` answers each slot gives before its first ack.
    backpressure: usize,
}

impl RecordingPool {
    pub fn new(capacity: usize) -> Arc<Self> {
        Self::build(capacity, Duration::ZERO, 0)
    }

    /// Every submit takes `delay`, like a real sink pacing playback.
    pub fn paced(capacity: usize, delay: Duration) -> Arc<Self> {
        Self::build(capacity, delay, 0)
    }

    pub fn congested(capacity: usize, backpressure: usize) -> Arc<Self> {
        Self::build(capacity, Duration::ZERO, backpressure)
    }

    fn build(capacity: usize, submit_delay: Duration, backpressure: usize) -> Arc<Self> {
        Arc::new(Self {
            semaphore: Arc::new(ChannelSemaphore::new(capacity)),
            stats: Arc::new(PoolStats::default()),
            submit_delay,
            backpressure,
        })
    }

    fn slot(&self, lease: ChannelLease) -> Box<dyn Slot> {
        let held = self.stats.held.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak_held.fetch_max(held, Ordering::SeqCst);
        Box::new(RecordingSlot {
            lease,
            stats: Arc::clone(&self.stats),
            delay: self.submit_delay,
            backpressure_left: self.backpressure,
        })
    }
}

impl ChannelPool for RecordingPool {
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

struct RecordingSlot {
    lease: ChannelLease,
    stats: Arc<PoolStats>,
    delay: Duration,
    backpressure_left: usize,
}

impl Slot for RecordingSlot {
    fn index(&self) -> usize {
        self.lease.index()
    }

    fn submit(&mut self, block: &PcmBlock, volume: f32) -> Result<Submit> {
        if self.backpressure_left > 0 {
            self.backpressure_left -= 1;
            return Ok(Submit::Backpressure);
        }
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.stats.submitted.lock().push(Submitted {
            channel: self.lease.index(),
            tag: block.samples[0],
            volume,
        });
        Ok(Submit::Ack)
    }
}

impl Drop for RecordingSlot {
    fn drop(&mut self) {
        self.stats.held.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Decoder producing `blocks` blocks whose samples all equal the block index.
#[derive(Default)]
pub struct ScriptedDecoder {
    pub blocks: usize,
    /// Fail with a decode error instead of producing this block.
    pub fail_at: Option<usize>,
    /// Refuse to open at all.
    pub missing: bool,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
    pub paths: Mutex<Vec<PathBuf>>,
}

impl ScriptedDecoder {
    pub fn new(blocks: usize) -> Arc<Self> {
        Arc::new(Self {
            blocks,
            ..Self::default()
        })
    }

    pub fn failing_at(blocks: usize, fail_at: usize) -> Arc<Self> {
        Arc::new(Self {
            blocks,
            fail_at: Some(fail_at),
            ..Self::default()
        })
    }

    pub fn missing() -> Arc<Self> {
        Arc::new(Self {
            missing: true,
            ..Self::default()
        })
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Decoder for ScriptedDecoder {
    fn open(&self, path: &Path) -> Result<Box<dyn Reader>> {
        if self.missing {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        self.paths.lock().push(path.to_path_buf());
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedReader {
            next: 0,
            blocks: self.blocks,
            fail_at: self.fail_at,
            closed: Arc::clone(&self.closed),
        }))
    }
}

struct ScriptedReader {
    next: usize,
    blocks: usize,
    fail_at: Option<usize>,
    closed: Arc<AtomicUsize>,
}

impl Reader for ScriptedReader {
    fn file_type(&self) -> FileType {
        FileType::Wav
    }

    fn next_block(&mut self) -> Result<Option<PcmBlock>> {
        if self.fail_at == Some(self.next) {
            return Err(Error::AudioDecode(format!("bad frame at block {}", self.next)));
        }
        if self.next >= self.blocks {
            return Ok(None);
        }
        let tag = self.next as f32;
        self.next += 1;
        Ok(Some(PcmBlock::new(vec![tag; 4], 2, 48000)))
    }
}

impl Drop for ScriptedReader {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

pub const LONG: Duration = Duration::from_secs(5);
