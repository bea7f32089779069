//! Output channel allocation.
//!
//! A [`ChannelPool`] hands out at most `capacity` [`Slot`]s at a time. The
//! pool is shared by every sound in the process; a sound holds one slot
//! while it streams and returns it when it stops.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use parking_lot::{Condvar, Mutex};
use soundpool_core::{PcmBlock, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// Outcome of handing a block to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submit {
    /// Block accepted.
    Ack,
    /// Sink is full; the block was not taken and should be submitted again.
    Backpressure,
}

/// One leased output channel.
pub trait Slot: Send {
    /// Index of the channel within its pool.
    fn index(&self) -> usize;

    /// Hand a decoded block to the channel at the given gain.
    ///
    /// May block briefly while the sink catches up.
    fn submit(&mut self, block: &PcmBlock, volume: f32) -> Result<Submit>;

    /// Change the gain of audio already submitted, where the sink can.
    fn set_volume(&mut self, _volume: f32) {}

    /// True once everything submitted so far has been played.
    fn is_drained(&mut self) -> bool {
        true
    }

    /// Return the channel to its pool. Dropping a slot does the same.
    fn release(self: Box<Self>) {
        drop(self);
    }
}

/// A fixed-size, process-wide pool of output channels.
pub trait ChannelPool: Send + Sync {
    fn capacity(&self) -> usize;

    /// Channels currently free.
    fn available(&self) -> usize;

    /// Take a free channel, or `None` if all are in use.
    fn try_acquire(&self) -> Option<Box<dyn Slot>>;

    /// Wait up to `timeout` for a free channel.
    fn acquire_timeout(&self, timeout: Duration) -> Option<Box<dyn Slot>>;

    /// Wait for a free channel, however long it takes.
    ///
    /// Not cancellable; sounds use [`ChannelPool::acquire_timeout`] so a stop
    /// request can end the wait.
    fn acquire(&self) -> Box<dyn Slot> {
        loop {
            if let Some(slot) = self.acquire_timeout(Duration::from_secs(1)) {
                return slot;
            }
        }
    }
}

/// Counting semaphore over channel indices.
///
/// Waiters are woken one per release; which waiter wins is up to the OS.
pub struct ChannelSemaphore {
    free: Mutex<Vec<usize>>,
    released: Condvar,
    capacity: usize,
}

impl ChannelSemaphore {
    pub fn new(capacity: usize) -> Self {
        Self {
            // Reversed so index 0 is handed out first.
            free: Mutex::new((0..capacity).rev().collect()),
            released: Condvar::new(),
            capacity,
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    pub fn try_lease(self: &Arc<Self>) -> Option<ChannelLease> {
        let index = self.free.lock().pop()?;
        Some(self.lease(index))
    }

    pub fn lease_timeout(self: &Arc<Self>, timeout: Duration) -> Option<ChannelLease> {
        let deadline = Instant::now() + timeout;
        let mut free = self.free.lock();
        loop {
            if let Some(index) = free.pop() {
                drop(free);
                return Some(self.lease(index));
            }
            if self.released.wait_until(&mut free, deadline).timed_out() {
                let index = free.pop()?;
                drop(free);
                return Some(self.lease(index));
            }
        }
    }

    fn lease(self: &Arc<Self>, index: usize) -> ChannelLease {
        trace!("Channel {index} leased");
        ChannelLease {
            semaphore: Arc::clone(self),
            index,
        }
    }

    fn release(&self, index: usize) {
        {
            let mut free = self.free.lock();
            debug_assert!(!free.contains(&index), "channel {index} released twice");
            free.push(index);
        }
        self.released.notify_one();
        trace!("Channel {index} released");
    }
}

/// Ownership of one channel index; returns it to the semaphore on drop.
pub struct ChannelLease {
    semaphore: Arc<ChannelSemaphore>,
    index: usize,
}

impl ChannelLease {
    pub const fn index(&self) -> usize {
        self.index
    }
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        self.semaphore.release(self.index);
    }
}

impl std::fmt::Debug for ChannelLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelLease").field("index", &self.index).finish()
    }
}
