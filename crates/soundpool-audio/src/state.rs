//! State shared between a sound's controller and its worker thread.
//!
//! Everything the controller and the worker both touch lives here, as an
//! atomic or behind a short lock that the decode loop never holds across a
//! block.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex, RwLock};
use soundpool_core::{FileType, PlaybackState, SoundEvent};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

pub struct SoundState {
    file: RwLock<PathBuf>,
    /// f32 bit pattern.
    volume: AtomicU32,
    file_type: AtomicU8,
    playback: AtomicU8,
    playing: AtomicBool,
    wait_for_channel: AtomicBool,
    ending: AtomicBool,
    /// Blocks submitted in the current or most recent run.
    position: AtomicU64,
    /// Guards transitions into `Idle` so `wait_idle` cannot miss one.
    idle_lock: Mutex<()>,
    became_idle: Condvar,
    /// One sender per live `events()` receiver.
    subscribers: Mutex<Vec<Sender<SoundEvent>>>,
}

impl SoundState {
    pub fn new(file: PathBuf, volume: f32) -> Self {
        Self {
            file: RwLock::new(file),
            volume: AtomicU32::new(volume.to_bits()),
            file_type: AtomicU8::new(FileType::Unknown as u8),
            playback: AtomicU8::new(PlaybackState::Idle as u8),
            playing: AtomicBool::new(false),
            wait_for_channel: AtomicBool::new(false),
            ending: AtomicBool::new(false),
            position: AtomicU64::new(0),
            idle_lock: Mutex::new(()),
            became_idle: Condvar::new(),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn file(&self) -> PathBuf {
        self.file.read().clone()
    }

    pub fn set_file(&self, file: &Path) {
        *self.file.write() = file.to_path_buf();
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    pub fn file_type(&self) -> FileType {
        FileType::from_u8(self.file_type.load(Ordering::Acquire))
    }

    pub fn set_file_type(&self, file_type: FileType) {
        self.file_type.store(file_type as u8, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    pub fn wait_for_channel(&self) -> bool {
        self.wait_for_channel.load(Ordering::Acquire)
    }

    pub fn is_ending(&self) -> bool {
        self.ending.load(Ordering::Acquire)
    }

    /// Ask the worker to stop at its next safe point.
    pub fn signal_ending(&self) {
        self.ending.store(true, Ordering::Release);
    }

    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    pub fn advance_position(&self) -> u64 {
        self.position.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn playback(&self) -> PlaybackState {
        PlaybackState::from_u8(self.playback.load(Ordering::Acquire))
    }

    /// Reset per-run flags and enter `AcquiringChannel`.
    ///
    /// Only called by the controller with no worker alive.
    pub fn begin_run(&self, wait_for_channel: bool) {
        self.ending.store(false, Ordering::Release);
        self.wait_for_channel
            .store(wait_for_channel, Ordering::Release);
        self.position.store(0, Ordering::Release);
        self.transition(PlaybackState::AcquiringChannel);
    }

    /// Back to the quiescent state after a run, however it ended.
    pub fn end_run(&self) {
        self.playing.store(false, Ordering::Release);
        self.wait_for_channel.store(false, Ordering::Release);
        self.transition(PlaybackState::Idle);
    }

    pub fn transition(&self, next: PlaybackState) {
        // Waiters must see the Idle event queued by the time they wake
        let _guard = next.is_idle().then(|| self.idle_lock.lock());

        let previous = PlaybackState::from_u8(self.playback.swap(next as u8, Ordering::AcqRel));
        if previous != next {
            debug!("State changed: {:?} -> {:?}", previous, next);
            self.emit(SoundEvent::StateChanged(next));
        }

        if next.is_idle() {
            self.became_idle.notify_all();
        }
    }

    /// Block until the state is `Idle`, or `timeout` passes.
    ///
    /// Returns whether the state is `Idle`.
    pub fn wait_idle(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = self.idle_lock.lock();
        while !self.playback().is_idle() {
            match deadline {
                Some(deadline) => {
                    if self.became_idle.wait_until(&mut guard, deadline).timed_out() {
                        return self.playback().is_idle();
                    }
                }
                None => self.became_idle.wait(&mut guard),
            }
        }
        true
    }

    /// New receiver for every event emitted from now on.
    pub fn subscribe(&self) -> Receiver<SoundEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver to every live subscriber, forgetting dropped ones.
    pub fn emit(&self, event: SoundEvent) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
