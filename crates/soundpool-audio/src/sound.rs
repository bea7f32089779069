//! Threaded sound playback.
//!
//! A [`Sound`] streams one file into one channel of a shared
//! [`ChannelPool`]. Each `play()` runs on a fresh worker thread:
//!
//! ```text
//! Idle -> AcquiringChannel -> Streaming -> Draining -> Idle
//! ```
//!
//! Failing to get a channel, failing to decode, reaching the end and being
//! stopped all end in `Idle` with the channel returned and the reader closed.
//! None of these are reported to the `play()` caller; subscribe to
//! [`Sound::events`] to observe them.

use crate::channel::{ChannelPool, Slot, Submit};
use crate::decode::{Decoder, Reader, SymphoniaDecoder};
use crate::state::SoundState;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use soundpool_core::{Error, FileType, PlaybackState, SoundEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

/// How often a waiting worker re-checks for a stop request.
const ACQUIRE_POLL: Duration = Duration::from_millis(20);

/// Per-sound settings.
#[derive(Debug, Clone)]
pub struct SoundConfig {
    /// Give up waiting for a channel after this long. `None` waits forever
    /// (a stop request still ends the wait).
    pub channel_timeout: Option<Duration>,
    /// Pause between submit attempts while the channel is full.
    pub backpressure_retry: Duration,
    pub initial_volume: f32,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            channel_timeout: None,
            backpressure_retry: Duration::from_millis(2),
            initial_volume: 1.0,
        }
    }
}

/// A playable sound bound to a file.
pub struct Sound {
    state: Arc<SoundState>,
    /// Serializes play/stop; holds the current worker, if any.
    worker: Mutex<Option<JoinHandle<()>>>,
    pool: Arc<dyn ChannelPool>,
    decoder: Arc<dyn Decoder>,
    config: SoundConfig,
}

impl Sound {
    /// Bind a sound to `file`, decoding MP3 and 16-bit WAV.
    pub fn new(file: impl Into<PathBuf>, pool: Arc<dyn ChannelPool>) -> Self {
        Self::with_decoder(file, pool, Arc::new(SymphoniaDecoder))
    }

    pub fn with_decoder(
        file: impl Into<PathBuf>,
        pool: Arc<dyn ChannelPool>,
        decoder: Arc<dyn Decoder>,
    ) -> Self {
        Self::with_config(file, pool, decoder, SoundConfig::default())
    }

    pub fn with_config(
        file: impl Into<PathBuf>,
        pool: Arc<dyn ChannelPool>,
        decoder: Arc<dyn Decoder>,
        config: SoundConfig,
    ) -> Self {
        let state = Arc::new(SoundState::new(file.into(), config.initial_volume));

        Self {
            state,
            worker: Mutex::new(None),
            pool,
            decoder,
            config,
        }
    }

    /// Replace the bound file.
    ///
    /// Stop the sound first; the new path is picked up by the next `play()`.
    pub fn set_file(&self, file: impl AsRef<Path>) {
        if self.state.is_playing() {
            warn!(
                "set_file({}) while playing; takes effect on next play()",
                file.as_ref().display()
            );
        }
        self.state.set_file(file.as_ref());
    }

    pub fn file(&self) -> PathBuf {
        self.state.file()
    }

    /// Start streaming the bound file.
    ///
    /// A run already in progress is stopped and joined first. With
    /// `wait_for_channel` the worker waits for a free channel; without it the
    /// run silently ends if the pool is full.
    pub fn play(&self, wait_for_channel: bool) {
        let mut worker = self.worker.lock();
        self.supersede(&mut worker);
        self.start(&mut worker, wait_for_channel);
    }

    /// Bind `file` and start streaming it, as [`Sound::set_file`] then
    /// [`Sound::play`].
    pub fn play_file(&self, file: impl AsRef<Path>, wait_for_channel: bool) {
        let mut worker = self.worker.lock();
        self.supersede(&mut worker);
        self.state.set_file(file.as_ref());
        self.start(&mut worker, wait_for_channel);
    }

    /// Stop playback and wait for the worker to release its channel.
    pub fn stop(&self) {
        let mut worker = self.worker.lock();
        self.supersede(&mut worker);
    }

    /// Block until the current run (if any) is back to `Idle`.
    pub fn wait(&self) {
        self.state.wait_idle(None);
    }

    /// [`Sound::wait`] with a limit; returns whether the sound is idle.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.state.wait_idle(Some(timeout))
    }

    pub fn set_volume(&self, volume: f32) {
        self.state.set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.state.volume()
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn state(&self) -> PlaybackState {
        self.state.playback()
    }

    /// Blocks submitted in the current or most recent run.
    pub fn position(&self) -> u64 {
        self.state.position()
    }

    /// Container of the most recently opened file.
    pub fn file_type(&self) -> FileType {
        self.state.file_type()
    }

    /// Wait policy of the current run; false once idle.
    pub fn wait_for_channel(&self) -> bool {
        self.state.wait_for_channel()
    }

    /// Subscribe to state changes and run outcomes.
    ///
    /// Each call returns an independent receiver that sees events emitted
    /// after it was created. Events are not queued for dropped receivers or
    /// when nobody subscribed.
    pub fn events(&self) -> Receiver<SoundEvent> {
        self.state.subscribe()
    }

    /// Stop and join the previous worker. Caller holds the worker lock.
    fn supersede(&self, worker: &mut Option<JoinHandle<()>>) {
        let Some(handle) = worker.take() else {
            return;
        };

        self.state.signal_ending();
        if handle.join().is_err() {
            // Its slot and reader were dropped during unwinding
            error!("Playback worker panicked");
            self.state.end_run();
        }
    }

    /// Spawn a worker for a new run. Caller holds the worker lock.
    fn start(&self, worker: &mut Option<JoinHandle<()>>, wait_for_channel: bool) {
        self.state.begin_run(wait_for_channel);

        let file = self.state.file();
        let run = Worker {
            state: Arc::clone(&self.state),
            pool: Arc::clone(&self.pool),
            decoder: Arc::clone(&self.decoder),
            config: self.config.clone(),
        };

        let name = file
            .file_name()
            .map_or_else(|| "sound".to_string(), |n| format!("sound-{}", n.to_string_lossy()));

        match thread::Builder::new().name(name).spawn(move || run.run()) {
            Ok(handle) => *worker = Some(handle),
            Err(e) => {
                let err = Error::Spawn(e.to_string());
                error!("{err}");
                self.state.emit(SoundEvent::Error(err.to_string()));
                self.state.end_run();
            }
        }
    }
}

impl Drop for Sound {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Sound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sound")
            .field("file", &self.state.file())
            .field("state", &self.state.playback())
            .field("volume", &self.state.volume())
            .field("position", &self.state.position())
            .finish_non_exhaustive()
    }
}

/// How a streaming run ended.
enum Outcome {
    Finished,
    Stopped,
    Failed(Error),
}

/// Everything one run of the worker thread owns.
struct Worker {
    state: Arc<SoundState>,
    pool: Arc<dyn ChannelPool>,
    decoder: Arc<dyn Decoder>,
    config: SoundConfig,
}

impl Worker {
    fn run(self) {
        let Some(slot) = self.acquire() else {
            if !self.state.is_ending() {
                debug!("No free channel for {}", self.state.file().display());
                self.state.emit(SoundEvent::ChannelUnavailable);
            }
            self.state.end_run();
            return;
        };

        let file = self.state.file();
        let reader = match self.decoder.open(&file) {
            Ok(reader) => reader,
            Err(e) => {
                report_failure(&file, &e);
                self.state.set_file_type(FileType::Unknown);
                slot.release();
                self.state.emit(SoundEvent::Error(e.to_string()));
                self.state.end_run();
                return;
            }
        };

        self.state.set_file_type(reader.file_type());
        self.state.set_playing(true);
        self.state.transition(PlaybackState::Streaming);
        debug!("Streaming {} on channel {}", file.display(), slot.index());

        self.finish(slot, reader);
    }

    /// Stream, then drain and release. The reader is closed before the slot
    /// goes back to the pool.
    fn finish(&self, mut slot: Box<dyn Slot>, mut reader: Box<dyn Reader>) {
        let outcome = self.stream(reader.as_mut(), slot.as_mut());

        self.state.set_playing(false);
        self.state.transition(PlaybackState::Draining);
        if matches!(outcome, Outcome::Finished) {
            self.drain(slot.as_mut());
        }

        drop(reader);
        slot.release();

        let blocks = self.state.position();
        let event = match outcome {
            Outcome::Finished if !self.state.is_ending() => SoundEvent::Finished { blocks },
            Outcome::Finished | Outcome::Stopped => SoundEvent::Stopped { blocks },
            Outcome::Failed(e) => {
                report_failure(&self.state.file(), &e);
                SoundEvent::Error(e.to_string())
            }
        };
        debug!("Run ended after {blocks} blocks: {event:?}");
        self.state.emit(event);
        self.state.end_run();
    }

    /// Get a channel according to the run's wait policy.
    fn acquire(&self) -> Option<Box<dyn Slot>> {
        if let Some(slot) = self.pool.try_acquire() {
            return Some(slot);
        }
        if !self.state.wait_for_channel() {
            return None;
        }

        debug!("All {} channels busy, waiting", self.pool.capacity());
        let deadline = self.config.channel_timeout.map(|t| Instant::now() + t);
        loop {
            if self.state.is_ending() {
                return None;
            }
            let poll = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return None;
                    }
                    left.min(ACQUIRE_POLL)
                }
                None => ACQUIRE_POLL,
            };
            if let Some(slot) = self.pool.acquire_timeout(poll) {
                return Some(slot);
            }
        }
    }

    fn stream(&self, reader: &mut dyn Reader, slot: &mut dyn Slot) -> Outcome {
        loop {
            if self.state.is_ending() {
                return Outcome::Stopped;
            }

            let block = match reader.next_block() {
                Ok(Some(block)) => block,
                Ok(None) => return Outcome::Finished,
                Err(e) => return Outcome::Failed(e),
            };
            if block.is_empty() {
                continue;
            }

            if self.state.is_ending() {
                return Outcome::Stopped;
            }

            loop {
                match slot.submit(&block, self.state.volume()) {
                    Ok(Submit::Ack) => break,
                    Ok(Submit::Backpressure) => {
                        if self.state.is_ending() {
                            return Outcome::Stopped;
                        }
                        thread::sleep(self.config.backpressure_retry);
                    }
                    Err(e) => return Outcome::Failed(e),
                }
            }

            let position = self.state.advance_position();
            trace!("Submitted block {position} ({} samples)", block.samples.len());
        }
    }

    /// Let the channel play out what it holds, unless told to stop.
    fn drain(&self, slot: &mut dyn Slot) {
        while !slot.is_drained() {
            if self.state.is_ending() {
                return;
            }
            slot.set_volume(self.state.volume());
            thread::sleep(self.config.backpressure_retry);
        }
    }
}

/// Bad files are the caller's problem; anything else is ours.
fn report_failure(file: &Path, e: &Error) {
    if e.is_source_error() {
        warn!("Cannot play {}: {e}", file.display());
    } else {
        error!("Playback of {} failed: {e}", file.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_default_config() {
        let config = SoundConfig::default();
        assert_eq!(config.channel_timeout, None);
        assert_eq!(config.initial_volume, 1.0);
    }
}
