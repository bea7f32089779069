//! # soundpool-audio
//!
//! Threaded sound playback over a fixed pool of hardware output channels.
//!
//! Features:
//! - One worker thread per playing [`Sound`], restarted safely on replay
//! - Shared pool of up to 24 output channels, with fail-fast or blocking
//!   acquisition
//! - Lock-free volume and state queries from any thread
//! - Symphonia decoding (MP3, 16-bit PCM WAV) and cpal output

pub mod buffer;
pub mod channel;
pub mod decode;
pub mod mixer;
pub mod output;
pub mod resample;
pub mod sound;
pub mod state;

pub use channel::{ChannelPool, ChannelSemaphore, Slot, Submit};
pub use decode::{Decoder, Reader, SymphoniaDecoder};
pub use mixer::{MixerPool, PoolConfig};
pub use sound::{Sound, SoundConfig};
pub use soundpool_core::{Error, FileType, PcmBlock, PlaybackState, Result, SoundEvent};
