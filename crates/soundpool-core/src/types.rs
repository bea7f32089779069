//! Core domain types for soundpool.

pub mod format;
pub mod pcm;
pub mod playback;

pub use format::FileType;
pub use pcm::PcmBlock;
pub use playback::{PlaybackState, SoundEvent};
