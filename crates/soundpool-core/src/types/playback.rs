//! Playback state and events.

/// Where a sound's worker is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PlaybackState {
    /// No worker running; ready for the next `play()`.
    #[default]
    Idle = 0,
    /// Worker started, waiting for (or trying) a channel slot.
    AcquiringChannel = 1,
    /// Decoding and submitting blocks.
    Streaming = 2,
    /// Source finished or stop requested; returning the slot.
    Draining = 3,
}

impl PlaybackState {
    /// Inverse of `self as u8`, for atomic storage.
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::AcquiringChannel,
            2 => Self::Streaming,
            3 => Self::Draining,
            _ => Self::Idle,
        }
    }

    pub const fn is_idle(self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Events emitted by a sound's worker.
///
/// Playback failures never reach the `play()` call site; this stream is the
/// only place they become visible.
#[derive(Debug, Clone, PartialEq)]
pub enum SoundEvent {
    /// Worker state changed.
    StateChanged(PlaybackState),
    /// No free channel and the caller did not ask to wait.
    ChannelUnavailable,
    /// Source played to the end.
    Finished { blocks: u64 },
    /// Stopped by request before the end.
    Stopped { blocks: u64 },
    /// Open or decode failure; the run ended early.
    Error(String),
}
