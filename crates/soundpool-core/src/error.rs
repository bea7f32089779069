//! Error types for soundpool.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using soundpool's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for soundpool.
#[derive(Error, Debug)]
pub enum Error {
    // Source errors
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt audio stream: {0}")]
    Corrupt(String),

    // Audio errors
    #[error("Audio decode error: {0}")]
    AudioDecode(String),

    #[error("Audio output error: {0}")]
    AudioOutput(String),

    #[error("Resample error: {0}")]
    Resample(String),

    // Engine errors
    #[error("Failed to spawn playback thread: {0}")]
    Spawn(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Returns true if the error came from the audio source itself
    /// (missing, unsupported or damaged file) rather than the output path.
    pub const fn is_source_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::UnsupportedFormat(_) | Self::Corrupt(_) | Self::AudioDecode(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_errors() {
        assert!(Error::NotFound(PathBuf::from("a.wav")).is_source_error());
        assert!(Error::UnsupportedFormat("ogg".into()).is_source_error());
        assert!(Error::Corrupt("bad header".into()).is_source_error());
        assert!(!Error::AudioOutput("no device".into()).is_source_error());
    }

    #[test]
    fn test_error_display() {
        let err = Error::NotFound(PathBuf::from("sfx/jump.wav"));
        assert_eq!(err.to_string(), "File not found: sfx/jump.wav");

        let err = Error::UnsupportedFormat("flac".into());
        assert_eq!(err.to_string(), "Unsupported audio format: flac");
    }
}
