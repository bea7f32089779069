//! Container format detection.

use std::fmt;

/// Container kind of an audio source, resolved when the source is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum FileType {
    /// Not opened yet, or not recognised.
    #[default]
    Unknown = 0,
    /// MPEG-1/2 Layer III.
    Mp3 = 1,
    /// RIFF/WAVE carrying 16-bit PCM.
    Wav = 2,
}

impl FileType {
    /// Number of leading bytes `detect` needs to see.
    pub const HEADER_LEN: usize = 12;

    /// Identify the container from the first bytes of a file.
    ///
    /// Returns `FileType::Unknown` when nothing matches.
    pub fn detect(header: &[u8]) -> Self {
        if header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WAVE" {
            return Self::Wav;
        }
        if header.starts_with(b"ID3") || is_mpeg_layer3_sync(header) {
            return Self::Mp3;
        }
        Self::Unknown
    }

    /// File extension used as a probe hint.
    pub const fn extension(self) -> Option<&'static str> {
        match self {
            Self::Unknown => None,
            Self::Mp3 => Some("mp3"),
            Self::Wav => Some("wav"),
        }
    }

    pub const fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Inverse of `self as u8`, for atomic storage.
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Mp3,
            2 => Self::Wav,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Mp3 => "MP3",
            Self::Wav => "WAV (16-bit PCM)",
        };
        f.write_str(name)
    }
}

/// MPEG audio frame header: 11 sync bits, a valid version and layer III.
fn is_mpeg_layer3_sync(header: &[u8]) -> bool {
    if header.len() < 2 {
        return false;
    }
    let sync = header[0] == 0xFF && header[1] & 0xE0 == 0xE0;
    let version = (header[1] >> 3) & 0b11;
    let layer = (header[1] >> 1) & 0b11;
    sync && version != 0b01 && layer == 0b01
}
