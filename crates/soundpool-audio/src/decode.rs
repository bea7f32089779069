//! Audio decoding using symphonia.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use soundpool_core::{Error, FileType, PcmBlock, Result};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{self, DecoderOptions, CODEC_TYPE_NULL, CODEC_TYPE_PCM_S16LE},
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader},
    io::{MediaSourceStream, MediaSourceStreamOptions},
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::{debug, trace};

/// Opens audio sources.
pub trait Decoder: Send + Sync {
    /// Detect the container of `path` and open a reader positioned at the
    /// first sample.
    fn open(&self, path: &Path) -> Result<Box<dyn Reader>>;
}

/// A lazy, finite, non-restartable sequence of PCM blocks.
pub trait Reader: Send {
    fn file_type(&self) -> FileType;

    /// Decode the next block; `Ok(None)` at end of stream.
    fn next_block(&mut self) -> Result<Option<PcmBlock>>;
}

/// Decoder for MP3 and 16-bit PCM WAV files.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDecoder;

impl Decoder for SymphoniaDecoder {
    fn open(&self, path: &Path) -> Result<Box<dyn Reader>> {
        Ok(Box::new(FileReader::open(path)?))
    }
}

/// Streaming reader over one open file.
pub struct FileReader {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn codecs::Decoder>,
    track_id: u32,
    file_type: FileType,
    sample_buf: Option<SampleBuffer<f32>>,
}

impl FileReader {
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;

        let file_type = sniff(&mut file)?;
        if !file_type.is_known() {
            return Err(Error::UnsupportedFormat(format!(
                "unrecognised container in {}",
                path.display()
            )));
        }

        let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        if let Some(ext) = file_type.extension() {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::Corrupt(format!("Failed to probe {file_type}: {e}")))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Corrupt("No audio tracks found".to_string()))?;

        if file_type == FileType::Wav && track.codec_params.codec != CODEC_TYPE_PCM_S16LE {
            return Err(Error::UnsupportedFormat(format!(
                "WAV must be 16-bit PCM, found {} bits per sample",
                track.codec_params.bits_per_sample.unwrap_or(0)
            )));
        }

        let track_id = track.id;
        debug!(
            "Opened {}: {file_type}, track={track_id}, rate={:?}, channels={:?}",
            path.display(),
            track.codec_params.sample_rate,
            track.codec_params.channels.map(|c| c.count())
        );

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::UnsupportedFormat(format!("No codec for {file_type}: {e}")))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            file_type,
            sample_buf: None,
        })
    }
}

impl Reader for FileReader {
    fn file_type(&self) -> FileType {
        self.file_type
    }

    fn next_block(&mut self) -> Result<Option<PcmBlock>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(None),
                Err(e) => return Err(Error::Corrupt(format!("Failed to read packet: {e}"))),
            };

            // Skip packets for other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = self
                .decoder
                .decode(&packet)
                .map_err(|e| Error::AudioDecode(format!("Decode failed: {e}")))?;

            let spec = *decoded.spec();
            let frames = decoded.capacity() as u64;
            let needed = frames as usize * spec.channels.count();
            if self.sample_buf.as_ref().is_some_and(|b| b.capacity() < needed) {
                self.sample_buf = None;
            }
            let buf = self
                .sample_buf
                .get_or_insert_with(|| SampleBuffer::new(frames, spec));
            buf.copy_interleaved_ref(decoded);

            trace!("Decoded {} samples", buf.len());
            return Ok(Some(PcmBlock::new(
                buf.samples().to_vec(),
                spec.channels.count() as u16,
                spec.rate,
            )));
        }
    }
}

/// Read the container magic and rewind.
fn sniff(file: &mut File) -> Result<FileType> {
    let mut header = Vec::with_capacity(FileType::HEADER_LEN);
    file.by_ref()
        .take(FileType::HEADER_LEN as u64)
        .read_to_end(&mut header)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(FileType::detect(&header))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_is_not_found() {
        let result = SymphoniaDecoder.open(Path::new("/definitely/not/here.wav"));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_unknown_container_is_unsupported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"OggS\x00\x02\x00\x00\x00\x00\x00\x00\x00\x00").unwrap();

        let result = SymphoniaDecoder.open(file.path());
        assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    }
}
