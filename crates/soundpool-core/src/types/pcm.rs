//! Decoded audio blocks.

use std::time::Duration;

/// A chunk of decoded, interleaved samples ready for a channel.
///
/// Samples are `f32` in `[-1.0, 1.0]`, laid out frame by frame
/// (`L R L R ...` for stereo).
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBlock {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl PcmBlock {
    pub const fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / usize::from(self.channels)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback time of this block at its own sample rate.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_and_duration() {
        let block = PcmBlock::new(vec![0.0; 4800 * 2], 2, 48000);
        assert_eq!(block.frames(), 4800);
        assert_eq!(block.duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_degenerate_block() {
        let block = PcmBlock::new(vec![0.5; 10], 0, 0);
        assert_eq!(block.frames(), 0);
        assert_eq!(block.duration(), Duration::ZERO);
        assert!(!block.is_empty());
    }
}
