/// WAV file format utilities.
///
/// Generates and parses the standard 44-byte RIFF header used for the
/// intermediate audio artifact.
use crate::models::error::CaptureError;

/// Size of the standard WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// PCM layout of a WAV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
}

impl WavSpec {
    pub fn new(sample_rate: u32, channels: u16, bit_depth: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bit_depth,
        }
    }

    pub fn block_align(&self) -> u16 {
        self.channels * self.bit_depth / 8
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    /// Playback length of `data_size` bytes of PCM.
    pub fn duration_secs(&self, data_size: u64) -> f64 {
        let rate = self.byte_rate();
        if rate == 0 {
            return 0.0;
        }
        data_size as f64 / rate as f64
    }

    /// Build a 44-byte header for `data_size` bytes of PCM.
    ///
    /// Layout:
    /// ```text
    /// [0-3]    "RIFF"
    /// [4-7]    36 + data_size
    /// [8-11]   "WAVE"
    /// [12-15]  "fmt "
    /// [16-19]  16 (PCM format chunk size)
    /// [20-21]  1 (PCM format code)
    /// [22-23]  channels
    /// [24-27]  sample_rate
    /// [28-31]  byte_rate
    /// [32-33]  block_align
    /// [34-35]  bit_depth
    /// [36-39]  "data"
    /// [40-43]  data_size
    /// ```
    pub fn header(&self, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
        let mut header = [0u8; WAV_HEADER_SIZE];

        header[0..4].copy_from_slice(b"RIFF");
        header[4..8].copy_from_slice(&(36 + data_size).to_le_bytes());
        header[8..12].copy_from_slice(b"WAVE");

        header[12..16].copy_from_slice(b"fmt ");
        header[16..20].copy_from_slice(&16u32.to_le_bytes());
        header[20..22].copy_from_slice(&1u16.to_le_bytes());
        header[22..24].copy_from_slice(&self.channels.to_le_bytes());
        header[24..28].copy_from_slice(&self.sample_rate.to_le_bytes());
        header[28..32].copy_from_slice(&self.byte_rate().to_le_bytes());
        header[32..34].copy_from_slice(&self.block_align().to_le_bytes());
        header[34..36].copy_from_slice(&self.bit_depth.to_le_bytes());

        header[36..40].copy_from_slice(b"data");
        header[40..44].copy_from_slice(&data_size.to_le_bytes());

        header
    }

    /// Parse a header written by [`WavSpec::header`]. Returns the spec and data size.
    pub fn parse(bytes: &[u8]) -> Result<(WavSpec, u32), CaptureError> {
        if bytes.len() < WAV_HEADER_SIZE {
            return Err(CaptureError::StorageError("WAV header truncated".into()));
        }
        if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" || &bytes[36..40] != b"data" {
            return Err(CaptureError::StorageError("not a canonical PCM WAV file".into()));
        }
        let format = u16::from_le_bytes([bytes[20], bytes[21]]);
        if format != 1 {
            return Err(CaptureError::StorageError(format!("unsupported WAV format code {}", format)));
        }
        let spec = WavSpec {
            channels: u16::from_le_bytes([bytes[22], bytes[23]]),
            sample_rate: u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]),
            bit_depth: u16::from_le_bytes([bytes[34], bytes[35]]),
        };
        let data_size = u32::from_le_bytes([bytes[40], bytes[41], bytes[42], bytes[43]]);
        Ok((spec, data_size))
    }
}

/// Downmix interleaved multi-channel audio to mono by averaging channels per frame.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let scale = 1.0 / channels as f32;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}
