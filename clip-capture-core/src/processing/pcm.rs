use crate::models::error::CaptureError;

const INT24_MAX: f32 = 8_388_607.0;

/// Convert f32 samples `[-1.0, 1.0]` to little-endian integer PCM.
///
/// Clamps out-of-range values. Supported depths: 16, 24 and 32 bits.
pub fn encode_pcm(samples: &[f32], bit_depth: u16) -> Result<Vec<u8>, CaptureError> {
    let bytes_per_sample = match bit_depth {
        16 => 2,
        24 => 3,
        32 => 4,
        other => {
            return Err(CaptureError::ConfigurationFailed(format!(
                "unsupported bit depth: {}",
                other
            )))
        }
    };

    let mut data = Vec::with_capacity(samples.len() * bytes_per_sample);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        match bit_depth {
            16 => data.extend_from_slice(&((clamped * i16::MAX as f32) as i16).to_le_bytes()),
            24 => {
                let value = (clamped * INT24_MAX).round() as i32;
                data.extend_from_slice(&value.to_le_bytes()[..3]);
            }
            _ => data.extend_from_slice(&((clamped as f64 * i32::MAX as f64) as i32).to_le_bytes()),
        }
    }
    Ok(data)
}

/// Largest absolute sample value.
pub fn peak_level(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
}

/// Root-mean-square level.
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}
