use std::time::Duration;

use crate::models::device::DeviceHandle;
use crate::models::error::CaptureError;
use crate::session::cancel::CancelToken;

/// Stream format asked of a microphone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioProfile {
    pub sample_rate: u32,
    pub channels: u16,
    /// Bit depth of the intermediate file written from this capture.
    pub bit_depth: u16,
}

/// Interleaved samples in `[-1.0, 1.0]` as delivered by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl RecordedAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Blocking microphone capture.
pub trait AudioInput: Send + Sync {
    /// Fill a buffer of `duration * rate * channels` samples from `device`
    /// (`None` = system default) and return it.
    ///
    /// Devices may negotiate a different rate or channel count; the returned
    /// value reports what was actually captured. Implementations return
    /// `Cancelled` promptly once `cancel` fires.
    fn record(
        &self,
        device: Option<&DeviceHandle>,
        profile: &AudioProfile,
        duration: Duration,
        cancel: &CancelToken,
    ) -> Result<RecordedAudio, CaptureError>;
}
