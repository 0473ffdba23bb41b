use std::fmt;

use serde::{Deserialize, Serialize};

/// Which kind of capture a device provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceDirection {
    Video,
    Audio,
}

impl fmt::Display for DeviceDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => f.write_str("video"),
            Self::Audio => f.write_str("audio"),
        }
    }
}

/// What a device reports it can do. Empty lists mean "not reported".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    /// Number of input channels (audio devices).
    pub input_channels: u16,
    /// Supported sample rates in Hz (audio devices).
    pub sample_rates: Vec<u32>,
    /// Supported frame sizes (video devices).
    pub resolutions: Vec<(u32, u32)>,
    /// Whether the device can deliver video frames.
    pub video_capture: bool,
}

impl DeviceCapabilities {
    pub fn audio(input_channels: u16, sample_rates: Vec<u32>) -> Self {
        Self {
            input_channels,
            sample_rates,
            ..Default::default()
        }
    }

    pub fn video(resolutions: Vec<(u32, u32)>) -> Self {
        Self {
            resolutions,
            video_capture: true,
            ..Default::default()
        }
    }

    /// Whether the device can serve the given direction at all.
    pub fn satisfies(&self, direction: DeviceDirection) -> bool {
        match direction {
            DeviceDirection::Audio => self.input_channels > 0,
            DeviceDirection::Video => self.video_capture,
        }
    }

    /// Whether `rate` is listed, or no rates were reported.
    pub fn supports_sample_rate(&self, rate: u32) -> bool {
        self.sample_rates.is_empty() || self.sample_rates.contains(&rate)
    }
}

/// A resolved capture device.
///
/// Immutable once resolved and never cached across jobs: the index is only
/// meaningful for the device list it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceHandle {
    pub index: usize,
    pub name: String,
    pub direction: DeviceDirection,
    pub capabilities: DeviceCapabilities,
}

impl DeviceHandle {
    pub fn new(index: usize, name: impl Into<String>, direction: DeviceDirection, capabilities: DeviceCapabilities) -> Self {
        Self {
            index,
            name: name.into(),
            direction,
            capabilities,
        }
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.index, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_capability_requires_channels() {
        assert!(DeviceCapabilities::audio(1, vec![48000]).satisfies(DeviceDirection::Audio));
        assert!(!DeviceCapabilities::audio(0, vec![48000]).satisfies(DeviceDirection::Audio));
        assert!(!DeviceCapabilities::audio(2, vec![]).satisfies(DeviceDirection::Video));
    }

    #[test]
    fn unreported_rates_are_accepted() {
        let caps = DeviceCapabilities::audio(1, vec![]);
        assert!(caps.supports_sample_rate(48000));

        let caps = DeviceCapabilities::audio(1, vec![44100]);
        assert!(!caps.supports_sample_rate(48000));
        assert!(caps.supports_sample_rate(44100));
    }

    #[test]
    fn handle_display() {
        let handle = DeviceHandle::new(2, "FaceTime HD Camera", DeviceDirection::Video, DeviceCapabilities::video(vec![]));
        assert_eq!(handle.to_string(), "[2] FaceTime HD Camera");
    }
}
