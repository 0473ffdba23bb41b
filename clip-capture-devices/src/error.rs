use thiserror::Error;

use clip_capture_core::models::error::CaptureError;

/// Failures inside a device backend, converted to [`CaptureError`] at the
/// trait boundary.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("failed to list devices: {0}")]
    Enumeration(String),

    #[error("failed to open device: {0}")]
    Open(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("frame decode failed: {0}")]
    Decode(String),
}

impl BackendError {
    /// Map an error raised by a microphone backend.
    pub fn into_audio_error(self) -> CaptureError {
        match self {
            Self::DeviceNotFound(name) => CaptureError::DeviceUnavailable(name),
            other => CaptureError::AudioDeviceTransient(other.to_string()),
        }
    }
}

impl From<BackendError> for CaptureError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Stream(_) | BackendError::Decode(_) => CaptureError::FrameReadTransient(err.to_string()),
            BackendError::Enumeration(_) => CaptureError::ConfigurationFailed(err.to_string()),
            other => CaptureError::DeviceUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_errors_map_to_taxonomy() {
        assert!(matches!(
            CaptureError::from(BackendError::Open("busy".into())),
            CaptureError::DeviceUnavailable(_)
        ));
        assert!(CaptureError::from(BackendError::Decode("bad mjpeg".into())).is_recoverable());
    }

    #[test]
    fn audio_errors_are_transient_unless_missing() {
        assert!(matches!(
            BackendError::Stream("xrun".into()).into_audio_error(),
            CaptureError::AudioDeviceTransient(_)
        ));
        assert!(matches!(
            BackendError::DeviceNotFound("RODE".into()).into_audio_error(),
            CaptureError::DeviceUnavailable(_)
        ));
    }
}
