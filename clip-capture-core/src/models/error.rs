use thiserror::Error;

use super::device::DeviceDirection;

/// Errors that can occur while capturing, reconciling or tracking a clip.
///
/// Recoverable variants are absorbed at the component that raises them
/// (frame reuse, audio retry, overlay disable, video-only output). The rest
/// end the job and surface through the job tracker's `error` field.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("no {0} device available")]
    NoDeviceAvailable(DeviceDirection),

    #[error("frame read failed: {0}")]
    FrameReadTransient(String),

    #[error("audio device error: {0}")]
    AudioDeviceTransient(String),

    #[error("muxing failed: {0}")]
    MuxingFailure(String),

    #[error("overlay asset could not be loaded: {0}")]
    AssetLoadFailure(String),

    #[error("video sink could not be opened: {0}")]
    SinkOpenFailure(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("capture cancelled")]
    Cancelled,

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("invalid state transition: {0}")]
    InvalidTransition(String),
}

impl CaptureError {
    /// Whether a component can absorb this error and keep the job alive.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::FrameReadTransient(_)
                | Self::AudioDeviceTransient(_)
                | Self::MuxingFailure(_)
                | Self::AssetLoadFailure(_)
        )
    }

    pub(crate) fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        Self::StorageError(format!("{}: {}", context, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_taxonomy() {
        assert!(CaptureError::FrameReadTransient("eof".into()).is_recoverable());
        assert!(CaptureError::AudioDeviceTransient("xrun".into()).is_recoverable());
        assert!(CaptureError::MuxingFailure("exit 1".into()).is_recoverable());
        assert!(CaptureError::AssetLoadFailure("missing".into()).is_recoverable());

        assert!(!CaptureError::DeviceUnavailable("cam0".into()).is_recoverable());
        assert!(!CaptureError::SinkOpenFailure("no encoder".into()).is_recoverable());
        assert!(!CaptureError::Cancelled.is_recoverable());
    }

    #[test]
    fn display_names_direction() {
        let err = CaptureError::NoDeviceAvailable(DeviceDirection::Audio);
        assert_eq!(err.to_string(), "no audio device available");
    }
}
