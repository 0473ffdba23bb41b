use crate::models::device::DeviceHandle;
use crate::models::error::CaptureError;
use crate::models::frame::Frame;

/// Frame size and rate asked of a camera. Devices may deliver something close.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraRequest {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// Opens cameras. Shared across jobs.
pub trait CameraProvider: Send + Sync {
    fn open(&self, device: &DeviceHandle, request: &CameraRequest) -> Result<Box<dyn FrameSource>, CaptureError>;
}

/// An open camera, exclusively owned by one job.
pub trait FrameSource {
    /// Block until the next frame is available.
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Frame rate the device claims to deliver, if it says.
    fn reported_fps(&self) -> Option<f64> {
        None
    }

    /// Release the device. Must tolerate being called more than once.
    fn close(&mut self);
}
