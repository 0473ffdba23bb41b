//! Camera capture through nokhwa.

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;

use clip_capture_core::models::device::{DeviceCapabilities, DeviceDirection, DeviceHandle};
use clip_capture_core::models::error::CaptureError;
use clip_capture_core::models::frame::Frame;
use clip_capture_core::traits::camera::{CameraProvider, CameraRequest, FrameSource};
use clip_capture_core::traits::device_catalog::DeviceCatalog;

use crate::error::BackendError;

/// Lists cameras visible to the platform's native backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct NokhwaCatalog;

impl DeviceCatalog for NokhwaCatalog {
    fn list(&self, direction: DeviceDirection) -> Result<Vec<DeviceHandle>, CaptureError> {
        if direction != DeviceDirection::Video {
            return Ok(Vec::new());
        }
        let cameras = nokhwa::query(ApiBackend::Auto).map_err(|e| BackendError::Enumeration(e.to_string()))?;
        Ok(cameras
            .iter()
            .enumerate()
            .map(|(position, info)| {
                let index = info.index().as_index().map(|i| i as usize).unwrap_or(position);
                DeviceHandle::new(
                    index,
                    info.human_name(),
                    DeviceDirection::Video,
                    DeviceCapabilities::video(Vec::new()),
                )
            })
            .collect())
    }
}

/// Opens cameras as RGB frame sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct NokhwaCameraProvider;

impl CameraProvider for NokhwaCameraProvider {
    fn open(&self, device: &DeviceHandle, request: &CameraRequest) -> Result<Box<dyn FrameSource>, CaptureError> {
        let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            Resolution::new(request.width, request.height),
            FrameFormat::MJPEG,
            request.fps.round() as u32,
        )));
        let mut camera = Camera::new(CameraIndex::Index(device.index as u32), format)
            .map_err(|e| BackendError::Open(format!("{}: {}", device, e)))?;
        camera
            .open_stream()
            .map_err(|e| BackendError::Open(format!("{}: {}", device, e)))?;

        let negotiated = camera.camera_format();
        log::info!(
            "Camera {} streaming {}x{} @ {} fps ({:?})",
            device,
            negotiated.width(),
            negotiated.height(),
            negotiated.frame_rate(),
            negotiated.format()
        );
        Ok(Box::new(NokhwaFrameSource {
            camera,
            open: true,
        }))
    }
}

/// A streaming camera. The stream stops on `close` or drop.
pub struct NokhwaFrameSource {
    camera: Camera,
    open: bool,
}

impl FrameSource for NokhwaFrameSource {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        if !self.open {
            return Err(CaptureError::FrameReadTransient("camera closed".into()));
        }
        let buffer = self.camera.frame().map_err(|e| BackendError::Stream(e.to_string()))?;
        let image = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        let (width, height) = (image.width(), image.height());
        Frame::new(width, height, image.into_raw())
    }

    fn reported_fps(&self) -> Option<f64> {
        Some(self.camera.frame_rate() as f64)
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            if let Err(e) = self.camera.stop_stream() {
                log::warn!("Failed to stop camera stream: {}", e);
            }
        }
    }
}

impl Drop for NokhwaFrameSource {
    fn drop(&mut self) {
        self.close();
    }
}
