use std::sync::Arc;

use clip_capture_core::models::config::CaptureConfiguration;
use clip_capture_core::models::device::{DeviceDirection, DeviceHandle};
use clip_capture_core::models::error::CaptureError;
use clip_capture_core::mux::runner::ProcessRunner;
use clip_capture_core::session::executor::CaptureBackends;
use clip_capture_core::storage::ffmpeg_sink::FfmpegSinkFactory;
use clip_capture_core::traits::clock::SystemClock;
use clip_capture_core::traits::device_catalog::DeviceCatalog;
use clip_capture_core::traits::tool_runner::ToolRunner;

use crate::cpal_input::{CpalAudioInput, CpalCatalog};
use crate::nokhwa_camera::{NokhwaCameraProvider, NokhwaCatalog};

/// Cameras from nokhwa, microphones from cpal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeCatalog;

impl DeviceCatalog for NativeCatalog {
    fn list(&self, direction: DeviceDirection) -> Result<Vec<DeviceHandle>, CaptureError> {
        match direction {
            DeviceDirection::Video => NokhwaCatalog.list(direction),
            DeviceDirection::Audio => CpalCatalog.list(direction),
        }
    }
}

/// Backends for the local camera, microphone and ffmpeg.
pub fn native_backends(config: &CaptureConfiguration) -> CaptureBackends {
    let tools: Arc<dyn ToolRunner> = Arc::new(ProcessRunner);
    CaptureBackends {
        catalog: Arc::new(NativeCatalog),
        camera: Arc::new(NokhwaCameraProvider),
        sinks: Arc::new(FfmpegSinkFactory::new(
            config.mux.program.clone(),
            Arc::clone(&tools),
            config.video.finish_timeout(),
        )),
        audio: Arc::new(CpalAudioInput),
        tools,
        clock: Arc::new(SystemClock::new()),
    }
}
