//! Device listing through ffmpeg's AVFoundation input.
//!
//! `ffmpeg -f avfoundation -list_devices true -i ""` prints the devices to
//! stderr and exits non-zero; only the listing matters:
//!
//! ```text
//! [AVFoundation indev @ 0x7f9e4c704a80] AVFoundation video devices:
//! [AVFoundation indev @ 0x7f9e4c704a80] [0] FaceTime HD Camera
//! [AVFoundation indev @ 0x7f9e4c704a80] [1] Capture screen 0
//! [AVFoundation indev @ 0x7f9e4c704a80] AVFoundation audio devices:
//! [AVFoundation indev @ 0x7f9e4c704a80] [0] RODE NT-USB
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clip_capture_core::models::device::{DeviceCapabilities, DeviceDirection, DeviceHandle};
use clip_capture_core::models::error::CaptureError;
use clip_capture_core::mux::runner::resolve_program;
use clip_capture_core::traits::device_catalog::DeviceCatalog;
use clip_capture_core::traits::tool_runner::ToolRunner;

const LIST_TIMEOUT: Duration = Duration::from_secs(10);

/// Lists cameras and microphones by asking ffmpeg.
pub struct AvFoundationCatalog {
    program: PathBuf,
    runner: Arc<dyn ToolRunner>,
}

impl AvFoundationCatalog {
    pub fn new(program: impl Into<PathBuf>, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            program: resolve_program(&program.into()),
            runner,
        }
    }
}

impl DeviceCatalog for AvFoundationCatalog {
    fn list(&self, direction: DeviceDirection) -> Result<Vec<DeviceHandle>, CaptureError> {
        let args: Vec<String> = ["-hide_banner", "-f", "avfoundation", "-list_devices", "true", "-i", ""]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let output = self.runner.run(&self.program, &args, LIST_TIMEOUT)?;
        if output.timed_out {
            return Err(CaptureError::Timeout("device listing".into()));
        }
        let devices = parse_device_listing(&output.stderr);
        if devices.is_empty() && !output.stderr.contains("AVFoundation") {
            return Err(CaptureError::ConfigurationFailed(format!(
                "avfoundation listing unavailable: {}",
                output.stderr_tail(3)
            )));
        }
        Ok(devices.into_iter().filter(|d| d.direction == direction).collect())
    }
}

/// Parse ffmpeg's AVFoundation device listing.
///
/// Screen-capture pseudo devices are skipped.
pub fn parse_device_listing(stderr: &str) -> Vec<DeviceHandle> {
    let mut section = None;
    let mut devices = Vec::new();

    for line in stderr.lines() {
        let body = strip_log_prefix(line.trim());
        if body.contains("video devices:") {
            section = Some(DeviceDirection::Video);
            continue;
        }
        if body.contains("audio devices:") {
            section = Some(DeviceDirection::Audio);
            continue;
        }
        let Some(direction) = section else {
            continue;
        };
        let Some((index, name)) = parse_entry(body) else {
            continue;
        };
        if direction == DeviceDirection::Video && name.starts_with("Capture screen") {
            continue;
        }
        let capabilities = match direction {
            DeviceDirection::Video => DeviceCapabilities::video(Vec::new()),
            DeviceDirection::Audio => DeviceCapabilities::audio(1, Vec::new()),
        };
        devices.push(DeviceHandle::new(index, name, direction, capabilities));
    }
    devices
}

/// Drop a leading `[AVFoundation indev @ 0x...]` tag.
fn strip_log_prefix(line: &str) -> &str {
    if line.starts_with("[AVFoundation") {
        if let Some(end) = line.find(']') {
            return line[end + 1..].trim_start();
        }
    }
    line
}

/// `[3] Name` to `(3, "Name")`.
fn parse_entry(body: &str) -> Option<(usize, &str)> {
    let rest = body.strip_prefix('[')?;
    let (index, name) = rest.split_once(']')?;
    let index = index.trim().parse().ok()?;
    let name = name.trim();
    (!name.is_empty()).then_some((index, name))
}
