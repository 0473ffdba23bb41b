use std::path::PathBuf;

use crate::models::artifacts::VideoArtifact;
use crate::models::config::VideoCodec;
use crate::models::error::CaptureError;
use crate::models::frame::Frame;

/// Parameters for opening a video sink.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkRequest {
    /// Output path without extension; the codec decides it.
    pub stem: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: VideoCodec,
}

impl SinkRequest {
    pub fn path(&self) -> PathBuf {
        self.stem.with_extension(self.codec.extension())
    }

    pub fn with_codec(&self, codec: VideoCodec) -> Self {
        Self {
            codec,
            ..self.clone()
        }
    }
}

/// Opens video sinks. Shared across jobs.
pub trait SinkFactory: Send + Sync {
    fn open(&self, request: &SinkRequest) -> Result<Box<dyn VideoSink>, CaptureError>;
}

/// An open video file accepting frames of the requested size.
pub trait VideoSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), CaptureError>;

    fn frames_written(&self) -> u64;

    /// Flush and close the file. Called at most once.
    fn finish(&mut self) -> Result<VideoArtifact, CaptureError>;
}
