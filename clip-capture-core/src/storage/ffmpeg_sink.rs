use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use once_cell::sync::OnceCell;
use wait_timeout::ChildExt;

use crate::models::artifacts::VideoArtifact;
use crate::models::config::VideoCodec;
use crate::models::error::CaptureError;
use crate::models::frame::Frame;
use crate::mux::runner::{collect, drain, resolve_program};
use crate::traits::tool_runner::ToolRunner;
use crate::traits::video_sink::{SinkFactory, SinkRequest, VideoSink};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens video sinks by piping raw RGB frames into an ffmpeg encoder.
///
/// The encoder list is probed once per factory; a codec whose encoder is
/// missing fails to open with `SinkOpenFailure` so the caller can fall back.
pub struct FfmpegSinkFactory {
    program: PathBuf,
    runner: Arc<dyn ToolRunner>,
    encoders: OnceCell<Option<String>>,
    finish_timeout: Duration,
}

impl FfmpegSinkFactory {
    pub fn new(program: impl Into<PathBuf>, runner: Arc<dyn ToolRunner>, finish_timeout: Duration) -> Self {
        Self {
            program: resolve_program(&program.into()),
            runner,
            encoders: OnceCell::new(),
            finish_timeout,
        }
    }

    /// Whether the encoder for `codec` is built in. Unknown counts as yes.
    pub fn supports(&self, codec: VideoCodec) -> bool {
        let listing = self.encoders.get_or_init(|| {
            let args = vec!["-hide_banner".to_string(), "-encoders".to_string()];
            match self.runner.run(&self.program, &args, PROBE_TIMEOUT) {
                Ok(output) if output.success() => Some(output.stdout),
                Ok(output) => {
                    log::warn!("Encoder probe failed: {}", output.stderr_tail(3));
                    None
                }
                Err(e) => {
                    log::warn!("Encoder probe failed: {}", e);
                    None
                }
            }
        });
        match listing {
            Some(listing) => encoder_listed(listing, codec.encoder()),
            None => true,
        }
    }
}

impl SinkFactory for FfmpegSinkFactory {
    fn open(&self, request: &SinkRequest) -> Result<Box<dyn VideoSink>, CaptureError> {
        if !self.supports(request.codec) {
            return Err(CaptureError::SinkOpenFailure(format!(
                "encoder {} is not available",
                request.codec.encoder()
            )));
        }

        let path = request.path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| CaptureError::storage("failed to create directory", e))?;
        }

        let args = build_sink_args(request);
        log::debug!("Opening sink {} {}", self.program.display(), args.join(" "));
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CaptureError::SinkOpenFailure(format!("failed to start {}: {}", self.program.display(), e)))?;

        let stderr = child.stderr.take().and_then(|err| drain("sink-stderr", err));
        let stdin = child.stdin.take();

        if let Ok(Some(status)) = child.try_wait() {
            let tail = collect(stderr);
            return Err(CaptureError::SinkOpenFailure(format!(
                "encoder exited immediately ({}): {}",
                status,
                tail.trim()
            )));
        }

        log::info!(
            "Video sink open: {} ({}x{} @ {:.2} fps, {})",
            path.display(),
            request.width,
            request.height,
            request.fps,
            request.codec.encoder()
        );

        Ok(Box::new(FfmpegVideoSink {
            request: request.clone(),
            path,
            child: Some(child),
            stdin,
            stderr,
            frames_written: 0,
            finish_timeout: self.finish_timeout,
        }))
    }
}

/// A running encoder process fed through its stdin.
pub struct FfmpegVideoSink {
    request: SinkRequest,
    path: PathBuf,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    frames_written: u64,
    finish_timeout: Duration,
}

impl VideoSink for FfmpegVideoSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), CaptureError> {
        if frame.dimensions() != (self.request.width, self.request.height) {
            return Err(CaptureError::StorageError(format!(
                "frame is {}x{}, sink expects {}x{}",
                frame.width(),
                frame.height(),
                self.request.width,
                self.request.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| CaptureError::StorageError("video sink already closed".into()))?;
        stdin
            .write_all(frame.as_bytes())
            .map_err(|e| CaptureError::storage("failed to write frame to encoder", e))?;
        self.frames_written += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn finish(&mut self) -> Result<VideoArtifact, CaptureError> {
        // Closing stdin signals end of stream.
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| CaptureError::StorageError("video sink already closed".into()))?;

        let status = match child.wait_timeout(self.finish_timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CaptureError::Timeout(format!(
                    "encoder did not finish within {:.0}s",
                    self.finish_timeout.as_secs_f64()
                )));
            }
            Err(e) => return Err(CaptureError::storage("failed to wait for encoder", e)),
        };

        let stderr = collect(self.stderr.take());
        if !status.success() {
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            return Err(CaptureError::StorageError(format!(
                "encoder exited with {}: {}",
                status,
                tail.into_iter().rev().collect::<Vec<_>>().join("\n")
            )));
        }

        log::info!("Video sink closed: {} ({} frames)", self.path.display(), self.frames_written);
        Ok(VideoArtifact {
            path: self.path.clone(),
            fps: self.request.fps,
            frame_count: self.frames_written,
            width: self.request.width,
            height: self.request.height,
        })
    }
}

impl Drop for FfmpegVideoSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                log::warn!("Video sink dropped while open, killing encoder");
                let _ = child.kill();
            }
            let _ = child.wait();
        }
    }
}

/// Open `request`, retrying once with `alternate` if the primary codec is refused.
///
/// Returns the sink together with the request that actually opened.
pub fn open_sink_with_fallback(
    factory: &dyn SinkFactory,
    request: &SinkRequest,
    alternate: VideoCodec,
) -> Result<(Box<dyn VideoSink>, SinkRequest), CaptureError> {
    match factory.open(request) {
        Ok(sink) => Ok((sink, request.clone())),
        Err(CaptureError::SinkOpenFailure(reason)) if alternate != request.codec => {
            log::warn!(
                "{} sink failed ({}), trying {}",
                request.codec.extension(),
                reason,
                alternate.extension()
            );
            let retry = request.with_codec(alternate);
            let sink = factory.open(&retry)?;
            Ok((sink, retry))
        }
        Err(e) => Err(e),
    }
}

/// Arguments reading raw RGB24 frames from stdin and encoding to `request.path()`.
pub fn build_sink_args(request: &SinkRequest) -> Vec<String> {
    let mut args: Vec<String> = [
        "-y",
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgb24",
        "-s",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(format!("{}x{}", request.width, request.height));
    args.push("-r".into());
    args.push(format_fps(request.fps));
    args.extend(["-i", "-", "-an"].iter().map(|s| s.to_string()));
    args.extend(request.codec.encoder_args().iter().map(|s| s.to_string()));
    args.push(request.path().to_string_lossy().into_owned());
    args
}

/// Whether an `ffmpeg -encoders` listing contains `name` as an encoder.
pub fn encoder_listed(listing: &str, name: &str) -> bool {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|encoder| encoder == name)
}

fn format_fps(fps: f64) -> String {
    if (fps - fps.round()).abs() < 1e-9 {
        format!("{}", fps.round() as i64)
    } else {
        format!("{:.3}", fps)
    }
}
