//! # clip-capture-core
//!
//! Platform-agnostic fixed-length clip capture.
//!
//! Records a camera and a microphone concurrently on independent clocks,
//! composites a looping animation and a watermark onto every frame, and fuses
//! the two intermediates into one container with an external muxer. Devices
//! and tools sit behind traits; platform backends live in
//! `clip-capture-devices` and plug in through [`CaptureBackends`].
//!
//! ## Architecture
//!
//! ```text
//! clip-capture-core (this crate)
//! ├── models/       ← CaptureError, CaptureState, CaptureConfiguration, Frame, JobState, artifacts
//! ├── traits/       ← DeviceCatalog, CameraProvider, SinkFactory, AudioInput, ToolRunner, Clock, CaptureDelegate
//! ├── processing/   ← overlay compositing, frame schedule, gain correction, PCM and WAV format
//! ├── storage/      ← WavFileWriter, ffmpeg video sink, metadata sidecar
//! ├── mux/          ← mux argument builder, process runner, Reconciler
//! ├── session/      ← DeviceResolver, FrameClock, AudioSession, CaptureExecutor, Recorder
//! └── jobs/         ← JobTracker
//! ```
//!
//! ## Data flow
//!
//! ```text
//! DeviceResolver ─┬─► FrameClock ──► video sink ──┐
//!                 └─► AudioSession ─► WAV ────────┴─► Reconciler ─► final container ─► JobTracker
//! ```

pub mod jobs;
pub mod models;
pub mod mux;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use jobs::tracker::JobTracker;
pub use models::artifacts::{AudioArtifact, FinalMedia, VideoArtifact};
pub use models::config::CaptureConfiguration;
pub use models::device::{DeviceCapabilities, DeviceDirection, DeviceHandle};
pub use models::error::CaptureError;
pub use models::frame::Frame;
pub use models::job::{JobId, JobState, JobStatus, JobStatusView};
pub use models::state::{CaptureEvent, CaptureState, SideEffect};
pub use mux::args::build_mux_args;
pub use mux::reconciler::Reconciler;
pub use mux::runner::ProcessRunner;
pub use processing::overlay::Compositor;
pub use session::cancel::CancelToken;
pub use session::executor::{CaptureBackends, CaptureContext, CaptureExecutor};
pub use session::recorder::{CaptureRequest, Recorder};
pub use session::resolver::DeviceResolver;
pub use storage::ffmpeg_sink::FfmpegSinkFactory;
pub use traits::audio_input::{AudioInput, AudioProfile, RecordedAudio};
pub use traits::camera::{CameraProvider, CameraRequest, FrameSource};
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::clock::{Clock, SystemClock};
pub use traits::device_catalog::DeviceCatalog;
pub use traits::tool_runner::{ToolOutput, ToolRunner};
pub use traits::video_sink::{SinkFactory, SinkRequest, VideoSink};
