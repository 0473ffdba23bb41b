use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::jobs::tracker::JobTracker;
use crate::models::artifacts::{AudioArtifact, FinalMedia, VideoArtifact};
use crate::models::config::CaptureConfiguration;
use crate::models::device::{DeviceDirection, DeviceHandle};
use crate::models::error::CaptureError;
use crate::models::frame::Frame;
use crate::models::job::{JobId, JobStatus, JobUpdate};
use crate::models::state::{CaptureEvent, CaptureState, SideEffect};
use crate::mux::reconciler::{remove_intermediates, Reconciler};
use crate::processing::frame_clock::FrameSchedule;
use crate::processing::overlay_library::OverlayLibrary;
use crate::session::audio_session::AudioSession;
use crate::session::cancel::CancelToken;
use crate::session::capture_loop::{probe_fps, run_countdown, FrameClock, LoopStats};
use crate::session::resolver::DeviceResolver;
use crate::storage::ffmpeg_sink::open_sink_with_fallback;
use crate::storage::metadata::{write_metadata, CaptureMetadata};
use crate::traits::audio_input::AudioInput;
use crate::traits::camera::{CameraProvider, CameraRequest, FrameSource};
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::clock::Clock;
use crate::traits::device_catalog::DeviceCatalog;
use crate::traits::tool_runner::ToolRunner;
use crate::traits::video_sink::{SinkFactory, SinkRequest, VideoSink};

/// Extra reads allowed after the countdown when it produced no frame.
const FIRST_FRAME_ATTEMPTS: u32 = 5;
const PROBE_WINDOW: Duration = Duration::from_secs(1);
const PROBE_MAX_READS: u32 = 30;

/// The device and tool seams a job runs against.
#[derive(Clone)]
pub struct CaptureBackends {
    pub catalog: Arc<dyn DeviceCatalog>,
    pub camera: Arc<dyn CameraProvider>,
    pub sinks: Arc<dyn SinkFactory>,
    pub audio: Arc<dyn AudioInput>,
    pub tools: Arc<dyn ToolRunner>,
    pub clock: Arc<dyn Clock>,
}

/// Everything one job needs to know, passed explicitly to every step.
#[derive(Debug, Clone)]
pub struct CaptureContext {
    pub job_id: JobId,
    pub config: Arc<CaptureConfiguration>,
    pub output_path: PathBuf,
    pub duration: Duration,
    pub enable_audio: bool,
    pub cancel: CancelToken,
}

impl CaptureContext {
    /// `<dir>/<stem>_video`, extension chosen by the codec.
    pub fn video_stem(&self) -> PathBuf {
        self.sibling("video")
    }

    pub fn audio_path(&self) -> PathBuf {
        self.sibling("audio").with_extension("wav")
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let stem = self
            .output_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.job_id.to_string());
        let name = format!("{}_{}", stem, suffix);
        match self.output_path.parent() {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        }
    }
}

/// An open camera. Dropping the lease closes it, on every exit path.
pub struct CameraLease {
    device: DeviceHandle,
    source: Box<dyn FrameSource>,
}

impl CameraLease {
    pub fn new(device: DeviceHandle, source: Box<dyn FrameSource>) -> Self {
        Self { device, source }
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    pub fn source_mut(&mut self) -> &mut dyn FrameSource {
        self.source.as_mut()
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        self.source.close();
        log::info!("Camera {} released", self.device);
    }
}

enum AudioPlan {
    Disabled(&'static str),
    Device(DeviceHandle),
    SystemDefault,
}

/// Resources and artifacts accumulated while one job runs.
struct JobRun {
    camera: Option<CameraLease>,
    sink: Option<Box<dyn VideoSink>>,
    sink_request: Option<SinkRequest>,
    audio_plan: AudioPlan,
    audio_cancel: CancelToken,
    audio_thread: Option<JoinHandle<Option<AudioArtifact>>>,
    first_frame: Option<Frame>,
    fps: f64,
    video: Option<VideoArtifact>,
    audio: Option<AudioArtifact>,
    stats: Option<LoopStats>,
}

/// Drives one job through the capture state machine.
///
/// Each event goes through [`CaptureState::apply`]; the executor then
/// performs the returned side effects in order. An effect that produces the
/// next event ends the batch, and an effect that fails turns into a `Fail`
/// (or `Cancel`) event. Devices are released by the failure effects and, as a
/// last resort, by dropping the job's resources.
pub struct CaptureExecutor {
    ctx: CaptureContext,
    backends: CaptureBackends,
    overlays: Arc<OverlayLibrary>,
    tracker: Arc<JobTracker>,
    delegate: Option<Arc<dyn CaptureDelegate>>,
    state: CaptureState,
}

impl CaptureExecutor {
    pub fn new(
        ctx: CaptureContext,
        backends: CaptureBackends,
        overlays: Arc<OverlayLibrary>,
        tracker: Arc<JobTracker>,
        delegate: Option<Arc<dyn CaptureDelegate>>,
    ) -> Self {
        Self {
            ctx,
            backends,
            overlays,
            tracker,
            delegate,
            state: CaptureState::Idle,
        }
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    /// Run the job to a terminal state and return it.
    pub fn run(mut self) -> CaptureState {
        let mut run = JobRun {
            camera: None,
            sink: None,
            sink_request: None,
            audio_plan: AudioPlan::Disabled("audio disabled"),
            audio_cancel: self.ctx.cancel.child(),
            audio_thread: None,
            first_frame: None,
            fps: self.ctx.config.video.fps,
            video: None,
            audio: None,
            stats: None,
        };
        let mut events = VecDeque::from([CaptureEvent::Start]);

        while let Some(event) = events.pop_front() {
            let transition = match self.state.apply(event) {
                Ok(transition) => transition,
                Err(e) => {
                    log::error!("Job {}: {}", self.ctx.job_id, e);
                    if !self.state.is_terminal() {
                        events.push_back(CaptureEvent::Fail(e));
                    }
                    continue;
                }
            };
            self.enter(transition.state);

            for effect in transition.effects {
                match self.perform(&effect, &mut run) {
                    Ok(None) => {}
                    Ok(Some(next)) => {
                        events.push_back(next);
                        break;
                    }
                    Err(e) if self.state.is_terminal() => {
                        log::error!("Job {}: {:?} failed during cleanup: {}", self.ctx.job_id, effect, e);
                    }
                    Err(e) => {
                        events.push_back(failure_event(e));
                        break;
                    }
                }
            }
        }

        self.state
    }

    fn enter(&mut self, state: CaptureState) {
        log::info!("Job {}: {} -> {}", self.ctx.job_id, self.state.name(), state.name());
        self.state = state;
        if !self.state.is_terminal() {
            if let Err(e) = self
                .tracker
                .update(&self.ctx.job_id, JobStatus::Recording, JobUpdate::phase(self.state.name()))
            {
                log::warn!("Job {}: tracker update failed: {}", self.ctx.job_id, e);
            }
        }
        if let Some(delegate) = &self.delegate {
            delegate.on_state_changed(&self.ctx.job_id, &self.state);
        }
    }

    fn perform(&mut self, effect: &SideEffect, run: &mut JobRun) -> Result<Option<CaptureEvent>, CaptureError> {
        log::debug!("Job {}: {:?}", self.ctx.job_id, effect);
        match effect {
            SideEffect::OpenDevices => self.open_devices(run).map(|_| None),
            SideEffect::RunCountdown => self.countdown(run).map(|_| Some(CaptureEvent::CountdownElapsed)),
            SideEffect::StartAudioSession => self.start_audio(run).map(|_| None),
            SideEffect::RunFrameClock => self.capture(run).map(|_| Some(CaptureEvent::CaptureElapsed)),
            SideEffect::CloseSink => {
                if let Some(mut sink) = run.sink.take() {
                    match sink.finish() {
                        Ok(artifact) => run.video = Some(artifact),
                        Err(e) => log::error!("Video sink did not close cleanly: {}", e),
                    }
                }
                Ok(None)
            }
            SideEffect::ReleaseDevices => {
                // Dropping an unfinished sink kills its encoder.
                drop(run.sink.take());
                drop(run.camera.take());
                Ok(None)
            }
            SideEffect::JoinAudioSession => {
                if matches!(self.state, CaptureState::Failed(_)) {
                    run.audio_cancel.cancel();
                }
                if let Some(handle) = run.audio_thread.take() {
                    match handle.join() {
                        Ok(artifact) => run.audio = artifact,
                        Err(_) => log::error!("Audio session thread panicked"),
                    }
                }
                Ok(None)
            }
            SideEffect::Reconcile => self.reconcile(run).map(|media| Some(CaptureEvent::Finalized(Box::new(media)))),
            SideEffect::RemoveIntermediates => {
                if let CaptureState::Completed(media) = &self.state {
                    let mut intermediates: Vec<&Path> = Vec::new();
                    if let Some(video) = &run.video {
                        intermediates.push(&video.path);
                    }
                    if let Some(audio) = &run.audio {
                        intermediates.push(&audio.path);
                    }
                    let removed = remove_intermediates(&media.path, &intermediates);
                    log::debug!("Removed {} intermediate file(s)", removed);
                }
                Ok(None)
            }
            SideEffect::WriteMetadata => {
                self.write_sidecar(run);
                Ok(None)
            }
            SideEffect::PublishStatus(status) => {
                self.publish(*status);
                Ok(None)
            }
        }
    }

    fn open_devices(&mut self, run: &mut JobRun) -> Result<(), CaptureError> {
        let config = &self.ctx.config;
        let resolver = DeviceResolver::new(Arc::clone(&self.backends.catalog));

        let device = resolver
            .resolve(DeviceDirection::Video, &config.video.device_keywords)
            .map_err(|e| match e {
                CaptureError::NoDeviceAvailable(_) => e,
                other => CaptureError::DeviceUnavailable(other.to_string()),
            })?;
        let request = CameraRequest {
            width: config.video.width,
            height: config.video.height,
            fps: config.video.fps,
        };
        let source = self.backends.camera.open(&device, &request).map_err(|e| match e {
            CaptureError::DeviceUnavailable(_) => e,
            other => CaptureError::DeviceUnavailable(format!("{}: {}", device, other)),
        })?;
        let mut camera = CameraLease::new(device, source);
        log::info!("Camera {} open", camera.device());

        if config.video.probe_fps {
            run.fps = probe_fps(camera.source_mut(), self.backends.clock.as_ref(), PROBE_WINDOW, PROBE_MAX_READS);
        }
        run.camera = Some(camera);

        run.audio_plan = if !self.ctx.enable_audio {
            AudioPlan::Disabled("audio disabled")
        } else {
            match resolver.resolve(DeviceDirection::Audio, &config.audio.device_keywords) {
                Ok(device) => AudioPlan::Device(device),
                Err(CaptureError::NoDeviceAvailable(_)) => {
                    log::warn!("No microphone found, recording video only");
                    AudioPlan::Disabled("no audio device available")
                }
                Err(e) => {
                    log::warn!("Microphone listing failed ({}), using the system default", e);
                    AudioPlan::SystemDefault
                }
            }
        };

        let request = SinkRequest {
            stem: self.ctx.video_stem(),
            width: config.video.width,
            height: config.video.height,
            fps: run.fps,
            codec: config.video.primary_codec,
        };
        let (sink, opened) = open_sink_with_fallback(self.backends.sinks.as_ref(), &request, config.video.alternate_codec)?;
        run.sink = Some(sink);
        run.sink_request = Some(opened);
        Ok(())
    }

    fn countdown(&mut self, run: &mut JobRun) -> Result<(), CaptureError> {
        let camera = run
            .camera
            .as_mut()
            .ok_or_else(|| CaptureError::DeviceUnavailable("camera is not open".into()))?;
        let interval = Duration::from_secs_f64(1.0 / run.fps);
        let mut first = run_countdown(
            camera.source_mut(),
            self.backends.clock.as_ref(),
            self.ctx.config.countdown(),
            interval,
            &self.ctx.cancel,
        )?;

        let mut attempts = 0;
        while first.is_none() && attempts < FIRST_FRAME_ATTEMPTS {
            attempts += 1;
            match camera.source_mut().read_frame() {
                Ok(frame) => first = Some(frame),
                Err(e) => log::debug!("First frame attempt {} failed: {}", attempts, e),
            }
        }
        match first {
            Some(frame) => {
                run.first_frame = Some(frame);
                Ok(())
            }
            None => Err(CaptureError::DeviceUnavailable(format!(
                "camera {} delivered no frames",
                camera.device()
            ))),
        }
    }

    fn start_audio(&mut self, run: &mut JobRun) -> Result<(), CaptureError> {
        let device = match &run.audio_plan {
            AudioPlan::Disabled(_) => return Ok(()),
            AudioPlan::Device(device) => Some(device.clone()),
            AudioPlan::SystemDefault => None,
        };
        let session = AudioSession::new(Arc::clone(&self.backends.audio), self.ctx.config.audio.clone());
        let duration = self.ctx.duration;
        let path = self.ctx.audio_path();
        let cancel = run.audio_cancel.clone();

        let handle = thread::Builder::new()
            .name("audio-session".into())
            .spawn(move || session.record(duration, device.as_ref(), &path, &cancel))
            .map_err(|e| CaptureError::AudioDeviceTransient(format!("failed to start audio session: {}", e)));
        match handle {
            Ok(handle) => run.audio_thread = Some(handle),
            Err(e) => {
                log::error!("{}; continuing without audio", e);
                if let Some(delegate) = &self.delegate {
                    delegate.on_error(&self.ctx.job_id, &e);
                }
            }
        }
        Ok(())
    }

    fn capture(&mut self, run: &mut JobRun) -> Result<(), CaptureError> {
        let config = &self.ctx.config;
        let frame_clock = FrameClock::new(
            Arc::clone(&self.backends.clock),
            FrameSchedule::new(run.fps, self.ctx.duration),
            (config.video.width, config.video.height),
            self.overlays.compositor(run.fps),
            self.ctx.cancel.clone(),
        );
        let camera = run
            .camera
            .as_mut()
            .ok_or_else(|| CaptureError::DeviceUnavailable("camera is not open".into()))?;
        let sink = run
            .sink
            .as_mut()
            .ok_or_else(|| CaptureError::StorageError("video sink is not open".into()))?;

        let job_id = &self.ctx.job_id;
        let delegate = &self.delegate;
        let state = &mut self.state;
        let mut on_progress = |elapsed_secs: f64| {
            if let Ok(transition) = state.apply(CaptureEvent::Progress { elapsed_secs }) {
                *state = transition.state;
                log::debug!("Job {}: {:.0}s captured", job_id, elapsed_secs);
                if let Some(delegate) = delegate {
                    delegate.on_state_changed(job_id, state);
                }
            }
        };

        let stats = frame_clock.run(camera.source_mut(), sink.as_mut(), run.first_frame.take(), &mut on_progress)?;
        run.stats = Some(stats);
        Ok(())
    }

    fn reconcile(&mut self, run: &mut JobRun) -> Result<FinalMedia, CaptureError> {
        let reconciler = Reconciler::new(Arc::clone(&self.backends.tools), self.ctx.config.mux.clone());
        let mut media = reconciler.mux(run.video.as_ref(), run.audio.as_ref(), &self.ctx.output_path)?;

        if self.ctx.enable_audio && !media.has_audio && media.diagnostic.is_none() {
            media.diagnostic = Some(match run.audio_plan {
                AudioPlan::Disabled(reason) => reason.to_string(),
                _ => "audio track unavailable".to_string(),
            });
        }
        if let Some(diagnostic) = &media.diagnostic {
            log::warn!("Job {} degraded: {}", self.ctx.job_id, diagnostic);
        }
        Ok(media)
    }

    fn write_sidecar(&self, run: &JobRun) {
        if !self.ctx.config.write_metadata {
            return;
        }
        let CaptureState::Completed(media) = &self.state else {
            return;
        };
        let mut metadata = CaptureMetadata::new(self.ctx.job_id.clone(), self.ctx.duration.as_secs_f64(), media);
        metadata.video = run.video.clone();
        metadata.audio = run.audio.clone();
        metadata.frames = run.stats;
        match write_metadata(&metadata, &media.path) {
            Ok(path) => log::debug!("Metadata written to {}", path.display()),
            Err(e) => log::warn!("Metadata not written: {}", e),
        }
    }

    fn publish(&self, status: JobStatus) {
        let update = match &self.state {
            CaptureState::Completed(media) => JobUpdate {
                output_path: Some(media.path.clone()),
                phase: Some(self.state.name().into()),
                diagnostic: media.diagnostic.clone(),
                ..Default::default()
            },
            CaptureState::Failed(error) => JobUpdate {
                phase: Some(self.state.name().into()),
                error: Some(error.to_string()),
                ..Default::default()
            },
            other => JobUpdate::phase(other.name()),
        };
        if let Err(e) = self.tracker.update(&self.ctx.job_id, status, update) {
            log::warn!("Job {}: status {:?} not recorded: {}", self.ctx.job_id, status, e);
        }

        if let Some(delegate) = &self.delegate {
            match &self.state {
                CaptureState::Completed(media) => delegate.on_capture_finished(&self.ctx.job_id, media),
                CaptureState::Failed(error) => delegate.on_error(&self.ctx.job_id, error),
                _ => {}
            }
        }
    }
}

fn failure_event(error: CaptureError) -> CaptureEvent {
    match error {
        CaptureError::Cancelled => CaptureEvent::Cancel,
        other => CaptureEvent::Fail(other),
    }
}
