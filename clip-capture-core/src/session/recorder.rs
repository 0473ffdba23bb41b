use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::jobs::tracker::JobTracker;
use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::job::{JobId, JobStatus, JobStatusView, JobUpdate};
use crate::models::state::CaptureState;
use crate::processing::overlay_library::OverlayLibrary;
use crate::session::cancel::CancelToken;
use crate::session::executor::{CaptureBackends, CaptureContext, CaptureExecutor};
use crate::traits::capture_delegate::CaptureDelegate;

/// Per-request overrides of the configured defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureRequest {
    /// Final container path. Defaults to `clip_<timestamp>.mp4` in the output directory.
    pub output_path: Option<PathBuf>,
    pub duration_secs: Option<f64>,
    pub enable_audio: Option<bool>,
}

struct ActiveJob {
    job_id: JobId,
    cancel: CancelToken,
    handle: JoinHandle<CaptureState>,
}

/// Entry point for front ends: starts, cancels and reports capture jobs.
///
/// One job holds the camera and microphone at a time; `start` refuses a
/// second job while the first is running. Overlay assets are decoded once and
/// shared by every job.
///
/// # Example
///
/// ```no_run
/// # use clip_capture_core::{CaptureBackends, CaptureConfiguration, CaptureRequest, Recorder};
/// # fn demo(backends: CaptureBackends) -> Result<(), clip_capture_core::CaptureError> {
/// let recorder = Recorder::new(CaptureConfiguration::default(), backends)?;
/// let job = recorder.start(CaptureRequest::default())?;
/// let state = recorder.wait(&job)?;
/// println!("{} -> {:?}", job, recorder.status(&job)?.status);
/// # let _ = state;
/// # Ok(())
/// # }
/// ```
pub struct Recorder {
    config: Arc<CaptureConfiguration>,
    backends: CaptureBackends,
    overlays: Arc<OverlayLibrary>,
    tracker: Arc<JobTracker>,
    delegate: Option<Arc<dyn CaptureDelegate>>,
    /// Admission gate; held across the worker join.
    active: Mutex<Option<ActiveJob>>,
    /// Cancel handle of the running job. Never held while blocking.
    signal: Mutex<Option<(JobId, CancelToken)>>,
    /// Terminal state of the most recently joined job.
    last: Mutex<Option<(JobId, CaptureState)>>,
}

impl Recorder {
    pub fn new(config: CaptureConfiguration, backends: CaptureBackends) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        Ok(Self {
            overlays: Arc::new(OverlayLibrary::new(config.overlays.clone())),
            config: Arc::new(config),
            backends,
            tracker: Arc::new(JobTracker::new()),
            delegate: None,
            active: Mutex::new(None),
            signal: Mutex::new(None),
            last: Mutex::new(None),
        })
    }

    pub fn with_delegate(mut self, delegate: Arc<dyn CaptureDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn tracker(&self) -> Arc<JobTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn config(&self) -> &CaptureConfiguration {
        &self.config
    }

    /// Whether a job currently holds the devices.
    pub fn is_busy(&self) -> bool {
        self.active.lock().as_ref().is_some_and(|job| !job.handle.is_finished())
    }

    /// Register a job and start it on its own worker thread.
    pub fn start(&self, request: CaptureRequest) -> Result<JobId, CaptureError> {
        let mut active = self.active.lock();
        if let Some(job) = active.as_ref() {
            if !job.handle.is_finished() {
                return Err(CaptureError::DeviceUnavailable(format!(
                    "job {} is still capturing",
                    job.job_id
                )));
            }
        }
        if let Some(finished) = active.take() {
            let _ = self.join(finished);
        }

        let duration_secs = request.duration_secs.unwrap_or(self.config.duration_secs);
        if !(duration_secs.is_finite() && duration_secs > 0.0) {
            return Err(CaptureError::ConfigurationFailed(format!(
                "duration must be positive: {}",
                duration_secs
            )));
        }
        let enable_audio = request.enable_audio.unwrap_or(self.config.enable_audio);
        let output_path = request
            .output_path
            .unwrap_or_else(|| self.config.output_directory.join(default_file_name()));

        let job_id = self.tracker.create(output_path.clone(), duration_secs, enable_audio);
        let cancel = CancelToken::new();
        let ctx = CaptureContext {
            job_id: job_id.clone(),
            config: Arc::clone(&self.config),
            output_path,
            duration: Duration::from_secs_f64(duration_secs),
            enable_audio,
            cancel: cancel.clone(),
        };
        let executor = CaptureExecutor::new(
            ctx,
            self.backends.clone(),
            Arc::clone(&self.overlays),
            Arc::clone(&self.tracker),
            self.delegate.clone(),
        );

        let handle = match thread::Builder::new()
            .name("capture-job".into())
            .spawn(move || executor.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                let error = CaptureError::ConfigurationFailed(format!("failed to start capture worker: {}", e));
                let _ = self
                    .tracker
                    .update(&job_id, JobStatus::Error, JobUpdate::error(error.to_string()));
                return Err(error);
            }
        };

        log::info!("Job {} started ({:.1}s, audio {})", job_id, duration_secs, enable_audio);
        *self.signal.lock() = Some((job_id.clone(), cancel.clone()));
        *active = Some(ActiveJob {
            job_id: job_id.clone(),
            cancel,
            handle,
        });
        Ok(job_id)
    }

    /// Cancel a running job and wait for its worker to exit.
    ///
    /// The job is signalled before joining, so a concurrent `wait` on the same
    /// job cannot delay the cancellation. When this returns the job's camera
    /// and microphone are released.
    pub fn cancel(&self, job_id: &JobId) -> Result<CaptureState, CaptureError> {
        let signalled = match self.signal.lock().as_ref() {
            Some((running, token)) if running == job_id => {
                log::info!("Cancelling job {}", job_id);
                token.cancel();
                true
            }
            _ => false,
        };
        self.finish(job_id, true, signalled)
    }

    /// Block until a running job reaches a terminal state.
    pub fn wait(&self, job_id: &JobId) -> Result<CaptureState, CaptureError> {
        self.finish(job_id, false, true)
    }

    pub fn status(&self, job_id: &JobId) -> Result<JobStatusView, CaptureError> {
        self.tracker.status(job_id)
    }

    /// Join the job's worker. `joined_elsewhere` accepts a job another caller
    /// joined while this one waited for the gate.
    fn finish(&self, job_id: &JobId, cancel: bool, joined_elsewhere: bool) -> Result<CaptureState, CaptureError> {
        // The gate is held across the join so no job is admitted before the
        // devices are free.
        let mut active = self.active.lock();
        match active.take() {
            Some(job) if job.job_id == *job_id => {
                if cancel {
                    job.cancel.cancel();
                }
                self.join(job)
            }
            other => {
                *active = other;
                if joined_elsewhere {
                    if let Some((last_id, state)) = self.last.lock().as_ref() {
                        if last_id == job_id {
                            return Ok(state.clone());
                        }
                    }
                }
                let state = self.tracker.get(job_id)?;
                Err(CaptureError::InvalidTransition(format!(
                    "job {} is not running ({:?})",
                    job_id, state.status
                )))
            }
        }
    }

    fn join(&self, job: ActiveJob) -> Result<CaptureState, CaptureError> {
        let result = job
            .handle
            .join()
            .map_err(|_| CaptureError::StorageError(format!("capture worker for job {} panicked", job.job_id)));
        {
            let mut signal = self.signal.lock();
            if signal.as_ref().is_some_and(|(id, _)| *id == job.job_id) {
                *signal = None;
            }
        }
        if let Ok(state) = &result {
            *self.last.lock() = Some((job.job_id.clone(), state.clone()));
        }
        result
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(job) = self.active.get_mut().take() {
            job.cancel.cancel();
            let _ = self.join(job);
        }
    }
}

fn default_file_name() -> String {
    chrono::Local::now().format("clip_%Y%m%d_%H%M%S.mp4").to_string()
}
