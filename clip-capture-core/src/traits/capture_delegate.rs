use crate::models::artifacts::FinalMedia;
use crate::models::error::CaptureError;
use crate::models::job::JobId;
use crate::models::state::CaptureState;

/// Event delegate for capture job notifications.
///
/// All methods are called from the job's worker thread. Implementations
/// should hand off to their own thread if they do anything slow.
pub trait CaptureDelegate: Send + Sync {
    /// Called after every state transition.
    fn on_state_changed(&self, job_id: &JobId, state: &CaptureState);

    /// Called for degraded paths and for the error that ends a job.
    fn on_error(&self, job_id: &JobId, error: &CaptureError);

    /// Called once the final container is written.
    fn on_capture_finished(&self, job_id: &JobId, media: &FinalMedia);
}
