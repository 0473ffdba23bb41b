use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use crate::models::error::CaptureError;
use crate::models::job::{JobId, JobState, JobStatus, JobStatusView, JobUpdate};

/// In-memory record of every job since process start.
///
/// Snapshots are immutable `Arc<JobState>` values replaced wholesale on each
/// update, so a reader holds either the old state or the new one, never a
/// mix. Each job has a single writer: the worker executing it.
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: RwLock<HashMap<JobId, Arc<JobState>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job in `recording` status.
    pub fn create(&self, output_path: PathBuf, duration_secs: f64, audio_enabled: bool) -> JobId {
        let job_id = JobId::generate();
        let now = Utc::now();
        let state = JobState {
            job_id: job_id.clone(),
            status: JobStatus::Recording,
            output_path,
            duration_secs,
            audio_enabled,
            phase: "idle".into(),
            error: None,
            diagnostic: None,
            created_at: now,
            updated_at: now,
        };
        self.jobs.write().insert(job_id.clone(), Arc::new(state));
        log::debug!("Job {} created", job_id);
        job_id
    }

    /// Apply `status` and the fields set in `update`. Terminal jobs are frozen.
    pub fn update(&self, job_id: &JobId, status: JobStatus, update: JobUpdate) -> Result<Arc<JobState>, CaptureError> {
        let mut jobs = self.jobs.write();
        let current = jobs
            .get(job_id)
            .ok_or_else(|| CaptureError::JobNotFound(job_id.to_string()))?;
        if current.status.is_terminal() {
            return Err(CaptureError::InvalidTransition(format!(
                "job {} is already {:?}",
                job_id, current.status
            )));
        }

        let mut next = JobState::clone(current);
        next.status = status;
        if let Some(path) = update.output_path {
            next.output_path = path;
        }
        if let Some(phase) = update.phase {
            next.phase = phase;
        }
        if let Some(error) = update.error {
            next.error = Some(error);
        }
        if let Some(diagnostic) = update.diagnostic {
            next.diagnostic = Some(diagnostic);
        }
        next.updated_at = Utc::now();

        let next = Arc::new(next);
        jobs.insert(job_id.clone(), Arc::clone(&next));
        if status.is_terminal() {
            log::info!("Job {} {:?}", job_id, status);
        }
        Ok(next)
    }

    pub fn get(&self, job_id: &JobId) -> Result<Arc<JobState>, CaptureError> {
        self.jobs
            .read()
            .get(job_id)
            .cloned()
            .ok_or_else(|| CaptureError::JobNotFound(job_id.to_string()))
    }

    pub fn status(&self, job_id: &JobId) -> Result<JobStatusView, CaptureError> {
        self.get(job_id).map(|state| JobStatusView::from(state.as_ref()))
    }

    /// All jobs, oldest first.
    pub fn list(&self) -> Vec<Arc<JobState>> {
        let mut jobs: Vec<_> = self.jobs.read().values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn create_then_get() {
        let tracker = JobTracker::new();
        let id = tracker.create(PathBuf::from("/tmp/clip.mp4"), 20.0, true);
        let state = tracker.get(&id).unwrap();
        assert_eq!(state.status, JobStatus::Recording);
        assert_eq!(state.phase, "idle");
        assert!(state.error.is_none());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn unknown_job_is_not_found() {
        let tracker = JobTracker::new();
        let missing = JobId::from("nope");
        assert_eq!(tracker.get(&missing), Err(CaptureError::JobNotFound("nope".into())));
        assert!(tracker.update(&missing, JobStatus::Error, JobUpdate::default()).is_err());
    }

    #[test]
    fn update_replaces_snapshot() {
        let tracker = JobTracker::new();
        let id = tracker.create(PathBuf::from("/tmp/clip.mp4"), 20.0, true);
        let before = tracker.get(&id).unwrap();

        tracker.update(&id, JobStatus::Recording, JobUpdate::phase("capturing")).unwrap();
        let after = tracker
            .update(
                &id,
                JobStatus::Completed,
                JobUpdate {
                    output_path: Some(PathBuf::from("/tmp/clip.avi")),
                    diagnostic: Some("muxing failed".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        // Readers holding the old snapshot are unaffected.
        assert_eq!(before.phase, "idle");
        assert_eq!(after.phase, "capturing");
        assert_eq!(after.output_path, PathBuf::from("/tmp/clip.avi"));
        assert!(after.error.is_none());

        let view = tracker.status(&id).unwrap();
        assert_eq!(view.status, JobStatus::Completed);
        assert_eq!(view.output_path, PathBuf::from("/tmp/clip.avi"));
    }

    #[test]
    fn terminal_jobs_are_frozen() {
        let tracker = JobTracker::new();
        let id = tracker.create(PathBuf::from("/tmp/clip.mp4"), 20.0, false);
        tracker.update(&id, JobStatus::Error, JobUpdate::error("device unavailable")).unwrap();
        let result = tracker.update(&id, JobStatus::Recording, JobUpdate::phase("capturing"));
        assert!(matches!(result, Err(CaptureError::InvalidTransition(_))));
        assert_eq!(tracker.get(&id).unwrap().error.as_deref(), Some("device unavailable"));
    }

    #[test]
    fn readers_see_consistent_snapshots() {
        let tracker = Arc::new(JobTracker::new());
        let id = tracker.create(PathBuf::from("/tmp/clip.mp4"), 20.0, true);

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                let id = id.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let state = tracker.get(&id).unwrap();
                        // Phase and diagnostic are always written together.
                        match state.diagnostic.as_deref() {
                            Some(d) => assert_eq!(Some(d), state.phase.strip_prefix("step-")),
                            None => assert_eq!(state.phase, "idle"),
                        }
                    }
                })
            })
            .collect();

        for i in 0..500 {
            tracker
                .update(
                    &id,
                    JobStatus::Recording,
                    JobUpdate {
                        phase: Some(format!("step-{}", i)),
                        diagnostic: Some(i.to_string()),
                        ..Default::default()
                    },
                )
                .unwrap();
        }
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(tracker.list().len(), 1);
    }
}
