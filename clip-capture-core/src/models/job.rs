use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque job identifier: a v4 UUID rendered as 32 lowercase hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status values exposed to pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Recording,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Recording)
    }
}

/// Snapshot of one capture job. Replaced wholesale on every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    pub job_id: JobId,
    pub status: JobStatus,
    pub output_path: PathBuf,
    pub duration_secs: f64,
    pub audio_enabled: bool,
    /// Lower-case name of the executor state (`countdown`, `capturing`, ...).
    pub phase: String,
    pub error: Option<String>,
    /// Degradation notes (mux fallback, missing audio). Not an error.
    pub diagnostic: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Optional fields carried by a tracker update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub output_path: Option<PathBuf>,
    pub phase: Option<String>,
    pub error: Option<String>,
    pub diagnostic: Option<String>,
}

impl JobUpdate {
    pub fn phase(phase: impl Into<String>) -> Self {
        Self {
            phase: Some(phase.into()),
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// The job status surface: `{job_id, status, output_path, error?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub output_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&JobState> for JobStatusView {
    fn from(state: &JobState) -> Self {
        Self {
            job_id: state.job_id.clone(),
            status: state.status,
            output_path: state.output_path.clone(),
            error: state.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_is_32_hex_digits() {
        let id = JobId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, JobId::generate());
    }

    #[test]
    fn status_view_json_shape() {
        let view = JobStatusView {
            job_id: JobId::from("abc"),
            status: JobStatus::Completed,
            output_path: PathBuf::from("/tmp/out.mp4"),
            error: None,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["job_id"], "abc");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["output_path"], "/tmp/out.mp4");
        assert!(json.get("error").is_none());
    }
}
