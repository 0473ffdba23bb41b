use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::artifacts::{AudioArtifact, FinalMedia, VideoArtifact};
use crate::models::error::CaptureError;
use crate::models::job::JobId;
use crate::session::capture_loop::LoopStats;

/// Sidecar describing how a clip was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    pub id: String,
    pub job_id: JobId,
    pub created_at: DateTime<Utc>,
    pub output_path: PathBuf,
    pub requested_duration_secs: f64,
    pub has_video: bool,
    pub has_audio: bool,
    pub video: Option<VideoArtifact>,
    pub audio: Option<AudioArtifact>,
    pub frames: Option<LoopStats>,
    pub diagnostic: Option<String>,
}

impl CaptureMetadata {
    pub fn new(job_id: JobId, requested_duration_secs: f64, media: &FinalMedia) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_id,
            created_at: Utc::now(),
            output_path: media.path.clone(),
            requested_duration_secs,
            has_video: media.has_video,
            has_audio: media.has_audio,
            video: None,
            audio: None,
            frames: None,
            diagnostic: media.diagnostic.clone(),
        }
    }
}

/// Path of the sidecar for `recording_path`.
pub fn metadata_path(recording_path: &Path) -> PathBuf {
    recording_path.with_extension("metadata.json")
}

/// Write clip metadata as a JSON sidecar file.
///
/// Creates `{recording_stem}.metadata.json` alongside the recording.
pub fn write_metadata(metadata: &CaptureMetadata, recording_path: &Path) -> Result<PathBuf, CaptureError> {
    let path = metadata_path(recording_path);
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| CaptureError::StorageError(format!("failed to serialize metadata: {}", e)))?;
    fs::write(&path, json).map_err(|e| CaptureError::StorageError(format!("failed to write metadata: {}", e)))?;
    Ok(path)
}

/// Read clip metadata from a JSON sidecar file.
pub fn read_metadata(recording_path: &Path) -> Result<CaptureMetadata, CaptureError> {
    let json = fs::read_to_string(metadata_path(recording_path))
        .map_err(|e| CaptureError::StorageError(format!("failed to read metadata: {}", e)))?;
    serde_json::from_str(&json).map_err(|e| CaptureError::StorageError(format!("failed to parse metadata: {}", e)))
}
