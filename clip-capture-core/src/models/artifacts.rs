use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Intermediate video file written by the capture loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoArtifact {
    pub path: PathBuf,
    /// Nominal frame rate the file was encoded at.
    pub fps: f64,
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
}

impl VideoArtifact {
    /// Playback length implied by frame count and nominal rate.
    pub fn playback_secs(&self) -> f64 {
        if self.fps <= 0.0 {
            return 0.0;
        }
        self.frame_count as f64 / self.fps
    }

    pub fn is_valid_for_reconciliation(&self) -> bool {
        self.frame_count > 0 && is_non_empty_file(&self.path)
    }
}

/// Intermediate lossless audio file written by the audio session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioArtifact {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    pub duration_secs: f64,
    /// Linear gain applied by the low-signal safety net (1.0 = untouched).
    pub gain: f32,
    /// SHA-256 of the finished file, lowercase hex.
    pub checksum: String,
}

impl AudioArtifact {
    pub fn is_valid_for_reconciliation(&self) -> bool {
        is_non_empty_file(&self.path)
    }
}

/// The single container handed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalMedia {
    pub path: PathBuf,
    pub has_video: bool,
    pub has_audio: bool,
    /// Why the output degraded, if it did. Never a job failure.
    pub diagnostic: Option<String>,
}

/// `true` when `path` is a regular file with at least one byte.
pub fn is_non_empty_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(path: PathBuf, frame_count: u64) -> VideoArtifact {
        VideoArtifact {
            path,
            fps: 30.0,
            frame_count,
            width: 1280,
            height: 720,
        }
    }

    #[test]
    fn playback_duration_from_frames() {
        let artifact = video(PathBuf::from("x.mp4"), 600);
        assert!((artifact.playback_secs() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn validity_requires_non_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.mp4");
        let full = dir.path().join("full.mp4");
        fs::write(&empty, b"").unwrap();
        fs::write(&full, b"data").unwrap();

        assert!(!video(dir.path().join("missing.mp4"), 10).is_valid_for_reconciliation());
        assert!(!video(empty, 10).is_valid_for_reconciliation());
        assert!(video(full.clone(), 10).is_valid_for_reconciliation());
        assert!(!video(full, 0).is_valid_for_reconciliation());
    }
}
