use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::artifacts::{is_non_empty_file, AudioArtifact, FinalMedia, VideoArtifact};
use crate::models::config::MuxSettings;
use crate::models::error::CaptureError;
use crate::mux::args::{build_audio_only_args, build_mux_args};
use crate::mux::runner::resolve_program;
use crate::traits::tool_runner::ToolRunner;

/// Lines of muxer stderr kept in a diagnostic.
const STDERR_TAIL_LINES: usize = 8;

/// Fuses the independently timed video and audio artifacts into one file.
///
/// Degrades instead of failing: a missing audio track or a muxer failure
/// yields the video alone. Only when neither artifact is usable does `mux`
/// return an error. Re-running with the same inputs overwrites the output.
pub struct Reconciler {
    runner: Arc<dyn ToolRunner>,
    program: PathBuf,
    policy: MuxSettings,
}

impl Reconciler {
    pub fn new(runner: Arc<dyn ToolRunner>, policy: MuxSettings) -> Self {
        Self {
            program: resolve_program(&policy.program),
            runner,
            policy,
        }
    }

    pub fn mux(
        &self,
        video: Option<&VideoArtifact>,
        audio: Option<&AudioArtifact>,
        output: &Path,
    ) -> Result<FinalMedia, CaptureError> {
        let video = video.filter(|v| v.is_valid_for_reconciliation());
        let audio = audio.filter(|a| a.is_valid_for_reconciliation());

        match (video, audio) {
            (Some(video), Some(audio)) => self.mux_both(video, audio, output),
            (Some(video), None) => {
                log::info!("No audio track, keeping video only");
                self.keep_video(video, output, None)
            }
            (None, Some(audio)) => self.keep_audio(audio, output),
            (None, None) => Err(CaptureError::StorageError(
                "neither a video nor an audio artifact was produced".into(),
            )),
        }
    }

    fn mux_both(&self, video: &VideoArtifact, audio: &AudioArtifact, output: &Path) -> Result<FinalMedia, CaptureError> {
        prepare_parent(output)?;
        let args = build_mux_args(&video.path, &audio.path, output, &self.policy);
        log::info!(
            "Muxing {} ({:.2}s) with {} ({:.2}s)",
            video.path.display(),
            video.playback_secs(),
            audio.path.display(),
            audio.duration_secs
        );

        let failure = match self.runner.run(&self.program, &args, self.policy.timeout()) {
            Ok(result) if result.success() && is_non_empty_file(output) => {
                log::info!("Muxed {}", output.display());
                return Ok(FinalMedia {
                    path: output.to_path_buf(),
                    has_video: true,
                    has_audio: true,
                    diagnostic: None,
                });
            }
            Ok(result) if result.timed_out => format!("muxer timed out after {:.0}s", self.policy.timeout_secs),
            Ok(result) => format!(
                "muxer exited with {}: {}",
                result.status.map(|c| c.to_string()).unwrap_or_else(|| "signal".into()),
                result.stderr_tail(STDERR_TAIL_LINES)
            ),
            Err(e) => e.to_string(),
        };

        let error = CaptureError::MuxingFailure(failure);
        log::warn!("{}; falling back to video only", error);
        if output != video.path.as_path() {
            let _ = fs::remove_file(output);
        }
        self.keep_video(video, output, Some(error.to_string()))
    }

    fn keep_video(&self, video: &VideoArtifact, output: &Path, diagnostic: Option<String>) -> Result<FinalMedia, CaptureError> {
        let target = with_extension_of(output, &video.path);
        copy_artifact(&video.path, &target)?;
        Ok(FinalMedia {
            path: target,
            has_video: true,
            has_audio: false,
            diagnostic,
        })
    }

    fn keep_audio(&self, audio: &AudioArtifact, output: &Path) -> Result<FinalMedia, CaptureError> {
        log::warn!("Video artifact unusable, producing audio only");
        let target = output.with_extension("m4a");
        prepare_parent(&target)?;
        let args = build_audio_only_args(&audio.path, &target, &self.policy);

        let failure = match self.runner.run(&self.program, &args, self.policy.timeout()) {
            Ok(result) if result.success() && is_non_empty_file(&target) => {
                return Ok(FinalMedia {
                    path: target,
                    has_video: false,
                    has_audio: true,
                    diagnostic: Some("video artifact unavailable".into()),
                });
            }
            Ok(result) => result.stderr_tail(STDERR_TAIL_LINES),
            Err(e) => e.to_string(),
        };

        let _ = fs::remove_file(&target);
        let wav = output.with_extension("wav");
        copy_artifact(&audio.path, &wav)?;
        Ok(FinalMedia {
            path: wav,
            has_video: false,
            has_audio: true,
            diagnostic: Some(format!(
                "video artifact unavailable; {}",
                CaptureError::MuxingFailure(failure)
            )),
        })
    }
}

/// Delete intermediates once the final file is confirmed on disk.
///
/// Paths equal to `final_path` are kept. Returns how many files were removed.
pub fn remove_intermediates(final_path: &Path, intermediates: &[&Path]) -> usize {
    if !is_non_empty_file(final_path) {
        log::warn!("Final file {} missing, keeping intermediates", final_path.display());
        return 0;
    }
    let mut removed = 0;
    for path in intermediates {
        if *path == final_path {
            continue;
        }
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Could not remove {}: {}", path.display(), e),
        }
    }
    removed
}

/// `output` with the extension of `source`, so a copy keeps a truthful suffix.
fn with_extension_of(output: &Path, source: &Path) -> PathBuf {
    match source.extension() {
        Some(ext) if output.extension() != Some(ext) => output.with_extension(ext),
        _ => output.to_path_buf(),
    }
}

fn copy_artifact(from: &Path, to: &Path) -> Result<(), CaptureError> {
    if from == to {
        return Ok(());
    }
    prepare_parent(to)?;
    fs::copy(from, to).map_err(|e| {
        CaptureError::storage(&format!("failed to copy {} to {}", from.display(), to.display()), e)
    })?;
    Ok(())
}

fn prepare_parent(path: &Path) -> Result<(), CaptureError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| CaptureError::storage("failed to create directory", e))
        }
        _ => Ok(()),
    }
}
