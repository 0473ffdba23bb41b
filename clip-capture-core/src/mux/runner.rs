use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use wait_timeout::ChildExt;

use crate::models::error::CaptureError;
use crate::traits::tool_runner::{ToolOutput, ToolRunner};

/// Runs tools as child processes, killing them on timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&self, program: &Path, args: &[String], timeout: Duration) -> Result<ToolOutput, CaptureError> {
        log::debug!("Running {} {}", program.display(), args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to start {}: {}", program.display(), e)))?;

        // Drain both pipes so a chatty tool cannot block on a full buffer.
        let stdout = child.stdout.take().and_then(|out| drain("tool-stdout", out));
        let stderr = child.stderr.take().and_then(|err| drain("tool-stderr", err));

        let (status, timed_out) = match child.wait_timeout(timeout) {
            Ok(Some(status)) => (status.code(), false),
            Ok(None) => {
                log::warn!("{} timed out after {:.1}s, killing it", program.display(), timeout.as_secs_f64());
                let _ = child.kill();
                let _ = child.wait();
                (None, true)
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CaptureError::StorageError(format!("failed to wait for {}: {}", program.display(), e)));
            }
        };

        Ok(ToolOutput {
            status,
            stdout: collect(stdout),
            stderr: collect(stderr),
            timed_out,
        })
    }
}

/// Resolve a bare program name on PATH; paths are returned unchanged.
pub fn resolve_program(program: &Path) -> PathBuf {
    if program.components().count() != 1 {
        return program.to_path_buf();
    }
    match which::which(program) {
        Ok(resolved) => {
            log::debug!("Resolved {} to {}", program.display(), resolved.display());
            resolved
        }
        Err(_) => program.to_path_buf(),
    }
}

pub(crate) fn drain<R: Read + Send + 'static>(name: &str, mut reader: R) -> Option<JoinHandle<String>> {
    thread::Builder::new()
        .name(name.into())
        .spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
        .ok()
}

pub(crate) fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}
