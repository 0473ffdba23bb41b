use std::path::Path;
use std::time::Duration;

use crate::models::error::CaptureError;

/// Everything an external tool reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` when killed by a signal or on timeout.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status == Some(0)
    }

    /// Last `lines` lines of stderr, for diagnostics.
    pub fn stderr_tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.stderr.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

/// Runs an external program to completion or timeout.
///
/// Exit code and output are the only failure signal. `Err` is reserved for
/// programs that could not be started at all.
pub trait ToolRunner: Send + Sync {
    fn run(&self, program: &Path, args: &[String], timeout: Duration) -> Result<ToolOutput, CaptureError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_requires_zero_exit_without_timeout() {
        let ok = ToolOutput {
            status: Some(0),
            ..Default::default()
        };
        assert!(ok.success());

        let failed = ToolOutput {
            status: Some(1),
            ..Default::default()
        };
        assert!(!failed.success());

        let timed_out = ToolOutput {
            status: Some(0),
            timed_out: true,
            ..Default::default()
        };
        assert!(!timed_out.success());
    }

    #[test]
    fn stderr_tail_skips_blank_lines() {
        let output = ToolOutput {
            stderr: "one\n\ntwo\nthree\n\n".into(),
            ..Default::default()
        };
        assert_eq!(output.stderr_tail(2), "two\nthree");
        assert_eq!(output.stderr_tail(10), "one\ntwo\nthree");
    }
}
