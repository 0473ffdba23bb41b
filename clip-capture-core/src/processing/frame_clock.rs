use std::time::Duration;

/// Lowest camera-reported rate trusted without measuring.
pub const MIN_REPORTED_FPS: f64 = 5.0;
/// Rate assumed when a measured rate is implausibly low.
pub const SLOW_CAMERA_FPS: f64 = 15.0;
/// Ceiling for measured rates.
pub const MAX_MEASURED_FPS: f64 = 30.0;

/// Wall-clock schedule for a fixed-length capture.
///
/// Frame `i` is due at `i / fps` after the capture start. The schedule never
/// consults device timestamps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSchedule {
    fps: f64,
    duration: Duration,
}

impl FrameSchedule {
    pub fn new(fps: f64, duration: Duration) -> Self {
        Self { fps, duration }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps)
    }

    /// `round(fps * duration)`, at least one frame.
    pub fn target_frames(&self) -> u64 {
        ((self.fps * self.duration.as_secs_f64()).round() as u64).max(1)
    }

    /// Offset from the start at which frame `index` is due.
    pub fn deadline(&self, index: u64) -> Duration {
        Duration::from_secs_f64(index as f64 / self.fps)
    }

    /// Number of frame slots whose deadline has passed at `elapsed`.
    pub fn slots_due(&self, elapsed: Duration) -> u64 {
        (elapsed.as_secs_f64() * self.fps).floor() as u64 + 1
    }

    pub fn is_elapsed(&self, elapsed: Duration) -> bool {
        elapsed >= self.duration
    }

    /// Playback length of `frames` at the schedule's rate.
    pub fn playback_secs(&self, frames: u64) -> f64 {
        frames as f64 / self.fps
    }
}

/// Pick the capture frame rate from what the camera reports, or from a
/// measurement of `frames` reads over `elapsed`.
pub fn estimate_fps(reported: Option<f64>, frames: u32, elapsed: Duration) -> f64 {
    if let Some(rate) = reported {
        if rate.is_finite() && rate >= MIN_REPORTED_FPS {
            return rate;
        }
    }
    let secs = elapsed.as_secs_f64().max(1e-3);
    let measured = frames as f64 / secs;
    if measured < MIN_REPORTED_FPS {
        SLOW_CAMERA_FPS
    } else {
        measured.min(MAX_MEASURED_FPS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_frames_rounds() {
        assert_eq!(FrameSchedule::new(30.0, Duration::from_secs(20)).target_frames(), 600);
        assert_eq!(FrameSchedule::new(29.97, Duration::from_secs(20)).target_frames(), 599);
        assert_eq!(FrameSchedule::new(30.0, Duration::from_millis(10)).target_frames(), 1);
    }

    #[test]
    fn target_playback_within_one_frame() {
        for fps in [12.0, 15.0, 24.0, 25.0, 29.97, 30.0, 60.0] {
            for millis in [100u64, 1_000, 3_333, 20_000, 61_700] {
                let schedule = FrameSchedule::new(fps, Duration::from_millis(millis));
                let playback = schedule.playback_secs(schedule.target_frames());
                let requested = millis as f64 / 1000.0;
                assert!((playback - requested).abs() <= 1.0 / fps, "{} fps, {} ms", fps, millis);
            }
        }
    }

    #[test]
    fn deadlines_and_slots() {
        let schedule = FrameSchedule::new(10.0, Duration::from_secs(1));
        assert_eq!(schedule.deadline(0), Duration::ZERO);
        assert_eq!(schedule.deadline(5), Duration::from_millis(500));
        assert_eq!(schedule.slots_due(Duration::ZERO), 1);
        assert_eq!(schedule.slots_due(Duration::from_millis(250)), 3);
        assert!(!schedule.is_elapsed(Duration::from_millis(999)));
        assert!(schedule.is_elapsed(Duration::from_secs(1)));
    }

    #[test]
    fn fps_estimation() {
        assert_eq!(estimate_fps(Some(25.0), 0, Duration::ZERO), 25.0);
        assert_eq!(estimate_fps(Some(0.0), 20, Duration::from_secs(1)), 20.0);
        assert_eq!(estimate_fps(None, 2, Duration::from_secs(1)), SLOW_CAMERA_FPS);
        assert_eq!(estimate_fps(None, 30, Duration::from_millis(500)), MAX_MEASURED_FPS);
    }
}
