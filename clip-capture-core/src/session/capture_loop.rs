use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::error::CaptureError;
use crate::models::frame::Frame;
use crate::processing::frame_clock::{estimate_fps, FrameSchedule, MIN_REPORTED_FPS};
use crate::processing::overlay::Compositor;
use crate::session::cancel::CancelToken;
use crate::traits::camera::FrameSource;
use crate::traits::clock::Clock;
use crate::traits::video_sink::VideoSink;

/// Where each written frame came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopStats {
    pub frames_written: u64,
    /// Successful device reads.
    pub captured: u64,
    /// Failed reads answered with the previous frame.
    pub reused: u64,
    /// Extra writes for deadlines a slow read overran.
    pub duplicated: u64,
    /// Writes appended after the wall clock ran out.
    pub padded: u64,
}

/// Read and discard frames for `countdown`, returning the last good one.
///
/// Lets auto-exposure settle. Cancellation is checked between reads.
pub fn run_countdown(
    source: &mut dyn FrameSource,
    clock: &dyn Clock,
    countdown: Duration,
    interval: Duration,
    cancel: &CancelToken,
) -> Result<Option<Frame>, CaptureError> {
    let start = clock.now();
    let mut last = None;
    let mut announced = None;

    loop {
        if cancel.is_cancelled() {
            return Err(CaptureError::Cancelled);
        }
        let elapsed = clock.now().saturating_sub(start);
        if elapsed >= countdown {
            break;
        }
        let remaining = (countdown - elapsed).as_secs_f64().ceil() as u64;
        if announced != Some(remaining) {
            log::info!("Recording starts in {}s", remaining);
            announced = Some(remaining);
        }

        match source.read_frame() {
            Ok(frame) => last = Some(frame),
            Err(e) => log::debug!("Countdown read failed: {}", e),
        }
        clock.sleep(interval.min(countdown.saturating_sub(clock.now().saturating_sub(start))));
    }
    Ok(last)
}

/// Effective capture rate for `source`.
///
/// Trusts a reported rate of at least 5 fps; otherwise reads up to
/// `max_reads` frames within `window` and measures.
pub fn probe_fps(source: &mut dyn FrameSource, clock: &dyn Clock, window: Duration, max_reads: u32) -> f64 {
    let reported = source.reported_fps();
    if reported.is_some_and(|fps| fps >= MIN_REPORTED_FPS) {
        return estimate_fps(reported, 0, Duration::ZERO);
    }

    let start = clock.now();
    let mut frames = 0;
    while frames < max_reads && clock.now().saturating_sub(start) < window {
        if source.read_frame().is_ok() {
            frames += 1;
        }
    }
    let fps = estimate_fps(reported, frames, clock.now().saturating_sub(start));
    log::info!("Measured camera rate: {} frames -> {:.1} fps", frames, fps);
    fps
}

/// Deadline-driven capture loop.
///
/// Frame `i` is written at `start + i / fps` by the wall clock. A read that
/// overruns later deadlines is written once per missed slot, a failed read
/// reuses the previous frame, and the loop stops when the wall clock reaches
/// the duration, padding with the last frame up to `round(fps * duration)`.
pub struct FrameClock {
    clock: Arc<dyn Clock>,
    schedule: FrameSchedule,
    frame_size: (u32, u32),
    compositor: Compositor,
    cancel: CancelToken,
}

impl FrameClock {
    pub fn new(
        clock: Arc<dyn Clock>,
        schedule: FrameSchedule,
        frame_size: (u32, u32),
        compositor: Compositor,
        cancel: CancelToken,
    ) -> Self {
        Self {
            clock,
            schedule,
            frame_size,
            compositor,
            cancel,
        }
    }

    pub fn schedule(&self) -> &FrameSchedule {
        &self.schedule
    }

    /// Run until the duration elapses. `on_progress` receives elapsed
    /// seconds about once per second of video.
    pub fn run(
        &self,
        source: &mut dyn FrameSource,
        sink: &mut dyn VideoSink,
        first_frame: Option<Frame>,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<LoopStats, CaptureError> {
        let (width, height) = self.frame_size;
        let target = self.schedule.target_frames();
        let progress_every = (self.schedule.fps().round() as u64).max(1);
        let start = self.clock.now();
        let mut last = first_frame.map(|f| f.fitted(width, height));
        let mut stats = LoopStats::default();

        log::info!(
            "Capturing {} frames at {:.2} fps ({:.1}s)",
            target,
            self.schedule.fps(),
            self.schedule.duration().as_secs_f64()
        );

        loop {
            if self.cancel.is_cancelled() {
                return Err(CaptureError::Cancelled);
            }
            let elapsed = self.clock.now().saturating_sub(start);
            if self.schedule.is_elapsed(elapsed) {
                break;
            }
            if stats.frames_written >= target {
                // Frame count met early; hold the wall-clock contract.
                self.clock.sleep(self.schedule.duration() - elapsed);
                break;
            }

            let deadline = self.schedule.deadline(stats.frames_written);
            if deadline > elapsed {
                self.clock.sleep(deadline - elapsed);
            }

            match source.read_frame() {
                Ok(frame) => {
                    stats.captured += 1;
                    last = Some(frame.fitted(width, height));
                }
                Err(e) => {
                    stats.reused += 1;
                    log::trace!("Reusing previous frame at tick {}: {}", stats.frames_written, e);
                }
            }
            let frame = last.get_or_insert_with(|| Frame::blank(width, height));

            let elapsed = self.clock.now().saturating_sub(start);
            let due = self.schedule.slots_due(elapsed).min(target);
            let slots = due.saturating_sub(stats.frames_written).max(1);
            for _ in 0..slots {
                sink.write_frame(&self.compositor.composite(frame, stats.frames_written))?;
                stats.frames_written += 1;
                if stats.frames_written % progress_every == 0 {
                    on_progress(elapsed.as_secs_f64());
                }
            }
            stats.duplicated += slots - 1;
        }

        if stats.frames_written < target {
            let frame = last.unwrap_or_else(|| Frame::blank(width, height));
            log::debug!("Padding {} frames after the wall clock ran out", target - stats.frames_written);
            while stats.frames_written < target {
                sink.write_frame(&self.compositor.composite(&frame, stats.frames_written))?;
                stats.frames_written += 1;
                stats.padded += 1;
            }
        }

        log::info!(
            "Capture loop done: {} written ({} captured, {} reused, {} duplicated, {} padded)",
            stats.frames_written,
            stats.captured,
            stats.reused,
            stats.duplicated,
            stats.padded
        );
        Ok(stats)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::artifacts::VideoArtifact;
    use crate::traits::clock::ManualClock;
    use std::collections::VecDeque;

    /// Camera whose reads cost `read_cost` of manual-clock time.
    pub(crate) struct ScriptedSource {
        pub clock: Arc<ManualClock>,
        pub read_cost: Duration,
        pub script: VecDeque<Result<Frame, CaptureError>>,
        pub fallback: Option<Frame>,
        pub reported: Option<f64>,
        pub reads: u64,
        pub closed: bool,
    }

    impl ScriptedSource {
        pub(crate) fn solid(clock: Arc<ManualClock>, value: u8, read_cost: Duration) -> Self {
            Self {
                clock,
                read_cost,
                script: VecDeque::new(),
                fallback: Some(Frame::new(4, 2, vec![value; 24]).unwrap()),
                reported: None,
                reads: 0,
                closed: false,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn read_frame(&mut self) -> Result<Frame, CaptureError> {
            self.reads += 1;
            self.clock.advance(self.read_cost);
            match self.script.pop_front() {
                Some(result) => result,
                None => self
                    .fallback
                    .clone()
                    .ok_or_else(|| CaptureError::FrameReadTransient("no frame".into())),
            }
        }

        fn reported_fps(&self) -> Option<f64> {
            self.reported
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[derive(Default)]
    pub(crate) struct MemorySink {
        pub frames: Vec<Frame>,
    }

    impl VideoSink for MemorySink {
        fn write_frame(&mut self, frame: &Frame) -> Result<(), CaptureError> {
            self.frames.push(frame.clone());
            Ok(())
        }

        fn frames_written(&self) -> u64 {
            self.frames.len() as u64
        }

        fn finish(&mut self) -> Result<VideoArtifact, CaptureError> {
            Err(CaptureError::StorageError("memory sink has no file".into()))
        }
    }

    fn frame_clock(clock: Arc<ManualClock>, fps: f64, secs: f64, cancel: CancelToken) -> FrameClock {
        FrameClock::new(
            clock,
            FrameSchedule::new(fps, Duration::from_secs_f64(secs)),
            (4, 2),
            Compositor::empty(fps),
            cancel,
        )
    }

    #[test]
    fn steady_camera_hits_target_count() {
        let clock = Arc::new(ManualClock::new());
        let mut source = ScriptedSource::solid(clock.clone(), 7, Duration::from_millis(5));
        let mut sink = MemorySink::default();
        let mut progress = Vec::new();

        let stats = frame_clock(clock.clone(), 10.0, 2.0, CancelToken::new())
            .run(&mut source, &mut sink, None, &mut |secs: f64| progress.push(secs))
            .unwrap();

        assert_eq!(stats.frames_written, 20);
        assert_eq!(sink.frames.len(), 20);
        assert_eq!(stats.captured, 20);
        assert_eq!(stats.duplicated + stats.padded + stats.reused, 0);
        assert_eq!(progress.len(), 2);
        assert!(clock.now() >= Duration::from_secs(2));
    }

    #[test]
    fn slow_camera_duplicates_missed_slots() {
        let clock = Arc::new(ManualClock::new());
        let mut source = ScriptedSource::solid(clock.clone(), 7, Duration::from_millis(250));
        let mut sink = MemorySink::default();

        let stats = frame_clock(clock, 10.0, 1.0, CancelToken::new())
            .run(&mut source, &mut sink, None, &mut |_: f64| {})
            .unwrap();

        assert_eq!(stats.frames_written, 10);
        assert!(stats.captured < 10);
        assert!(stats.duplicated > 0);
        assert_eq!(stats.captured + stats.duplicated + stats.padded, 10);
    }

    #[test]
    fn failed_reads_reuse_last_frame() {
        let clock = Arc::new(ManualClock::new());
        let mut source = ScriptedSource::solid(clock.clone(), 9, Duration::from_millis(1));
        source.fallback = None;
        source.script.push_back(Ok(Frame::new(4, 2, vec![9; 24]).unwrap()));
        let mut sink = MemorySink::default();

        let stats = frame_clock(clock, 10.0, 1.0, CancelToken::new())
            .run(&mut source, &mut sink, None, &mut |_: f64| {})
            .unwrap();

        assert_eq!(stats.frames_written, 10);
        assert_eq!(stats.captured, 1);
        assert_eq!(stats.reused, 9);
        assert!(sink.frames.iter().all(|f| f.as_bytes() == [9u8; 24]));
    }

    #[test]
    fn seeds_from_countdown_frame_when_device_never_delivers() {
        let clock = Arc::new(ManualClock::new());
        let mut source = ScriptedSource::solid(clock.clone(), 0, Duration::from_millis(1));
        source.fallback = None;
        let mut sink = MemorySink::default();
        let seed = Frame::new(4, 2, vec![3; 24]).unwrap();

        frame_clock(clock, 5.0, 1.0, CancelToken::new())
            .run(&mut source, &mut sink, Some(seed.clone()), &mut |_: f64| {})
            .unwrap();
        assert_eq!(sink.frames, vec![seed; 5]);
    }

    #[test]
    fn resizes_frames_to_sink_size() {
        let clock = Arc::new(ManualClock::new());
        let mut source = ScriptedSource::solid(clock.clone(), 0, Duration::from_millis(1));
        source.fallback = Some(Frame::new(8, 4, vec![100; 96]).unwrap());
        let mut sink = MemorySink::default();

        frame_clock(clock, 5.0, 1.0, CancelToken::new())
            .run(&mut source, &mut sink, None, &mut |_: f64| {})
            .unwrap();
        assert!(sink.frames.iter().all(|f| f.dimensions() == (4, 2)));
    }

    #[test]
    fn cancellation_stops_the_loop() {
        let clock = Arc::new(ManualClock::new());
        let mut source = ScriptedSource::solid(clock.clone(), 1, Duration::from_millis(1));
        let mut sink = MemorySink::default();
        let cancel = CancelToken::new();
        let trigger = cancel.clone();

        let result = frame_clock(clock, 10.0, 5.0, cancel).run(&mut source, &mut sink, None, &mut |_: f64| trigger.cancel());
        assert_eq!(result, Err(CaptureError::Cancelled));
        assert_eq!(sink.frames.len(), 10);
    }

    #[test]
    fn countdown_discards_frames_and_keeps_the_last() {
        let clock = Arc::new(ManualClock::new());
        let mut source = ScriptedSource::solid(clock.clone(), 0, Duration::ZERO);
        source.script.extend((1..=3u8).map(|v| Ok(Frame::new(4, 2, vec![v; 24]).unwrap())));
        source.fallback = None;

        let last = run_countdown(
            &mut source,
            clock.as_ref(),
            Duration::from_secs(3),
            Duration::from_millis(500),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(last.unwrap().as_bytes(), &[3u8; 24]);
        assert_eq!(source.reads, 6);
        assert_eq!(clock.now(), Duration::from_secs(3));
    }

    #[test]
    fn countdown_honours_cancel() {
        let clock = Arc::new(ManualClock::new());
        let mut source = ScriptedSource::solid(clock.clone(), 0, Duration::ZERO);
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = run_countdown(&mut source, clock.as_ref(), Duration::from_secs(3), Duration::from_millis(100), &cancel);
        assert_eq!(result, Err(CaptureError::Cancelled));
    }

    #[test]
    fn probing_prefers_reported_rate() {
        let clock = Arc::new(ManualClock::new());
        let mut source = ScriptedSource::solid(clock.clone(), 0, Duration::from_millis(40));
        source.reported = Some(24.0);
        assert_eq!(probe_fps(&mut source, clock.as_ref(), Duration::from_secs(1), 30), 24.0);
        assert_eq!(source.reads, 0);

        source.reported = None;
        let fps = probe_fps(&mut source, clock.as_ref(), Duration::from_secs(1), 30);
        assert!((fps - 25.0).abs() < 1e-9);
    }
}
