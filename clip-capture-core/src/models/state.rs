use super::artifacts::FinalMedia;
use super::error::CaptureError;
use super::job::JobStatus;

/// Capture job state machine.
///
/// State transitions:
/// ```text
/// idle → countdown → capturing → finalizing → completed
///          │             │            │
///          └─────────────┴────────────┴──────→ failed
/// ```
///
/// [`CaptureState::apply`] is pure: it maps (state, event) to the next state
/// plus the side effects the executor must perform, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    Idle,
    Countdown,
    Capturing { elapsed_secs: f64 },
    Finalizing,
    Completed(Box<FinalMedia>),
    Failed(CaptureError),
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Start,
    CountdownElapsed,
    Progress { elapsed_secs: f64 },
    CaptureElapsed,
    Finalized(Box<FinalMedia>),
    Fail(CaptureError),
    Cancel,
}

/// Work the executor performs after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    /// Resolve devices, open the camera and the video sink.
    OpenDevices,
    /// Read and discard frames for the warm-up period.
    RunCountdown,
    /// Spawn the audio session on its own thread.
    StartAudioSession,
    /// Run the deadline-driven video loop.
    RunFrameClock,
    CloseSink,
    ReleaseDevices,
    /// Wait for the audio session to finish writing.
    JoinAudioSession,
    Reconcile,
    RemoveIntermediates,
    WriteMetadata,
    PublishStatus(JobStatus),
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: CaptureState,
    pub effects: Vec<SideEffect>,
}

impl Transition {
    fn to(state: CaptureState, effects: Vec<SideEffect>) -> Self {
        Self { state, effects }
    }
}

impl CaptureState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }

    /// Lower-case name used as the job's phase.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Countdown => "countdown",
            Self::Capturing { .. } => "capturing",
            Self::Finalizing => "finalizing",
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
        }
    }

    /// Compute the next state and its side effects.
    pub fn apply(&self, event: CaptureEvent) -> Result<Transition, CaptureError> {
        use CaptureEvent as E;
        use SideEffect as S;

        let transition = match (self, event) {
            (Self::Idle, E::Start) => Transition::to(
                Self::Countdown,
                vec![S::PublishStatus(JobStatus::Recording), S::OpenDevices, S::RunCountdown],
            ),
            (Self::Countdown, E::CountdownElapsed) => Transition::to(
                Self::Capturing { elapsed_secs: 0.0 },
                vec![S::StartAudioSession, S::RunFrameClock],
            ),
            (Self::Capturing { .. }, E::Progress { elapsed_secs }) => {
                Transition::to(Self::Capturing { elapsed_secs }, Vec::new())
            }
            (Self::Capturing { .. }, E::CaptureElapsed) => Transition::to(
                Self::Finalizing,
                vec![S::CloseSink, S::ReleaseDevices, S::JoinAudioSession, S::Reconcile],
            ),
            (Self::Finalizing, E::Finalized(media)) => Transition::to(
                Self::Completed(media),
                vec![S::RemoveIntermediates, S::WriteMetadata, S::PublishStatus(JobStatus::Completed)],
            ),
            (Self::Idle, E::Fail(error)) => {
                Transition::to(Self::Failed(error), vec![S::PublishStatus(JobStatus::Error)])
            }
            (Self::Countdown | Self::Capturing { .. } | Self::Finalizing, E::Fail(error)) => Transition::to(
                Self::Failed(error),
                vec![S::ReleaseDevices, S::JoinAudioSession, S::PublishStatus(JobStatus::Error)],
            ),
            (Self::Countdown | Self::Capturing { .. }, E::Cancel) => Transition::to(
                Self::Failed(CaptureError::Cancelled),
                vec![S::ReleaseDevices, S::JoinAudioSession, S::PublishStatus(JobStatus::Error)],
            ),
            (state, event) => {
                return Err(CaptureError::InvalidTransition(format!(
                    "{:?} in state {}",
                    event,
                    state.name()
                )))
            }
        };
        Ok(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn media() -> Box<FinalMedia> {
        Box::new(FinalMedia {
            path: PathBuf::from("out.mp4"),
            has_video: true,
            has_audio: true,
            diagnostic: None,
        })
    }

    #[test]
    fn happy_path() {
        let t = CaptureState::Idle.apply(CaptureEvent::Start).unwrap();
        assert_eq!(t.state, CaptureState::Countdown);
        assert_eq!(
            t.effects,
            vec![
                SideEffect::PublishStatus(JobStatus::Recording),
                SideEffect::OpenDevices,
                SideEffect::RunCountdown
            ]
        );

        let t = t.state.apply(CaptureEvent::CountdownElapsed).unwrap();
        assert!(t.state.is_capturing());
        assert_eq!(t.effects, vec![SideEffect::StartAudioSession, SideEffect::RunFrameClock]);

        let t = t.state.apply(CaptureEvent::Progress { elapsed_secs: 4.5 }).unwrap();
        assert_eq!(t.state, CaptureState::Capturing { elapsed_secs: 4.5 });
        assert!(t.effects.is_empty());

        let t = t.state.apply(CaptureEvent::CaptureElapsed).unwrap();
        assert_eq!(t.state, CaptureState::Finalizing);
        assert_eq!(t.effects.last(), Some(&SideEffect::Reconcile));
        // The audio join must precede reconciliation.
        let join = t.effects.iter().position(|e| *e == SideEffect::JoinAudioSession).unwrap();
        let reconcile = t.effects.iter().position(|e| *e == SideEffect::Reconcile).unwrap();
        assert!(join < reconcile);

        let t = t.state.apply(CaptureEvent::Finalized(media())).unwrap();
        assert!(t.state.is_terminal());
        assert_eq!(t.effects.last(), Some(&SideEffect::PublishStatus(JobStatus::Completed)));
    }

    #[test]
    fn failure_releases_devices() {
        for state in [CaptureState::Countdown, CaptureState::Capturing { elapsed_secs: 1.0 }, CaptureState::Finalizing] {
            let t = state
                .apply(CaptureEvent::Fail(CaptureError::DeviceUnavailable("cam".into())))
                .unwrap();
            assert!(matches!(t.state, CaptureState::Failed(CaptureError::DeviceUnavailable(_))));
            assert_eq!(t.effects[0], SideEffect::ReleaseDevices);
            assert_eq!(t.effects.last(), Some(&SideEffect::PublishStatus(JobStatus::Error)));
        }
    }

    #[test]
    fn cancel_maps_to_cancelled_failure() {
        let t = CaptureState::Capturing { elapsed_secs: 2.0 }.apply(CaptureEvent::Cancel).unwrap();
        assert_eq!(t.state, CaptureState::Failed(CaptureError::Cancelled));
        assert!(t.effects.contains(&SideEffect::ReleaseDevices));
    }

    #[test]
    fn rejects_out_of_order_events() {
        assert!(CaptureState::Idle.apply(CaptureEvent::CaptureElapsed).is_err());
        assert!(CaptureState::Finalizing.apply(CaptureEvent::Cancel).is_err());
        assert!(CaptureState::Completed(media()).apply(CaptureEvent::Start).is_err());
        assert!(CaptureState::Failed(CaptureError::Cancelled)
            .apply(CaptureEvent::Fail(CaptureError::Cancelled))
            .is_err());
    }
}
