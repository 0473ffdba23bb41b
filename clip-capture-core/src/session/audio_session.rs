use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::models::artifacts::AudioArtifact;
use crate::models::config::AudioSettings;
use crate::models::device::DeviceHandle;
use crate::models::error::CaptureError;
use crate::processing::gain::{apply_gain_correction, GainPolicy};
use crate::processing::wav_format::{downmix_to_mono, WavSpec};
use crate::session::cancel::CancelToken;
use crate::storage::wav_writer::WavFileWriter;
use crate::traits::audio_input::{AudioInput, AudioProfile, RecordedAudio};

/// Fixed-length microphone capture persisted as a WAV intermediate.
///
/// A failed attempt on the preferred device is retried once on the system
/// default at the generic profile. Each attempt has its own deadline of
/// `duration + grace`. Every failure ends in `None`: a missing audio track
/// never fails the job.
pub struct AudioSession {
    input: Arc<dyn AudioInput>,
    settings: AudioSettings,
}

impl AudioSession {
    pub fn new(input: Arc<dyn AudioInput>, settings: AudioSettings) -> Self {
        Self { input, settings }
    }

    /// 48 kHz when the device allows it, else the fallback rate; never more
    /// channels than the device has.
    pub fn preferred_profile(&self, device: Option<&DeviceHandle>) -> AudioProfile {
        let (sample_rate, channels) = match device {
            Some(device) => {
                let caps = &device.capabilities;
                let rate = if caps.supports_sample_rate(self.settings.sample_rate) {
                    self.settings.sample_rate
                } else {
                    self.settings.fallback_sample_rate
                };
                let channels = self.settings.channels.min(caps.input_channels).max(1);
                (rate, channels)
            }
            None => (self.settings.sample_rate, self.settings.channels),
        };
        AudioProfile {
            sample_rate,
            channels,
            bit_depth: self.settings.bit_depth,
        }
    }

    pub fn generic_profile(&self) -> AudioProfile {
        AudioProfile {
            sample_rate: self.settings.fallback_sample_rate,
            channels: 1,
            bit_depth: self.settings.fallback_bit_depth,
        }
    }

    pub fn record(
        &self,
        duration: Duration,
        device: Option<&DeviceHandle>,
        path: &Path,
        cancel: &CancelToken,
    ) -> Option<AudioArtifact> {
        let profile = self.preferred_profile(device);
        let grace = Duration::from_secs_f64(self.settings.open_grace_secs);
        let first = self
            .attempt(device.cloned(), profile, duration, grace, cancel)
            .and_then(|recorded| self.persist(recorded, profile.bit_depth, path));

        let error = match first {
            Ok(artifact) => return Some(artifact),
            Err(CaptureError::Cancelled) => return None,
            Err(e) => e,
        };
        if cancel.is_cancelled() {
            return None;
        }

        let retry = self.generic_profile();
        log::warn!(
            "Audio capture failed ({}), retrying on the default device at {} Hz mono",
            error,
            retry.sample_rate
        );
        let grace = Duration::from_secs_f64(self.settings.retry_grace_secs);
        match self
            .attempt(None, retry, duration, grace, cancel)
            .and_then(|recorded| self.persist(recorded, retry.bit_depth, path))
        {
            Ok(artifact) => Some(artifact),
            Err(CaptureError::Cancelled) => None,
            Err(e) => {
                log::error!("Audio capture abandoned: {}", e);
                None
            }
        }
    }

    /// One bounded recording attempt on its own thread.
    fn attempt(
        &self,
        device: Option<DeviceHandle>,
        profile: AudioProfile,
        duration: Duration,
        grace: Duration,
        cancel: &CancelToken,
    ) -> Result<RecordedAudio, CaptureError> {
        let input = Arc::clone(&self.input);
        let token = cancel.child();
        let worker_token = token.clone();
        let (tx, rx) = mpsc::channel();

        log::info!(
            "Recording {:.1}s of audio from {} at {} Hz, {} ch",
            duration.as_secs_f64(),
            device.as_ref().map(|d| d.to_string()).unwrap_or_else(|| "default device".into()),
            profile.sample_rate,
            profile.channels
        );

        let worker = thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let result = input.record(device.as_ref(), &profile, duration, &worker_token);
                let _ = tx.send(result);
            })
            .map_err(|e| CaptureError::AudioDeviceTransient(format!("failed to spawn audio thread: {}", e)))?;

        let outcome = match rx.recv_timeout(duration + grace) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                token.cancel();
                Err(CaptureError::Timeout(format!(
                    "audio capture exceeded {:.1}s",
                    (duration + grace).as_secs_f64()
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(CaptureError::AudioDeviceTransient("audio capture thread exited without a result".into()))
            }
        };

        // The device belongs to the worker until it returns.
        if worker.join().is_err() {
            log::error!("Audio capture thread panicked");
        }
        outcome
    }

    fn persist(&self, recorded: RecordedAudio, bit_depth: u16, path: &Path) -> Result<AudioArtifact, CaptureError> {
        if recorded.samples.is_empty() {
            return Err(CaptureError::AudioDeviceTransient("device delivered no samples".into()));
        }

        let (mut samples, channels) = if recorded.channels > 2 {
            (downmix_to_mono(&recorded.samples, recorded.channels as usize), 1)
        } else {
            (recorded.samples, recorded.channels.max(1))
        };

        let report = apply_gain_correction(&mut samples, &GainPolicy::from_settings(&self.settings));
        if report.gain != 1.0 {
            log::info!(
                "Quiet input (peak {:.4}), applied gain {:.1}x -> peak {:.3}",
                report.peak_before,
                report.gain,
                report.peak_after
            );
        }

        let spec = WavSpec::new(recorded.sample_rate, channels, bit_depth);
        let mut writer = WavFileWriter::new(path.to_path_buf(), spec);
        writer.open()?;
        writer.write_samples(&samples)?;
        let checksum = writer.close()?;

        log::info!("Audio written: {} ({:.2}s)", path.display(), writer.duration_secs());
        Ok(AudioArtifact {
            path: path.to_path_buf(),
            sample_rate: recorded.sample_rate,
            channels,
            bit_depth,
            duration_secs: writer.duration_secs(),
            gain: report.gain,
            checksum,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::device::{DeviceCapabilities, DeviceDirection};
    use crate::processing::wav_format::{WavSpec, WAV_HEADER_SIZE};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Microphone answering each call from a script, recording what was asked.
    #[derive(Default)]
    pub(crate) struct ScriptedInput {
        pub script: Mutex<VecDeque<Result<f32, CaptureError>>>,
        pub calls: Mutex<Vec<(Option<String>, AudioProfile)>>,
        pub block_until_cancelled: bool,
        /// Time a blocked call keeps the device after being cancelled.
        pub release_delay: Option<Duration>,
        pub open_sessions: AtomicUsize,
        pub max_open_sessions: AtomicUsize,
    }

    impl ScriptedInput {
        pub(crate) fn with(script: Vec<Result<f32, CaptureError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            }
        }

        fn respond(
            &self,
            profile: &AudioProfile,
            duration: Duration,
            cancel: &CancelToken,
        ) -> Result<RecordedAudio, CaptureError> {
            if self.block_until_cancelled {
                while !cancel.is_cancelled() {
                    thread::sleep(Duration::from_millis(5));
                }
                if let Some(delay) = self.release_delay {
                    thread::sleep(delay);
                }
                return Err(CaptureError::Cancelled);
            }
            let amplitude = self.script.lock().pop_front().unwrap_or(Ok(0.5))?;
            let len = (duration.as_secs_f64() * profile.sample_rate as f64) as usize * profile.channels as usize;
            Ok(RecordedAudio {
                samples: vec![amplitude; len],
                sample_rate: profile.sample_rate,
                channels: profile.channels,
            })
        }
    }

    impl AudioInput for ScriptedInput {
        fn record(
            &self,
            device: Option<&DeviceHandle>,
            profile: &AudioProfile,
            duration: Duration,
            cancel: &CancelToken,
        ) -> Result<RecordedAudio, CaptureError> {
            self.calls.lock().push((device.map(|d| d.name.clone()), *profile));
            let open = self.open_sessions.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_open_sessions.fetch_max(open, Ordering::SeqCst);
            let result = self.respond(profile, duration, cancel);
            self.open_sessions.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn settings() -> AudioSettings {
        AudioSettings {
            open_grace_secs: 0.2,
            retry_grace_secs: 0.2,
            ..Default::default()
        }
    }

    fn rode() -> DeviceHandle {
        DeviceHandle::new(1, "RODE NT-USB", DeviceDirection::Audio, DeviceCapabilities::audio(2, vec![48000]))
    }

    #[test]
    fn profiles_follow_device_capabilities() {
        let session = AudioSession::new(Arc::new(ScriptedInput::default()), settings());
        assert_eq!(
            session.preferred_profile(Some(&rode())),
            AudioProfile {
                sample_rate: 48000,
                channels: 1,
                bit_depth: 24
            }
        );

        let cd_only = DeviceHandle::new(0, "USB Codec", DeviceDirection::Audio, DeviceCapabilities::audio(1, vec![44100]));
        assert_eq!(session.preferred_profile(Some(&cd_only)).sample_rate, 44100);

        let generic = session.generic_profile();
        assert_eq!((generic.sample_rate, generic.channels, generic.bit_depth), (44100, 1, 16));
    }

    #[test]
    fn records_and_persists_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip_audio.wav");
        let input = Arc::new(ScriptedInput::default());
        let session = AudioSession::new(input.clone(), settings());

        let artifact = session
            .record(Duration::from_millis(500), Some(&rode()), &path, &CancelToken::new())
            .unwrap();

        assert_eq!(artifact.sample_rate, 48000);
        assert_eq!(artifact.bit_depth, 24);
        assert!((artifact.duration_secs - 0.5).abs() < 1e-6);
        assert_eq!(artifact.gain, 1.0);
        assert_eq!(artifact.checksum.len(), 64);

        let bytes = fs::read(&path).unwrap();
        let (spec, data_size) = WavSpec::parse(&bytes).unwrap();
        assert_eq!(spec, WavSpec::new(48000, 1, 24));
        assert_eq!(data_size as usize, bytes.len() - WAV_HEADER_SIZE);
        assert_eq!(input.calls.lock().len(), 1);
    }

    #[test]
    fn quiet_input_is_lifted() {
        let dir = tempfile::tempdir().unwrap();
        let input = Arc::new(ScriptedInput::with(vec![Ok(0.01)]));
        let session = AudioSession::new(input, settings());
        let artifact = session
            .record(Duration::from_millis(100), None, &dir.path().join("a.wav"), &CancelToken::new())
            .unwrap();
        assert!((artifact.gain - 10.0).abs() < 1e-3);
    }

    #[test]
    fn retries_once_on_generic_profile() {
        let dir = tempfile::tempdir().unwrap();
        let input = Arc::new(ScriptedInput::with(vec![
            Err(CaptureError::AudioDeviceTransient("stream error".into())),
            Ok(0.5),
        ]));
        let session = AudioSession::new(input.clone(), settings());

        let artifact = session
            .record(Duration::from_millis(100), Some(&rode()), &dir.path().join("a.wav"), &CancelToken::new())
            .unwrap();
        assert_eq!(artifact.sample_rate, 44100);
        assert_eq!(artifact.bit_depth, 16);

        let calls = input.calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0.as_deref(), Some("RODE NT-USB"));
        assert_eq!(calls[1].0, None);
    }

    #[test]
    fn gives_up_after_retry() {
        let dir = tempfile::tempdir().unwrap();
        let input = Arc::new(ScriptedInput::with(vec![
            Err(CaptureError::AudioDeviceTransient("open failed".into())),
            Err(CaptureError::AudioDeviceTransient("open failed".into())),
        ]));
        let session = AudioSession::new(input.clone(), settings());
        let path = dir.path().join("a.wav");
        assert!(session
            .record(Duration::from_millis(100), None, &path, &CancelToken::new())
            .is_none());
        assert_eq!(input.calls.lock().len(), 2);
        assert!(!path.exists());
    }

    #[test]
    fn stalled_device_times_out_and_is_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let input = Arc::new(ScriptedInput {
            block_until_cancelled: true,
            ..Default::default()
        });
        let session = AudioSession::new(input.clone(), settings());
        assert!(session
            .record(Duration::from_millis(50), None, &dir.path().join("a.wav"), &CancelToken::new())
            .is_none());
        assert_eq!(input.calls.lock().len(), 2);
    }

    #[test]
    fn job_cancellation_skips_the_retry() {
        let dir = tempfile::tempdir().unwrap();
        let input = Arc::new(ScriptedInput::with(vec![Err(CaptureError::Cancelled)]));
        let session = AudioSession::new(input.clone(), settings());
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(session
            .record(Duration::from_millis(50), None, &dir.path().join("a.wav"), &cancel)
            .is_none());
        assert_eq!(input.calls.lock().len(), 1);
    }

    #[test]
    fn timed_out_attempt_releases_device_before_retry() {
        let dir = tempfile::tempdir().unwrap();
        let input = Arc::new(ScriptedInput {
            block_until_cancelled: true,
            release_delay: Some(Duration::from_millis(100)),
            ..Default::default()
        });
        let settings = AudioSettings {
            open_grace_secs: 0.05,
            retry_grace_secs: 0.05,
            ..Default::default()
        };
        let session = AudioSession::new(input.clone(), settings);

        assert!(session
            .record(Duration::from_millis(50), None, &dir.path().join("a.wav"), &CancelToken::new())
            .is_none());
        assert_eq!(input.calls.lock().len(), 2);
        assert_eq!(input.max_open_sessions.load(Ordering::SeqCst), 1);
        assert_eq!(input.open_sessions.load(Ordering::SeqCst), 0);
    }
}
