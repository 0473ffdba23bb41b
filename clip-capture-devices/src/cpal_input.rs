//! Microphone capture through cpal.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use parking_lot::Mutex;

use clip_capture_core::models::device::{DeviceCapabilities, DeviceDirection, DeviceHandle};
use clip_capture_core::models::error::CaptureError;
use clip_capture_core::processing::sample_buffer::SampleBuffer;
use clip_capture_core::session::cancel::CancelToken;
use clip_capture_core::traits::audio_input::{AudioInput, AudioProfile, RecordedAudio};
use clip_capture_core::traits::device_catalog::DeviceCatalog;

use crate::error::BackendError;

/// Rates advertised in device capabilities when the device supports them.
const PROBED_RATES: [u32; 2] = [44_100, 48_000];
const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// Slack after the clip length before a silent stream counts as stalled.
const STALL_SLACK: Duration = Duration::from_secs(2);

/// Lists input devices of the default cpal host.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalCatalog;

impl DeviceCatalog for CpalCatalog {
    fn list(&self, direction: DeviceDirection) -> Result<Vec<DeviceHandle>, CaptureError> {
        if direction != DeviceDirection::Audio {
            return Ok(Vec::new());
        }
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| CaptureError::from(BackendError::Enumeration(e.to_string())))?;

        let mut handles = Vec::new();
        for (index, device) in devices.enumerate() {
            let Ok(name) = device.name() else {
                continue;
            };
            handles.push(DeviceHandle::new(index, name, DeviceDirection::Audio, capabilities(&device)));
        }
        Ok(handles)
    }
}

fn capabilities(device: &cpal::Device) -> DeviceCapabilities {
    let Ok(configs) = device.supported_input_configs() else {
        return DeviceCapabilities::audio(0, Vec::new());
    };
    let mut channels = 0;
    let mut rates = Vec::new();
    for range in configs {
        channels = channels.max(range.channels());
        for rate in PROBED_RATES {
            if range.min_sample_rate().0 <= rate && rate <= range.max_sample_rate().0 && !rates.contains(&rate) {
                rates.push(rate);
            }
        }
    }
    rates.sort_unstable();
    DeviceCapabilities::audio(channels, rates)
}

/// Records from a cpal input stream into a fixed-size buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalAudioInput;

impl AudioInput for CpalAudioInput {
    fn record(
        &self,
        device: Option<&DeviceHandle>,
        profile: &AudioProfile,
        duration: Duration,
        cancel: &CancelToken,
    ) -> Result<RecordedAudio, CaptureError> {
        capture(device, profile, duration, cancel).map_err(|e| match e {
            Capture::Cancelled => CaptureError::Cancelled,
            Capture::Backend(err) => err.into_audio_error(),
        })
    }
}

enum Capture {
    Cancelled,
    Backend(BackendError),
}

impl From<BackendError> for Capture {
    fn from(err: BackendError) -> Self {
        Self::Backend(err)
    }
}

fn capture(
    handle: Option<&DeviceHandle>,
    profile: &AudioProfile,
    duration: Duration,
    cancel: &CancelToken,
) -> Result<RecordedAudio, Capture> {
    let device = find_device(handle)?;
    let (config, format) = negotiate(&device, profile)?;
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;

    let buffer = Arc::new(Mutex::new(SampleBuffer::for_duration(duration, sample_rate, channels)));
    let stream_error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let on_error = {
        let stream_error = Arc::clone(&stream_error);
        move |err: cpal::StreamError| {
            log::error!("Audio input stream error: {}", err);
            *stream_error.lock() = Some(err.to_string());
        }
    };

    let stream = match format {
        SampleFormat::F32 => {
            let buffer = Arc::clone(&buffer);
            device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    buffer.lock().push(data);
                },
                on_error,
                None,
            )
        }
        SampleFormat::I16 => {
            let buffer = Arc::clone(&buffer);
            device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    buffer.lock().push_i16(data);
                },
                on_error,
                None,
            )
        }
        other => return Err(BackendError::UnsupportedFormat(format!("{:?}", other)).into()),
    }
    .map_err(|e| BackendError::Open(e.to_string()))?;

    stream.play().map_err(|e| BackendError::Open(e.to_string()))?;
    log::info!("Microphone stream running at {} Hz, {} ch", sample_rate, channels);

    let started = Instant::now();
    loop {
        if cancel.is_cancelled() {
            return Err(Capture::Cancelled);
        }
        if buffer.lock().is_full() {
            break;
        }
        if let Some(err) = stream_error.lock().take() {
            return Err(BackendError::Stream(err).into());
        }
        if started.elapsed() > duration + STALL_SLACK {
            let filled = buffer.lock().len();
            return Err(BackendError::Stream(format!("stream stalled after {} samples", filled)).into());
        }
        thread::sleep(POLL_INTERVAL);
    }
    drop(stream);

    let samples = buffer.lock().take();
    Ok(RecordedAudio {
        samples,
        sample_rate,
        channels,
    })
}

fn find_device(handle: Option<&DeviceHandle>) -> Result<cpal::Device, BackendError> {
    let host = cpal::default_host();
    match handle {
        Some(handle) => host
            .input_devices()
            .map_err(|e| BackendError::Enumeration(e.to_string()))?
            .find(|d| d.name().map(|n| n == handle.name).unwrap_or(false))
            .ok_or_else(|| BackendError::DeviceNotFound(handle.name.clone())),
        None => host
            .default_input_device()
            .ok_or_else(|| BackendError::DeviceNotFound("default input".into())),
    }
}

/// Stream config matching `profile` if the device supports it, else the
/// device default.
fn negotiate(device: &cpal::Device, profile: &AudioProfile) -> Result<(StreamConfig, SampleFormat), BackendError> {
    let wanted = cpal::SampleRate(profile.sample_rate);
    if let Ok(configs) = device.supported_input_configs() {
        let matching = configs
            .filter(|r| r.channels() == profile.channels)
            .filter(|r| matches!(r.sample_format(), SampleFormat::F32 | SampleFormat::I16))
            .find(|r| r.min_sample_rate() <= wanted && wanted <= r.max_sample_rate());
        if let Some(range) = matching {
            let supported = range.with_sample_rate(wanted);
            return Ok((supported.config(), supported.sample_format()));
        }
    }

    let fallback = device
        .default_input_config()
        .map_err(|e| BackendError::Open(e.to_string()))?;
    log::warn!(
        "{} Hz / {} ch not offered, using device default {} Hz / {} ch",
        profile.sample_rate,
        profile.channels,
        fallback.sample_rate().0,
        fallback.channels()
    );
    Ok((fallback.config(), fallback.sample_format()))
}
