use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// Configuration for capture jobs, loadable from TOML.
///
/// Every section has defaults, so an empty file is a valid configuration:
///
/// ```toml
/// output_directory = "recordings"
/// duration_secs = 20.0
///
/// [audio]
/// device_keywords = ["rode", "wireless", "go"]
///
/// [overlays.animated]
/// path = "assets/logo.gif"
/// position = "top-right"
///
/// [overlays.watermark]
/// path = "assets/watermark.png"
/// opacity = 0.3
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfiguration {
    /// Directory where final and intermediate files are written.
    pub output_directory: PathBuf,

    /// Requested clip length in seconds (default: 20).
    pub duration_secs: f64,

    /// Warm-up before capture starts; frames read here are discarded (default: 3).
    pub countdown_secs: f64,

    /// Record the microphone alongside video (default: true).
    pub enable_audio: bool,

    /// Write `<output>.metadata.json` next to the final file (default: true).
    pub write_metadata: bool,

    pub video: VideoSettings,
    pub audio: AudioSettings,
    pub overlays: OverlaySettings,
    pub mux: MuxSettings,
}

/// Camera and video sink parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    /// Target frame rate for the frame clock and the sink.
    pub fps: f64,
    /// Replace `fps` with the rate the camera reports or sustains.
    pub probe_fps: bool,
    /// Ordered, case-insensitive name keywords for camera selection.
    pub device_keywords: Vec<String>,
    pub primary_codec: VideoCodec,
    pub alternate_codec: VideoCodec,
    /// How long to wait for the encoder to flush when the sink closes.
    pub finish_timeout_secs: f64,
}

/// Container and encoder pairings for the video sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VideoCodec {
    Mp4H264,
    AviMpeg4,
}

impl VideoCodec {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4H264 => "mp4",
            Self::AviMpeg4 => "avi",
        }
    }

    /// ffmpeg encoder name.
    pub fn encoder(&self) -> &'static str {
        match self {
            Self::Mp4H264 => "libx264",
            Self::AviMpeg4 => "mpeg4",
        }
    }

    /// Output-side ffmpeg arguments selecting and tuning the encoder.
    pub fn encoder_args(&self) -> &'static [&'static str] {
        match self {
            Self::Mp4H264 => &["-c:v", "libx264", "-preset", "ultrafast", "-crf", "20", "-pix_fmt", "yuv420p"],
            Self::AviMpeg4 => &["-c:v", "mpeg4", "-q:v", "3", "-pix_fmt", "yuv420p"],
        }
    }
}

/// Microphone capture and intermediate WAV parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Preferred sample rate in Hz (default: 48000).
    pub sample_rate: u32,
    /// Bit depth of the intermediate WAV (default: 24). Valid values: 16, 24, 32.
    pub bit_depth: u16,
    /// Channel count requested from the preferred device (default: 1).
    pub channels: u16,
    /// Sample rate of the generic-device retry (default: 44100, always mono).
    pub fallback_sample_rate: u32,
    pub fallback_bit_depth: u16,
    /// Ordered, case-insensitive name keywords for microphone selection.
    pub device_keywords: Vec<String>,
    /// Peak amplitude below which the gain safety net engages (default: 0.1).
    pub gain_floor: f32,
    /// Largest linear gain the safety net may apply (default: 1000).
    pub max_gain: f32,
    /// Extra time beyond the clip duration allowed for the preferred device.
    pub open_grace_secs: f64,
    /// Extra time beyond the clip duration allowed for the generic retry.
    pub retry_grace_secs: f64,
}

/// Where an overlay sits on the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayPosition {
    TopRight,
    TopLeft,
    Center,
    At { x: i64, y: i64 },
}

/// Overlay assets. Either may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    pub animated: Option<AnimatedOverlaySettings>,
    pub watermark: Option<WatermarkSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimatedOverlaySettings {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub position: OverlayPosition,
    /// Seconds for one full pass through the animation.
    pub loop_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkSettings {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub position: OverlayPosition,
    pub opacity: f32,
}

/// External muxer invocation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxSettings {
    /// ffmpeg executable; bare names are looked up on PATH.
    pub program: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    pub audio_codec: String,
    pub audio_bitrate: String,
    /// Band-pass lower edge in Hz.
    pub highpass_hz: u32,
    /// Band-pass upper edge in Hz.
    pub lowpass_hz: u32,
    pub thread_queue_size: u32,
    pub timeout_secs: f64,
    /// Move the index to the front of MP4/MOV outputs.
    pub faststart: bool,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.duration_secs.is_finite() && self.duration_secs > 0.0) {
            return Err(format!("duration must be positive: {}", self.duration_secs));
        }
        if !(self.countdown_secs.is_finite() && self.countdown_secs >= 0.0) {
            return Err(format!("countdown must not be negative: {}", self.countdown_secs));
        }
        self.video.validate()?;
        self.audio.validate()?;
        self.overlays.validate()?;
        self.mux.validate()?;
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs)
    }

    pub fn countdown(&self) -> Duration {
        Duration::from_secs_f64(self.countdown_secs)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, CaptureError> {
        let config: Self = toml::from_str(text)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("invalid TOML: {}", e)))?;
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, CaptureError> {
        toml::to_string_pretty(self)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to serialize config: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self, CaptureError> {
        let text = fs::read_to_string(path)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Load `path`, falling back to defaults when it is missing or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

impl VideoSettings {
    fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!("invalid frame size: {}x{}", self.width, self.height));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(format!("frame size must be even: {}x{}", self.width, self.height));
        }
        if !(self.fps.is_finite() && self.fps > 0.0 && self.fps <= 240.0) {
            return Err(format!("unsupported frame rate: {}", self.fps));
        }
        if !(self.finish_timeout_secs.is_finite() && self.finish_timeout_secs > 0.0) {
            return Err("finish timeout must be positive".into());
        }
        Ok(())
    }

    pub fn finish_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.finish_timeout_secs)
    }
}

impl AudioSettings {
    fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 || self.fallback_sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        for depth in [self.bit_depth, self.fallback_bit_depth] {
            if ![16, 24, 32].contains(&depth) {
                return Err(format!("unsupported bit depth: {}", depth));
            }
        }
        if ![1, 2].contains(&self.channels) {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        if !(self.gain_floor > 0.0 && self.gain_floor <= 1.0) {
            return Err(format!("gain floor must be in (0, 1]: {}", self.gain_floor));
        }
        if self.max_gain < 1.0 {
            return Err(format!("max gain must be at least 1: {}", self.max_gain));
        }
        if self.open_grace_secs < 0.0 || self.retry_grace_secs < 0.0 {
            return Err("audio grace periods must not be negative".into());
        }
        Ok(())
    }
}

impl OverlaySettings {
    fn validate(&self) -> Result<(), String> {
        if let Some(animated) = &self.animated {
            if animated.width == 0 || animated.height == 0 {
                return Err("animated overlay size must be positive".into());
            }
            if !(animated.loop_secs.is_finite() && animated.loop_secs > 0.0) {
                return Err(format!("overlay loop must be positive: {}", animated.loop_secs));
            }
        }
        if let Some(watermark) = &self.watermark {
            if watermark.width == 0 || watermark.height == 0 {
                return Err("watermark size must be positive".into());
            }
            if !(0.0..=1.0).contains(&watermark.opacity) {
                return Err(format!("watermark opacity must be in [0, 1]: {}", watermark.opacity));
            }
        }
        Ok(())
    }
}

impl MuxSettings {
    fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("mux sample rate must be positive".into());
        }
        if ![1, 2].contains(&self.channels) {
            return Err(format!("unsupported mux channel count: {}", self.channels));
        }
        if self.highpass_hz >= self.lowpass_hz {
            return Err(format!(
                "high-pass ({} Hz) must be below low-pass ({} Hz)",
                self.highpass_hz, self.lowpass_hz
            ));
        }
        if self.timeout_secs <= 0.0 {
            return Err("mux timeout must be positive".into());
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("recordings"),
            duration_secs: 20.0,
            countdown_secs: 3.0,
            enable_audio: true,
            write_metadata: true,
            video: VideoSettings::default(),
            audio: AudioSettings::default(),
            overlays: OverlaySettings::default(),
            mux: MuxSettings::default(),
        }
    }
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30.0,
            probe_fps: false,
            device_keywords: Vec::new(),
            primary_codec: VideoCodec::Mp4H264,
            alternate_codec: VideoCodec::AviMpeg4,
            finish_timeout_secs: 30.0,
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            bit_depth: 24,
            channels: 1,
            fallback_sample_rate: 44100,
            fallback_bit_depth: 16,
            device_keywords: vec!["rode".into(), "wireless".into(), "go".into()],
            gain_floor: 0.1,
            max_gain: 1000.0,
            open_grace_secs: 5.0,
            retry_grace_secs: 5.0,
        }
    }
}

impl Default for AnimatedOverlaySettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("overlay.gif"),
            width: 200,
            height: 200,
            position: OverlayPosition::TopRight,
            loop_secs: 20.0,
        }
    }
}

impl Default for WatermarkSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("watermark.png"),
            width: 1280,
            height: 720,
            position: OverlayPosition::Center,
            opacity: 0.3,
        }
    }
}

impl Default for MuxSettings {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            sample_rate: 48000,
            channels: 1,
            audio_codec: "aac".into(),
            audio_bitrate: "192k".into(),
            highpass_hz: 80,
            lowpass_hz: 15000,
            thread_queue_size: 4096,
            timeout_secs: 120.0,
            faststart: true,
        }
    }
}
