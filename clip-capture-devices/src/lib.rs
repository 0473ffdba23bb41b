//! # clip-capture-devices
//!
//! Device backends for clip-capture-core.
//!
//! Provides:
//! - `AvFoundationCatalog`: camera and microphone listing via `ffmpeg -f avfoundation`
//! - `CpalAudioInput` / `CpalCatalog`: microphone capture via cpal (feature `microphone`)
//! - `NokhwaCameraProvider` / `NokhwaCatalog`: camera capture via nokhwa (feature `camera`)
//! - `native_backends`: all of the above wired into `CaptureBackends` (feature `native`)
//!
//! ## Usage
//! ```ignore
//! use clip_capture_core::{CaptureConfiguration, CaptureRequest, Recorder};
//! use clip_capture_devices::native_backends;
//!
//! let config = CaptureConfiguration::default();
//! let recorder = Recorder::new(config.clone(), native_backends(&config))?;
//! let job = recorder.start(CaptureRequest::default())?;
//! recorder.wait(&job)?;
//! ```

pub mod avfoundation;
pub mod error;

#[cfg(feature = "microphone")]
pub mod cpal_input;
#[cfg(feature = "camera")]
pub mod nokhwa_camera;
#[cfg(all(feature = "microphone", feature = "camera"))]
pub mod native;

pub use avfoundation::{parse_device_listing, AvFoundationCatalog};
pub use error::BackendError;

#[cfg(feature = "microphone")]
pub use cpal_input::{CpalAudioInput, CpalCatalog};
#[cfg(feature = "camera")]
pub use nokhwa_camera::{NokhwaCameraProvider, NokhwaCatalog};
#[cfg(all(feature = "microphone", feature = "camera"))]
pub use native::{native_backends, NativeCatalog};
