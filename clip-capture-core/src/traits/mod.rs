pub mod audio_input;
pub mod camera;
pub mod capture_delegate;
pub mod clock;
pub mod device_catalog;
pub mod tool_runner;
pub mod video_sink;
