pub mod frame_clock;
pub mod gain;
pub mod overlay;
pub mod overlay_library;
pub mod pcm;
pub mod sample_buffer;
pub mod wav_format;
