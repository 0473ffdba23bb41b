pub mod audio_session;
pub mod cancel;
pub mod capture_loop;
pub mod executor;
pub mod recorder;
pub mod resolver;
