pub mod artifacts;
pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod job;
pub mod state;
