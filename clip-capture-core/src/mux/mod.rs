pub mod args;
pub mod reconciler;
pub mod runner;
