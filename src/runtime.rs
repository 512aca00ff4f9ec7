//! Runtime glue: configuration, fatal error capture, progress tracking,
//! telemetry, and the Ctrl-C aware runner.

pub mod config;
pub mod fatal;
pub(crate) mod hooks;
pub mod progress;
pub mod runner;
pub mod telemetry;
