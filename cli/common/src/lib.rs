//! Shared utilities for scriptflow CLI binaries.
//!
//! This crate provides the log level argument, logging setup and output
//! formatting used by `sf-transform`.

pub mod args;
pub mod format;
pub mod logging;

pub use args::LogLevel;
pub use format::{format_bytes, format_duration, format_number};
pub use logging::init_logging;
