//! dbwatch-core: database runtime-state monitoring engine.
//!
//! Provides:
//! - `config`: connection and monitor settings, dialect selection
//! - `collector`: connector, per-dialect probe sets, scripted mock driver
//! - `analysis`: threshold rules turning probe results into findings
//! - `notify`: notifier interface plus log / fan-out implementations
//! - `monitor`: scheduler loop (one-shot and watch modes)
//! - `report`: console rendering of a check
//! - `fmt`: shared formatting helpers

pub mod analysis;
pub mod collector;
pub mod config;
pub mod error;
pub mod fmt;
pub mod model;
pub mod monitor;
pub mod notify;
pub mod report;

pub use error::MonitorError;

/// Crate version, reported in the startup banner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
