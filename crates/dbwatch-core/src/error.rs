//! Error taxonomy shared by all components.

/// Error type for monitoring operations.
///
/// Only `Configuration` and `Connection` are fatal: they terminate a run.
/// Probe and notification failures are absorbed where they occur.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// Invalid configuration (unknown dialect, bad interval). Raised before any I/O.
    Configuration(String),
    /// The database session could not be opened.
    Connection(String),
    /// A single diagnostic query failed.
    Probe(String),
    /// An alert channel failed to deliver.
    Notification(String),
}

impl MonitorError {
    /// Returns true for errors that must end the run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MonitorError::Configuration(_) | MonitorError::Connection(_)
        )
    }
}

impl std::fmt::Display for MonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            MonitorError::Connection(msg) => write!(f, "connection error: {}", msg),
            MonitorError::Probe(msg) => write!(f, "probe error: {}", msg),
            MonitorError::Notification(msg) => write!(f, "notification error: {}", msg),
        }
    }
}

impl std::error::Error for MonitorError {}
