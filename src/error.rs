//! Error types for scan setup and worker management.
//!
//! Failures that happen *during* a scan never cross the worker thread
//! boundary; they are folded into a [`RecordingOutcome`](crate::recording::RecordingOutcome)
//! and reported through the scan log. `ScanError` covers everything around
//! that: loading configuration, wiring collaborators together, and spawning
//! or reconfiguring workers.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: wraps `figment` extraction errors (missing keys, bad types).
//! - **`Validation`**: semantic errors caught by [`ScanConfig::validate`](crate::config::ScanConfig::validate).
//! - **`Hardware`**: a collaborator rejected a setup call, e.g. recorder settings.
//! - **`MissingStage`**: a motion profile that drives a stage was built without one.
//! - **`WorkerBusy`**: attempted to reconfigure a worker while its thread is alive.
//! - **`Spawn`**: the OS refused to start a worker thread.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type ScanResult<T> = std::result::Result<T, ScanError>;

/// Errors raised while setting up or managing scans.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Hardware error on {device}: {source}")]
    Hardware {
        device: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Motion profile '{0}' requires a stage but none was provided")]
    MissingStage(&'static str),

    #[error("Worker is running; stop and join it before reconfiguring")]
    WorkerBusy,

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl From<figment::Error> for ScanError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl ScanError {
    /// Wrap a collaborator error with the id of the device that produced it.
    pub fn hardware(device: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Hardware {
            device: device.into(),
            source,
        }
    }
}
