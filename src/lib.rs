//! # Line-Scan DAQ Core Library
//!
//! Coordinates a push-broom line-scan camera with an optional motorized
//! stage and a frame recorder, so that each recorded image line corresponds
//! to one step of stage travel. The acquisition, motor protocol and file
//! writing live behind capability traits; this crate owns the orchestration.
//!
//! ## Crate Structure
//!
//! - **`worker`**: `Worker<B>` runs a `WorkerBody` on a dedicated OS thread with
//!   cooperative cancellation through a `CancelToken`.
//! - **`recording`**: `RecordingOrchestrator`, the start/poll/teardown state machine
//!   for one recording, plus scan geometry and file naming.
//! - **`profiles`**: the `MotionProfile` strategies (stationary, translation,
//!   rotation, raster) and `ScanJob`, which runs one on a worker.
//! - **`reader`**: `FrameReader`, a live reader that alerts on saturated lines.
//! - **`hardware`**: camera, stage and recorder capability traits and mocks.
//! - **`config`**: Figment-based configuration with validation.
//! - **`error`**: the `ScanError` enum for setup and worker management.
//! - **`log_capture`**: the injected `ScanLog` sink and an in-memory capture buffer.
//! - **`tracing_setup`**: process-wide `tracing-subscriber` initialisation.

pub mod config;
pub mod error;
pub mod hardware;
pub mod log_capture;
pub mod profiles;
pub mod reader;
pub mod recording;
pub mod tracing_setup;
pub mod worker;

pub use error::{ScanError, ScanResult};
pub use profiles::{MotionProfile, ScanJob, ScanProfile, ScanWorker};
pub use recording::{RecordingOrchestrator, RecordingOutcome};
pub use worker::{CancelToken, Worker, WorkerBody};
