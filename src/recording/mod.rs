//! Recording orchestration
//!
//! - [`orchestrator`]: the record state machine
//! - [`geometry`]: frame counts, scan speeds and per-line resolution
//! - [`file_name`]: destination naming

pub mod file_name;
pub mod geometry;
pub mod orchestrator;

pub use file_name::RecordingFileName;
pub use orchestrator::{
    FileNaming, PollTiming, RecordingOrchestrator, RecordingOrchestratorBuilder, RecordingOutcome,
    RecordingRequest,
};
