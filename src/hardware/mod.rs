//! Hardware collaborators
//!
//! Capability traits for the camera, stage and recorder, plus simulated
//! implementations used by tests and the `linescan` binary.

pub mod capabilities;
pub mod mock;

pub use capabilities::{
    ImageLine, ImageMode, LineScanCamera, Recorder, RecorderSettings, RecordingStatus, Stage,
    StageKind,
};
