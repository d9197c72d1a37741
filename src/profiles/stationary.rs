//! Stationary recording: no stage, a fixed number of frames.

use crate::profiles::{report, MotionProfile};
use crate::recording::{RecordingOrchestrator, RecordingOutcome};
use crate::worker::CancelToken;

/// Records a fixed number of frames with the camera standing still.
///
/// A frame count of 0 records until the worker is stopped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stationary {
    frames: u32,
}

impl Stationary {
    /// Record `frames` frames (0 = until stopped).
    pub fn new(frames: u32) -> Self {
        Self { frames }
    }

    /// Change the frame count for the next run.
    pub fn set_frame_count(&mut self, frames: u32) {
        self.frames = frames;
    }

    /// Configured frame count.
    pub fn frame_count(&self) -> u32 {
        self.frames
    }
}

impl MotionProfile for Stationary {
    fn name(&self) -> &'static str {
        "stationary"
    }

    fn requires_stage(&self) -> bool {
        false
    }

    fn units_per_image_line(&self, _orchestrator: &RecordingOrchestrator) -> Option<f64> {
        None
    }

    fn execute(
        &self,
        orchestrator: &RecordingOrchestrator,
        cancel: &CancelToken,
    ) -> Vec<RecordingOutcome> {
        let file_name = orchestrator.default_file_name();
        orchestrator
            .log()
            .info(&format!("Recording {} frames to {file_name}", self.frames));

        let outcome = orchestrator.record_frames(&file_name, self.frames, cancel);
        report(orchestrator, &outcome);
        vec![outcome]
    }
}
