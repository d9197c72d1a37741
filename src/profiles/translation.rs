//! Linear stage sweeps.
//!
//! The sweep speed advances the stage one imaged strip width per delivered
//! line, derived from the lens field of view and working distance.

use crate::profiles::{report, MotionProfile};
use crate::recording::{geometry, RecordingOrchestrator, RecordingOutcome, RecordingRequest};
use crate::worker::CancelToken;

/// Linear sweep of `length` cm starting at `start_position`.
///
/// The stage first travels to the start position at whatever speed it is
/// set to, then sweeps at the speed matching one strip-width step per line.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    start_position: f64,
    length: f64,
}

impl Translation {
    /// Sweep `length` cm from `start_position`.
    pub fn new(start_position: f64, length: f64) -> Self {
        Self {
            start_position,
            length,
        }
    }

    /// Change the sweep length.
    pub fn set_length(&mut self, length: f64) {
        self.length = length;
    }

    /// Change the start position.
    pub fn set_start_position(&mut self, start_position: f64) {
        self.start_position = start_position;
    }

    /// Sweep length in cm.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Start position in cm.
    pub fn start_position(&self) -> f64 {
        self.start_position
    }
}

impl MotionProfile for Translation {
    fn name(&self) -> &'static str {
        "translation"
    }

    fn requires_stage(&self) -> bool {
        true
    }

    fn units_per_image_line(&self, orchestrator: &RecordingOrchestrator) -> Option<f64> {
        let camera = orchestrator.camera();
        let log = orchestrator.log();

        let field_of_view = match camera.lens_field_of_view() {
            Ok(fov) => fov,
            Err(e) => {
                log.error(&format!("Unable to get lens field of view: {e:#}"));
                return None;
            }
        };
        let working_distance = match camera.lens_working_distance() {
            Ok(wd) => wd,
            Err(e) => {
                log.error(&format!("Unable to get lens working distance: {e:#}"));
                return None;
            }
        };

        geometry::translation_units_per_line(field_of_view, working_distance, camera.spatial_size())
    }

    fn execute(
        &self,
        orchestrator: &RecordingOrchestrator,
        cancel: &CancelToken,
    ) -> Vec<RecordingOutcome> {
        let log = orchestrator.log();
        let Some(stage) = orchestrator.stage() else {
            log.error("Translation scan needs a stage");
            return Vec::new();
        };

        if let Err(e) = stage.move_absolute(self.start_position) {
            log.error(&format!(
                "Unable to move stage {} to start position {}: {e:#}",
                stage.id(),
                self.start_position
            ));
            return Vec::new();
        }
        orchestrator.wait_for_movement_complete(stage);

        let units_per_line = self.units_per_image_line(orchestrator);
        let file_name = orchestrator.default_file_name();
        let request = RecordingRequest::sweep(
            file_name.to_string(),
            self.start_position,
            self.length,
            units_per_line,
        );

        let outcome = orchestrator.record(&request, cancel);
        report(orchestrator, &outcome);
        vec![outcome]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockCamera, MockRecorder, MockStage};
    use crate::hardware::{Stage, StageKind};
    use crate::log_capture::CapturingLog;
    use std::f64::consts::PI;
    use std::sync::Arc;

    #[test]
    fn units_per_line_from_lens() {
        let camera = MockCamera::new()
            .with_lens(Some(PI / 2.0), Some(10.0))
            .with_spatial_size(400);
        let orchestrator = RecordingOrchestrator::builder(Arc::new(camera), MockRecorder::new())
            .build()
            .unwrap();

        let units = Translation::new(0.0, 10.0)
            .units_per_image_line(&orchestrator)
            .unwrap();
        assert!((units - 0.05).abs() < 1e-9);
    }

    #[test]
    fn unreadable_lens_logs_and_yields_none() {
        let log = CapturingLog::default();
        let camera = MockCamera::new().with_lens(None, Some(10.0));
        let orchestrator = RecordingOrchestrator::builder(Arc::new(camera), MockRecorder::new())
            .log(Arc::new(log.clone()))
            .build()
            .unwrap();

        assert_eq!(Translation::new(0.0, 10.0).units_per_image_line(&orchestrator), None);
        assert_eq!(log.buffer().count_containing("field of view"), 1);
    }

    #[test]
    fn sweeps_from_start_position_and_returns() {
        let stage = Arc::new(MockStage::new("x", StageKind::Translation).with_position(7.0));
        let camera = MockCamera::new()
            .with_lens(Some(PI / 2.0), Some(10.0))
            .with_spatial_size(400);
        let orchestrator = RecordingOrchestrator::builder(Arc::new(camera), MockRecorder::new())
            .stage(stage.clone())
            .build()
            .unwrap();

        let outcomes = Translation::new(2.0, 4.0).execute(&orchestrator, &CancelToken::active());

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].success());
        assert_eq!(outcomes[0].target_frames, 80);
        assert_eq!(stage.position().unwrap(), 2.0);
    }
}
