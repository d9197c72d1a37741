//! Rotary stage sweeps.
//!
//! Degrees per line come from the camera's pixel and slit sizes, both
//! reported as camera parameters in radians.

use crate::profiles::{report, MotionProfile};
use crate::recording::{geometry, RecordingOrchestrator, RecordingOutcome, RecordingRequest};
use crate::worker::CancelToken;

/// Camera parameter holding the spatial pixel size in radians.
pub const PIXEL_SIZE_X: &str = "pixelsize_x";
/// Camera parameter holding the slit size in radians.
pub const PIXEL_SIZE_Y: &str = "pixelsize_y";

/// Rotary sweep of `length` degrees from wherever the stage currently is.
#[derive(Debug, Clone, PartialEq)]
pub struct Rotation {
    length: f64,
}

impl Rotation {
    /// Sweep `length` degrees.
    pub fn new(length: f64) -> Self {
        Self { length }
    }

    /// Change the sweep length.
    pub fn set_length(&mut self, length: f64) {
        self.length = length;
    }

    /// Sweep length in degrees.
    pub fn length(&self) -> f64 {
        self.length
    }
}

impl MotionProfile for Rotation {
    fn name(&self) -> &'static str {
        "rotation"
    }

    fn requires_stage(&self) -> bool {
        true
    }

    fn units_per_image_line(&self, orchestrator: &RecordingOrchestrator) -> Option<f64> {
        let camera = orchestrator.camera();
        let log = orchestrator.log();

        let Some(pixel_x) = camera.parameter_f64(PIXEL_SIZE_X) else {
            log.error(&format!("Unable to get {PIXEL_SIZE_X}"));
            return None;
        };
        let Some(pixel_y) = camera.parameter_f64(PIXEL_SIZE_Y) else {
            log.error(&format!("Unable to get {PIXEL_SIZE_Y}"));
            return None;
        };

        let units = geometry::rotation_units_per_line(pixel_x, pixel_y);
        if units.is_none() {
            log.error(&format!(
                "Pixel size {pixel_x} x {pixel_y} does not give a usable angular resolution"
            ));
        }
        units
    }

    fn execute(
        &self,
        orchestrator: &RecordingOrchestrator,
        cancel: &CancelToken,
    ) -> Vec<RecordingOutcome> {
        let log = orchestrator.log();
        let Some(stage) = orchestrator.stage() else {
            log.error("Rotation scan needs a stage");
            return Vec::new();
        };

        let start_position = match stage.position() {
            Ok(position) => position,
            Err(e) => {
                log.error(&format!("Unable to read position of stage {}: {e:#}", stage.id()));
                return Vec::new();
            }
        };

        let units_per_line = self.units_per_image_line(orchestrator);
        let file_name = orchestrator.default_file_name();
        let request =
            RecordingRequest::sweep(file_name.to_string(), start_position, self.length, units_per_line);

        let outcome = orchestrator.record(&request, cancel);
        report(orchestrator, &outcome);
        vec![outcome]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{CallJournal, HardwareCall, MockCamera, MockRecorder, MockStage};
    use crate::hardware::StageKind;
    use crate::log_capture::CapturingLog;
    use std::sync::Arc;

    #[test]
    fn units_per_line_from_pixel_size() {
        let camera = MockCamera::new()
            .with_parameter(PIXEL_SIZE_X, "0.001")
            .with_parameter(PIXEL_SIZE_Y, "0.002");
        let orchestrator = RecordingOrchestrator::builder(Arc::new(camera), MockRecorder::new())
            .build()
            .unwrap();

        let units = Rotation::new(90.0).units_per_image_line(&orchestrator).unwrap();
        assert!((units - 0.001_f64.to_degrees()).abs() < 1e-12);
    }

    #[test]
    fn missing_pixel_size_logs_error() {
        let log = CapturingLog::default();
        let camera = MockCamera::new().without_parameter(PIXEL_SIZE_Y);
        let orchestrator = RecordingOrchestrator::builder(Arc::new(camera), MockRecorder::new())
            .log(Arc::new(log.clone()))
            .build()
            .unwrap();

        assert_eq!(Rotation::new(90.0).units_per_image_line(&orchestrator), None);
        assert_eq!(log.buffer().count_containing("Unable to get pixelsize_y"), 1);
    }

    #[test]
    fn sweeps_from_current_position() {
        let journal = CallJournal::new();
        let stage = MockStage::new("r", StageKind::Rotation)
            .with_position(30.0)
            .with_journal(journal.clone());
        let camera = MockCamera::new()
            .with_parameter(PIXEL_SIZE_X, "0.001")
            .with_parameter(PIXEL_SIZE_Y, "0.001");
        let orchestrator = RecordingOrchestrator::builder(Arc::new(camera), MockRecorder::new())
            .stage(Arc::new(stage))
            .build()
            .unwrap();

        let outcomes = Rotation::new(10.0).execute(&orchestrator, &CancelToken::active());
        assert!(outcomes[0].success());

        let targets: Vec<f64> = journal
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                HardwareCall::StageMoveAbsolute { position, .. } => Some(position),
                _ => None,
            })
            .collect();
        assert_eq!(targets, vec![40.0, 30.0]);
    }
}
