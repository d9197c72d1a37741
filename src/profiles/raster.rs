//! Raster scans: rotation sweeps stepped along a cross rotation axis.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::hardware::Stage;
use crate::profiles::{report, MotionProfile, Rotation};
use crate::recording::{geometry, RecordingOrchestrator, RecordingOutcome, RecordingRequest};
use crate::worker::CancelToken;

/// Distance the cross axis moves between raster lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RasterStep {
    /// Fixed step in degrees
    Degrees(f64),
    /// Step as a percentage of the camera's field of view
    OverlapPercent(f64),
}

impl Default for RasterStep {
    fn default() -> Self {
        Self::Degrees(0.0)
    }
}

/// Several rotation sweeps, stepping a second rotation axis between them.
///
/// Each line records to `{line}_of_{total}_{stem}` with the stem generated
/// once per raster, so all lines share a timestamp. Cancellation is checked
/// before every line; the cross axis always returns to where it started.
pub struct Raster {
    rotation: Rotation,
    cross_axis: Arc<dyn Stage>,
    scan_lines: u32,
    step: RasterStep,
}

impl Raster {
    /// Raster `rotation` sweeps along `cross_axis`. One line, no step.
    pub fn new(rotation: Rotation, cross_axis: Arc<dyn Stage>) -> Self {
        Self {
            rotation,
            cross_axis,
            scan_lines: 1,
            step: RasterStep::default(),
        }
    }

    /// Change the sweep length of every line.
    pub fn set_length(&mut self, length: f64) {
        self.rotation.set_length(length);
    }

    /// Number of lines to record.
    pub fn set_scan_lines(&mut self, scan_lines: u32) {
        self.scan_lines = scan_lines;
    }

    /// Step the cross axis by `degrees` between lines.
    pub fn set_line_step(&mut self, degrees: f64) {
        self.step = RasterStep::Degrees(degrees);
    }

    /// Step the cross axis by `percent` of the field of view between lines.
    pub fn set_percent_overlap(&mut self, percent: f64) {
        self.step = RasterStep::OverlapPercent(percent);
    }

    /// Configured line count.
    pub fn scan_lines(&self) -> u32 {
        self.scan_lines
    }

    /// Configured step.
    pub fn step(&self) -> RasterStep {
        self.step
    }

    /// Cross-axis step in degrees for the orchestrator's camera.
    pub fn step_degrees(&self, orchestrator: &RecordingOrchestrator) -> Result<f64> {
        match self.step {
            RasterStep::Degrees(degrees) => Ok(degrees),
            RasterStep::OverlapPercent(percent) => {
                let field_of_view = orchestrator
                    .camera()
                    .lens_field_of_view()
                    .context("lens field of view")?;
                Ok(geometry::overlap_step_degrees(field_of_view, percent))
            }
        }
    }

    fn step_cross_axis(&self, orchestrator: &RecordingOrchestrator, degrees: f64) -> Result<()> {
        let stage = self.cross_axis.as_ref();
        let speed = stage.recommended_speed().context("recommended speed")?;
        stage.set_speed(speed).context("cross-axis speed")?;
        stage.move_relative(degrees).context("cross-axis step")?;
        orchestrator.wait_for_movement_complete(stage);
        Ok(())
    }

    fn return_cross_axis(&self, orchestrator: &RecordingOrchestrator, start: f64) -> Result<()> {
        let stage = self.cross_axis.as_ref();
        let speed = stage.recommended_speed().context("recommended speed")?;
        stage.set_speed(speed).context("cross-axis speed")?;
        stage.move_absolute(start).context("cross-axis return")?;
        orchestrator.wait_for_movement_complete(stage);
        Ok(())
    }
}

impl MotionProfile for Raster {
    fn name(&self) -> &'static str {
        "raster"
    }

    fn requires_stage(&self) -> bool {
        true
    }

    fn units_per_image_line(&self, orchestrator: &RecordingOrchestrator) -> Option<f64> {
        self.rotation.units_per_image_line(orchestrator)
    }

    fn execute(
        &self,
        orchestrator: &RecordingOrchestrator,
        cancel: &CancelToken,
    ) -> Vec<RecordingOutcome> {
        let log = orchestrator.log();
        let Some(primary) = orchestrator.stage() else {
            log.error("Raster scan needs a primary stage");
            return Vec::new();
        };

        let starts = primary
            .position()
            .with_context(|| format!("position of stage {}", primary.id()))
            .and_then(|x| {
                let y = self
                    .cross_axis
                    .position()
                    .with_context(|| format!("position of stage {}", self.cross_axis.id()))?;
                Ok((x, y))
            });
        let (start_x, start_y) = match starts {
            Ok(starts) => starts,
            Err(e) => {
                log.error(&format!("Unable to read raster start: {e:#}"));
                return Vec::new();
            }
        };

        let step = match self.step_degrees(orchestrator) {
            Ok(step) => step,
            Err(e) => {
                log.error(&format!("Unable to derive raster step: {e:#}"));
                return Vec::new();
            }
        };

        let units_per_line = self.units_per_image_line(orchestrator);
        let base_name = orchestrator.default_file_name();
        let total = self.scan_lines;
        let mut outcomes = Vec::with_capacity(total as usize);

        for line in 0..total {
            if cancel.is_cancelled() {
                log.info(&format!("Raster cancelled after {line} of {total} lines"));
                break;
            }

            let file_name = base_name.with_line_prefix(line, total);
            log.info(&format!("Recording line {} of {total}: {file_name}", line + 1));
            let request = RecordingRequest::sweep(
                file_name.to_string(),
                start_x,
                self.rotation.length(),
                units_per_line,
            );
            let outcome = orchestrator.record(&request, cancel);
            report(orchestrator, &outcome);
            outcomes.push(outcome);

            if line + 1 < total && !cancel.is_cancelled() {
                if let Err(e) = self.step_cross_axis(orchestrator, step) {
                    log.error(&format!("Unable to step cross axis: {e:#}"));
                    break;
                }
            }
        }

        if let Err(e) = self.return_cross_axis(orchestrator, start_y) {
            log.error(&format!("Unable to return cross axis: {e:#}"));
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockCamera, MockRecorder, MockStage};
    use crate::hardware::StageKind;

    #[test]
    fn defaults_to_single_line_without_step() {
        let cross: Arc<dyn Stage> = Arc::new(MockStage::new("y", StageKind::CrossRotation));
        let raster = Raster::new(Rotation::new(45.0), cross);
        assert_eq!(raster.scan_lines(), 1);
        assert_eq!(raster.step(), RasterStep::Degrees(0.0));
    }

    #[test]
    fn overlap_step_uses_field_of_view() {
        let camera = MockCamera::new().with_lens(Some(20.0_f64.to_radians()), Some(30.0));
        let orchestrator = RecordingOrchestrator::builder(Arc::new(camera), MockRecorder::new())
            .build()
            .unwrap();
        let cross: Arc<dyn Stage> = Arc::new(MockStage::new("y", StageKind::CrossRotation));

        let mut raster = Raster::new(Rotation::new(45.0), cross);
        raster.set_percent_overlap(50.0);
        let step = raster.step_degrees(&orchestrator).unwrap();
        assert!((step - 10.0).abs() < 1e-9);

        raster.set_line_step(2.5);
        assert_eq!(raster.step_degrees(&orchestrator).unwrap(), 2.5);
    }

    #[test]
    fn overlap_step_needs_lens() {
        let camera = MockCamera::new().with_lens(None, None);
        let orchestrator = RecordingOrchestrator::builder(Arc::new(camera), MockRecorder::new())
            .build()
            .unwrap();
        let cross: Arc<dyn Stage> = Arc::new(MockStage::new("y", StageKind::CrossRotation));

        let mut raster = Raster::new(Rotation::new(45.0), cross);
        raster.set_percent_overlap(50.0);
        assert!(raster.step_degrees(&orchestrator).is_err());
    }
}
