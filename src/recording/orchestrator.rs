//! Single-recording state machine.
//!
//! [`RecordingOrchestrator::record`] runs one recording from configuration to
//! teardown:
//!
//! ```text
//!  configure recorder ─▶ set stage speed ─▶ recorder.start ─▶ camera.start_acquisition
//!                                                                   │
//!       ┌──────────────── stage.move_absolute(start + length) ◀─────┘
//!       ▼
//!  poll status every 500 ms ──cancelled──▶ stage.stop
//!       │                                     │
//!       ▼                                     ▼
//!  capture status ─▶ recorder.stop ─▶ stage back to start at recommended speed
//! ```
//!
//! The start order is a hard contract: the recorder must be ready before the
//! camera produces frames, and the camera must be producing before the stage
//! starts moving. Teardown runs on every path, including cancellation and
//! collaborator errors.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Local;

use crate::config::{RecordingConfig, ScanConfig, TimingConfig};
use crate::error::{ScanError, ScanResult};
use crate::hardware::{ImageMode, LineScanCamera, Recorder, RecorderSettings, RecordingStatus, Stage};
use crate::log_capture::{ScanLog, TracingLog};
use crate::recording::file_name::RecordingFileName;
use crate::recording::geometry;
use crate::worker::CancelToken;

/// Camera parameter naming the drive recordings are written to.
pub const RECORD_DRIVE_PARAMETER: &str = "RecordHD";

/// Poll intervals used while recording and repositioning.
#[derive(Debug, Clone, PartialEq)]
pub struct PollTiming {
    /// Recorder status poll interval
    pub status_poll: Duration,
    /// Stage `is_moving` poll interval
    pub movement_poll: Duration,
    /// Optional bound on a movement wait
    pub movement_timeout: Option<Duration>,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self::from(&TimingConfig::default())
    }
}

impl From<&TimingConfig> for PollTiming {
    fn from(config: &TimingConfig) -> Self {
        Self {
            status_poll: config.status_poll(),
            movement_poll: config.movement_poll(),
            movement_timeout: config.movement_timeout(),
        }
    }
}

/// Inputs to file name synthesis that do not come from the camera.
#[derive(Debug, Clone, PartialEq)]
pub struct FileNaming {
    /// User prefix
    pub prefix: String,
    /// File extension
    pub extension: String,
    /// Drive used when the camera does not report one
    pub fallback_drive: String,
}

impl Default for FileNaming {
    fn default() -> Self {
        Self::from(&RecordingConfig::default())
    }
}

impl From<&RecordingConfig> for FileNaming {
    fn from(config: &RecordingConfig) -> Self {
        Self {
            prefix: config.file_prefix.clone(),
            extension: config.extension.clone(),
            fallback_drive: config.fallback_drive.clone(),
        }
    }
}

/// Parameters of one recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingRequest {
    /// Destination file
    pub file_name: String,
    /// Stage position the scan starts from and returns to
    pub start_position: f64,
    /// Distance covered by the scan, in stage units
    pub length: f64,
    /// Stage travel per image line
    pub units_per_line: Option<f64>,
    /// Explicit frame count; derived from the geometry when absent
    pub frames: Option<u32>,
}

impl RecordingRequest {
    /// A stage sweep of `length` units starting at `start_position`.
    pub fn sweep(
        file_name: impl Into<String>,
        start_position: f64,
        length: f64,
        units_per_line: Option<f64>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            start_position,
            length,
            units_per_line,
            frames: None,
        }
    }

    /// A fixed number of frames without stage geometry (0 = until stopped).
    pub fn frames(file_name: impl Into<String>, frames: u32) -> Self {
        Self {
            file_name: file_name.into(),
            start_position: 0.0,
            length: 0.0,
            units_per_line: None,
            frames: Some(frames),
        }
    }
}

/// Result of one recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingOutcome {
    /// Destination the recorder wrote to
    pub file_name: String,
    /// Auto-stop frame count that was configured
    pub target_frames: u32,
    /// Frames the recorder reported after stopping
    pub frames_written: u64,
    /// Recorder status captured before it was stopped
    pub final_status: RecordingStatus,
    /// Whether the recording ended because of cancellation
    pub cancelled: bool,
    /// First collaborator error, if any call failed
    pub fault: Option<String>,
}

impl RecordingOutcome {
    /// Recorder status is non-negative and no collaborator call failed.
    pub fn success(&self) -> bool {
        !self.final_status.is_failure() && self.fault.is_none()
    }
}

/// Drives the camera, an optional stage and a recorder through one recording.
pub struct RecordingOrchestrator {
    camera: Arc<dyn LineScanCamera>,
    stage: Option<Arc<dyn Stage>>,
    recorder: Box<dyn Recorder>,
    settings: RecorderSettings,
    naming: FileNaming,
    timing: PollTiming,
    log: Arc<dyn ScanLog>,
}

impl RecordingOrchestrator {
    /// Start building an orchestrator for `camera` and `recorder`.
    pub fn builder(
        camera: Arc<dyn LineScanCamera>,
        recorder: impl Recorder + 'static,
    ) -> RecordingOrchestratorBuilder {
        RecordingOrchestratorBuilder {
            camera,
            recorder: Box::new(recorder),
            stage: None,
            settings: RecorderSettings::default(),
            naming: FileNaming::default(),
            timing: PollTiming::default(),
            log: Arc::new(TracingLog),
        }
    }

    /// The camera this orchestrator records from.
    pub fn camera(&self) -> &dyn LineScanCamera {
        self.camera.as_ref()
    }

    /// The primary stage, if any.
    pub fn stage(&self) -> Option<&dyn Stage> {
        self.stage.as_deref()
    }

    /// Scan log shared with the profile driving this orchestrator.
    pub fn log(&self) -> &dyn ScanLog {
        self.log.as_ref()
    }

    /// Poll intervals.
    pub fn timing(&self) -> &PollTiming {
        &self.timing
    }

    /// Settings applied to the recorder.
    pub fn settings(&self) -> &RecorderSettings {
        &self.settings
    }

    /// File name for a new recording using the configured prefix and image mode.
    pub fn default_file_name(&self) -> RecordingFileName {
        self.file_name(&self.naming.prefix, self.settings.image_mode)
    }

    /// File name for a new recording, timestamped now.
    ///
    /// The drive comes from the camera's `RecordHD` parameter, falling back
    /// to the configured drive with a warning.
    pub fn file_name(&self, prefix: &str, mode: ImageMode) -> RecordingFileName {
        let drive = match self
            .camera
            .parameter(RECORD_DRIVE_PARAMETER)
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
        {
            Some(drive) => drive,
            None => {
                self.log.warn(&format!(
                    "Unable to get {RECORD_DRIVE_PARAMETER}, using drive {}",
                    self.naming.fallback_drive
                ));
                self.naming.fallback_drive.clone()
            }
        };

        RecordingFileName::synthesize(
            &drive,
            prefix,
            &self.camera.id(),
            self.camera.integration_time_us(),
            Local::now().naive_local(),
            mode,
            &self.naming.extension,
        )
    }

    /// Record a fixed number of frames without moving a stage.
    pub fn record_frames(
        &self,
        file_name: &RecordingFileName,
        frames: u32,
        cancel: &CancelToken,
    ) -> RecordingOutcome {
        self.record(&RecordingRequest::frames(file_name.to_string(), frames), cancel)
    }

    /// Run one recording to completion, cancellation or failure.
    pub fn record(&self, request: &RecordingRequest, cancel: &CancelToken) -> RecordingOutcome {
        let target_frames = request.frames.unwrap_or_else(|| {
            geometry::frame_count(request.length, request.units_per_line).unwrap_or_else(|| {
                self.log.error(
                    "Unable to determine units per image line, recording with a frame count of 0",
                );
                0
            })
        });

        let mut fault = None;
        match self.begin(request, target_frames) {
            Ok(()) => self.poll_until_done(target_frames, cancel),
            Err(e) => {
                self.log.error(&format!("Failed to start recording: {e:#}"));
                fault = Some(format!("{e:#}"));
            }
        }

        let cancelled = cancel.is_cancelled();
        if cancelled {
            if let Some(stage) = &self.stage {
                self.log.info("Recording cancelled, stopping stage");
                if let Err(e) = stage.stop() {
                    self.note_fault(&mut fault, "Failed to stop stage", &e);
                }
            }
        }

        self.log.info(&format!(
            "Recorded: {} out of: {} ( complete )",
            self.recorder.frames_written(),
            target_frames
        ));
        let final_status = self.recorder.status();
        if let Err(e) = self.recorder.stop() {
            self.note_fault(&mut fault, "Failed to stop recorder", &e);
        }
        let frames_written = self.recorder.frames_written();

        if let Some(stage) = &self.stage {
            if let Err(e) = self.return_stage(stage.as_ref(), request.start_position) {
                self.note_fault(&mut fault, "Failed to return stage", &e);
            }
        }

        let outcome = RecordingOutcome {
            file_name: request.file_name.clone(),
            target_frames,
            frames_written,
            final_status,
            cancelled,
            fault,
        };
        if !outcome.success() {
            self.log.error(&format!(
                "Recording {} failed with status {}",
                outcome.file_name, outcome.final_status
            ));
        }
        outcome
    }

    /// Poll `is_moving` until the stage reports it has stopped.
    ///
    /// Waits indefinitely unless a movement timeout is configured. Returns
    /// `false` if the wait ended on a timeout or a failed query.
    pub fn wait_for_movement_complete(&self, stage: &dyn Stage) -> bool {
        let started = Instant::now();
        loop {
            match stage.is_moving() {
                Ok(false) => return true,
                Ok(true) => {}
                Err(e) => {
                    self.log
                        .error(&format!("Unable to query stage {}: {e:#}", stage.id()));
                    return false;
                }
            }
            if let Some(timeout) = self.timing.movement_timeout {
                if started.elapsed() >= timeout {
                    self.log.warn(&format!(
                        "Stage {} still moving after {} ms, giving up",
                        stage.id(),
                        timeout.as_millis()
                    ));
                    return false;
                }
            }
            std::thread::sleep(self.timing.movement_poll);
        }
    }

    fn begin(&self, request: &RecordingRequest, target_frames: u32) -> Result<()> {
        self.recorder
            .set_destination(&request.file_name)
            .context("recorder destination")?;
        self.recorder
            .set_auto_stop_frames(target_frames)
            .context("recorder auto-stop")?;

        if let Some(stage) = &self.stage {
            let speed = geometry::recording_speed(
                request.units_per_line,
                self.camera.frame_period_us(),
                self.camera.averaged_frames(),
            );
            match speed {
                Some(speed) => {
                    self.log
                        .debug(&format!("Recording speed {speed:.6} units/s"));
                    stage.set_speed(speed).context("stage speed")?;
                }
                None => self
                    .log
                    .warn("Unable to compute recording speed, stage speed unchanged"),
            }
        }

        self.recorder.start().context("recorder start")?;
        self.camera
            .start_acquisition()
            .context("camera acquisition")?;

        if let Some(stage) = &self.stage {
            stage
                .move_absolute(request.start_position + request.length)
                .context("stage move")?;
        }
        Ok(())
    }

    fn poll_until_done(&self, target_frames: u32, cancel: &CancelToken) {
        loop {
            let status = self.recorder.status();
            if status == RecordingStatus::Stopped || status.is_failure() || cancel.is_cancelled() {
                return;
            }
            self.log.info(&format!(
                "Recorded: {} out of: {}",
                self.recorder.frames_written(),
                target_frames
            ));
            if cancel.sleep(self.timing.status_poll) {
                return;
            }
        }
    }

    fn return_stage(&self, stage: &dyn Stage, start_position: f64) -> Result<()> {
        self.log.info("Moving stage back to start...");
        let speed = stage.recommended_speed().context("recommended speed")?;
        stage.set_speed(speed).context("return speed")?;
        stage
            .move_absolute(start_position)
            .context("return move")?;
        self.wait_for_movement_complete(stage);
        Ok(())
    }

    fn note_fault(&self, fault: &mut Option<String>, what: &str, error: &anyhow::Error) {
        self.log.error(&format!("{what}: {error:#}"));
        fault.get_or_insert_with(|| format!("{what}: {error:#}"));
    }
}

/// Builder for [`RecordingOrchestrator`].
pub struct RecordingOrchestratorBuilder {
    camera: Arc<dyn LineScanCamera>,
    recorder: Box<dyn Recorder>,
    stage: Option<Arc<dyn Stage>>,
    settings: RecorderSettings,
    naming: FileNaming,
    timing: PollTiming,
    log: Arc<dyn ScanLog>,
}

impl RecordingOrchestratorBuilder {
    /// Drive `stage` during recordings.
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Optionally drive a stage.
    pub fn maybe_stage(mut self, stage: Option<Arc<dyn Stage>>) -> Self {
        self.stage = stage;
        self
    }

    /// Recorder settings applied at build time.
    pub fn settings(mut self, settings: RecorderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// File naming inputs.
    pub fn naming(mut self, naming: FileNaming) -> Self {
        self.naming = naming;
        self
    }

    /// Poll intervals.
    pub fn timing(mut self, timing: PollTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Scan log sink.
    pub fn log(mut self, log: Arc<dyn ScanLog>) -> Self {
        self.log = log;
        self
    }

    /// Take settings, naming and timing from a loaded configuration.
    pub fn config(self, config: &ScanConfig) -> Self {
        let settings = RecorderSettings {
            comment: config.recording.comment.clone(),
            image_mode: config.recording.image_mode,
            write_saturation_matrix: config.recording.write_saturation_matrix,
        };
        self.settings(settings)
            .naming(FileNaming::from(&config.recording))
            .timing(PollTiming::from(&config.timing))
    }

    /// Configure the recorder and build the orchestrator.
    pub fn build(self) -> ScanResult<RecordingOrchestrator> {
        self.recorder
            .configure(&self.settings)
            .map_err(|e| ScanError::hardware("recorder", e))?;

        Ok(RecordingOrchestrator {
            camera: self.camera,
            stage: self.stage,
            recorder: self.recorder,
            settings: self.settings,
            naming: self.naming,
            timing: self.timing,
            log: self.log,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{CallJournal, HardwareCall, MockCamera, MockRecorder, MockStage};
    use crate::hardware::StageKind;
    use crate::log_capture::{CapturingLog, LogLevel};

    fn fast_timing() -> PollTiming {
        PollTiming {
            status_poll: Duration::from_millis(5),
            movement_poll: Duration::from_millis(1),
            movement_timeout: None,
        }
    }

    #[test]
    fn build_configures_recorder() {
        let recorder = Arc::new(MockRecorder::new());
        let _orchestrator =
            RecordingOrchestrator::builder(Arc::new(MockCamera::new()), Arc::clone(&recorder))
                .build()
                .unwrap();

        let settings = recorder.settings().unwrap();
        assert_eq!(settings.comment, "Example recording");
        assert_eq!(settings.image_mode, ImageMode::Responsivity);
        assert!(settings.write_saturation_matrix);
    }

    #[test]
    fn file_name_uses_camera_drive() {
        let camera = MockCamera::new()
            .with_id("SN-7")
            .with_integration_time(2500)
            .with_parameter(RECORD_DRIVE_PARAMETER, "F");
        let orchestrator = RecordingOrchestrator::builder(Arc::new(camera), MockRecorder::new())
            .build()
            .unwrap();

        let name = orchestrator.file_name("lab", ImageMode::Raw).to_string();
        assert!(name.starts_with("F://lab_SN-7_2500us_"), "{name}");
        assert!(name.ends_with("_raw.hyspex"), "{name}");
    }

    #[test]
    fn file_name_falls_back_to_default_drive() {
        let log = CapturingLog::default();
        let camera = MockCamera::new().without_parameter(RECORD_DRIVE_PARAMETER);
        let orchestrator = RecordingOrchestrator::builder(Arc::new(camera), MockRecorder::new())
            .log(Arc::new(log.clone()))
            .build()
            .unwrap();

        let name = orchestrator.default_file_name();
        assert_eq!(name.drive(), "D");
        assert!(name.to_string().ends_with("_corr.hyspex"));
        assert_eq!(log.buffer().messages(LogLevel::Warn).len(), 1);
    }

    #[test]
    fn zero_units_per_line_records_zero_frames() {
        let log = CapturingLog::default();
        let recorder = Arc::new(MockRecorder::new());
        let orchestrator =
            RecordingOrchestrator::builder(Arc::new(MockCamera::new()), Arc::clone(&recorder))
                .timing(fast_timing())
                .log(Arc::new(log.clone()))
                .build()
                .unwrap();

        let request = RecordingRequest::sweep("D://zero.hyspex", 0.0, 40.0, Some(0.0));
        let outcome = orchestrator.record(&request, &CancelToken::active());

        assert_eq!(outcome.target_frames, 0);
        assert_eq!(recorder.auto_stop_frames(), 0);
        assert_eq!(log.buffer().count_containing("frame count of 0"), 1);
    }

    #[test]
    fn sweep_sets_auto_stop_and_speed() {
        let journal = CallJournal::new();
        let recorder = Arc::new(MockRecorder::new().with_journal(journal.clone()));
        let stage: Arc<dyn Stage> =
            Arc::new(MockStage::new("x", StageKind::Translation).with_journal(journal.clone()));
        let camera = MockCamera::new().with_timing(15_000, 1);
        let orchestrator = RecordingOrchestrator::builder(Arc::new(camera), Arc::clone(&recorder))
            .stage(stage)
            .timing(fast_timing())
            .build()
            .unwrap();

        let request = RecordingRequest::sweep("D://sweep.hyspex", 2.0, 40.0, Some(0.5));
        let outcome = orchestrator.record(&request, &CancelToken::active());

        assert!(outcome.success());
        assert_eq!(outcome.target_frames, 80);
        assert_eq!(outcome.frames_written, 80);
        assert_eq!(journal.count(|c| *c == HardwareCall::RecorderAutoStop(80)), 1);

        let scan_speed = journal
            .calls()
            .into_iter()
            .find_map(|c| match c {
                HardwareCall::StageSetSpeed { speed, .. } => Some(speed),
                _ => None,
            })
            .unwrap();
        assert!((scan_speed - 0.5 * 1e6 / 15_000.0).abs() < 1e-9);

        // Ends with the return move to the start position
        assert_eq!(
            journal.last_position(|c| matches!(c, HardwareCall::StageMoveAbsolute { .. })),
            journal.last_position(
                |c| matches!(c, HardwareCall::StageMoveAbsolute { position, .. } if *position == 2.0)
            )
        );
    }

    #[test]
    fn start_failure_still_tears_down() {
        let journal = CallJournal::new();
        let recorder = MockRecorder::new().with_journal(journal.clone());
        let camera = MockCamera::new()
            .with_journal(journal.clone())
            .with_failing_acquisition();
        let stage: Arc<dyn Stage> =
            Arc::new(MockStage::new("x", StageKind::Translation).with_journal(journal.clone()));
        let orchestrator = RecordingOrchestrator::builder(Arc::new(camera), recorder)
            .stage(stage)
            .timing(fast_timing())
            .build()
            .unwrap();

        let request = RecordingRequest::sweep("D://fail.hyspex", 0.0, 10.0, Some(0.5));
        let outcome = orchestrator.record(&request, &CancelToken::active());

        assert!(!outcome.success());
        assert!(outcome.fault.unwrap().contains("camera acquisition"));
        // No forward move, but the recorder is stopped and the stage returned
        assert_eq!(
            journal.count(|c| matches!(c, HardwareCall::StageMoveAbsolute { position, .. } if *position == 10.0)),
            0
        );
        assert_eq!(journal.count(|c| *c == HardwareCall::RecorderStop), 1);
        assert_eq!(
            journal.count(|c| matches!(c, HardwareCall::StageMoveAbsolute { position, .. } if *position == 0.0)),
            1
        );
    }

    #[test]
    fn recorder_start_failure_skips_camera_and_sweep() {
        let journal = CallJournal::new();
        let recorder = MockRecorder::new()
            .with_journal(journal.clone())
            .with_failing_start();
        let camera = MockCamera::new().with_journal(journal.clone());
        let stage: Arc<dyn Stage> = Arc::new(
            MockStage::new("x", StageKind::Translation)
                .with_position(3.0)
                .with_journal(journal.clone()),
        );
        let orchestrator = RecordingOrchestrator::builder(Arc::new(camera), recorder)
            .stage(stage)
            .timing(fast_timing())
            .build()
            .unwrap();
        journal.clear();

        let request = RecordingRequest::sweep("D://refused.hyspex", 3.0, 10.0, Some(0.5));
        let outcome = orchestrator.record(&request, &CancelToken::active());

        assert!(!outcome.success());
        assert!(outcome.fault.unwrap().contains("recorder start"));
        assert_eq!(journal.count(|c| *c == HardwareCall::CameraStartAcquisition), 0);
        assert_eq!(
            journal.count(|c| matches!(c, HardwareCall::StageMoveAbsolute { position, .. } if *position == 13.0)),
            0
        );

        // Teardown: recorder stopped, then the stage sent back to its start
        let stop = journal.position(|c| *c == HardwareCall::RecorderStop).unwrap();
        let back = journal
            .position(|c| matches!(c, HardwareCall::StageMoveAbsolute { position, .. } if *position == 3.0))
            .unwrap();
        assert!(stop < back);
        assert_eq!(journal.calls()[0], HardwareCall::RecorderDestination("D://refused.hyspex".into()));
    }

    #[test]
    fn backward_sweep_is_bounded() {
        let journal = CallJournal::new();
        let recorder = Arc::new(MockRecorder::new().with_journal(journal.clone()));
        let stage: Arc<dyn Stage> = Arc::new(
            MockStage::new("r", StageKind::Rotation)
                .with_position(40.0)
                .with_journal(journal.clone()),
        );
        let orchestrator =
            RecordingOrchestrator::builder(Arc::new(MockCamera::new()), Arc::clone(&recorder))
                .stage(stage)
                .timing(fast_timing())
                .build()
                .unwrap();

        let request = RecordingRequest::sweep("D://back.hyspex", 40.0, -40.0, Some(0.5));
        let outcome = orchestrator.record(&request, &CancelToken::active());

        assert!(outcome.success());
        assert_eq!(outcome.target_frames, 80);
        assert_eq!(recorder.auto_stop_frames(), 80);
        assert_eq!(
            journal.count(|c| matches!(c, HardwareCall::StageMoveAbsolute { position, .. } if *position == 0.0)),
            1
        );
    }

    #[test]
    fn final_count_logged_before_return() {
        let log = CapturingLog::default();
        let stage: Arc<dyn Stage> = Arc::new(MockStage::new("x", StageKind::Translation));
        let orchestrator = RecordingOrchestrator::builder(Arc::new(MockCamera::new()), MockRecorder::new())
            .stage(stage)
            .timing(fast_timing())
            .log(Arc::new(log.clone()))
            .build()
            .unwrap();

        let request = RecordingRequest::sweep("D://count.hyspex", 0.0, 10.0, Some(0.5));
        orchestrator.record(&request, &CancelToken::active());

        let messages = log.buffer().messages(LogLevel::Info);
        let complete = messages
            .iter()
            .position(|m| m == "Recorded: 20 out of: 20 ( complete )")
            .unwrap();
        let moving = messages
            .iter()
            .position(|m| m == "Moving stage back to start...")
            .unwrap();
        assert!(complete < moving);
    }

    #[test]
    fn movement_wait_honours_timeout() {
        let log = CapturingLog::default();
        let stage = MockStage::new("slow", StageKind::Rotation).with_travel_time();
        stage.set_speed(0.001).unwrap();
        stage.move_absolute(100.0).unwrap();

        let orchestrator = RecordingOrchestrator::builder(Arc::new(MockCamera::new()), MockRecorder::new())
            .timing(PollTiming {
                movement_timeout: Some(Duration::from_millis(20)),
                ..fast_timing()
            })
            .log(Arc::new(log.clone()))
            .build()
            .unwrap();

        assert!(!orchestrator.wait_for_movement_complete(&stage));
        assert_eq!(log.buffer().count_containing("still moving"), 1);
    }
}
