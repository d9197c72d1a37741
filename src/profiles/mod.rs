//! Motion profiles
//!
//! A motion profile decides *how* the stage moves while the
//! [`RecordingOrchestrator`] records: not at all, along a linear axis, around
//! a rotation axis, or as a raster of rotation sweeps stepped along a second
//! axis.
//!
//! | Profile       | Stage          | Units per line                           |
//! |---------------|----------------|------------------------------------------|
//! | `Stationary`  | none           | n/a, fixed frame count                   |
//! | `Translation` | linear (cm)    | lens strip width / spatial pixels        |
//! | `Rotation`    | rotary (deg)   | slit angle, aspect-corrected             |
//! | `Raster`      | rotary + cross | as rotation, N lines stepped across      |
//!
//! [`ScanProfile`] dispatches over all four without boxing and is what the
//! configuration layer builds. [`ScanJob`] pairs a profile with an
//! orchestrator so it can run on a [`Worker`].

use std::sync::Arc;

use enum_dispatch::enum_dispatch;
use parking_lot::Mutex;
use tracing::info;

use crate::config::{ProfileKind, ScanSettings};
use crate::error::{ScanError, ScanResult};
use crate::hardware::{Stage, StageKind};
use crate::recording::{RecordingOrchestrator, RecordingOutcome};
use crate::worker::{CancelToken, Worker, WorkerBody};

mod raster;
mod rotation;
mod stationary;
mod translation;

pub use raster::{Raster, RasterStep};
pub use rotation::Rotation;
pub use stationary::Stationary;
pub use translation::Translation;

/// Strategy for one scan.
#[enum_dispatch]
pub trait MotionProfile: Send + Sync {
    /// Short name, used for the worker thread and in logs.
    fn name(&self) -> &'static str;

    /// Whether the orchestrator must have a primary stage.
    fn requires_stage(&self) -> bool;

    /// Stage travel per image line for the orchestrator's camera.
    ///
    /// `None` when the optics cannot be read or the profile does not move.
    fn units_per_image_line(&self, orchestrator: &RecordingOrchestrator) -> Option<f64>;

    /// Run the scan, returning one outcome per recording made.
    fn execute(
        &self,
        orchestrator: &RecordingOrchestrator,
        cancel: &CancelToken,
    ) -> Vec<RecordingOutcome>;
}

/// Any motion profile.
#[enum_dispatch(MotionProfile)]
pub enum ScanProfile {
    /// Camera only
    Stationary(Stationary),
    /// Linear sweep
    Translation(Translation),
    /// Rotary sweep
    Rotation(Rotation),
    /// Stepped rotary sweeps
    Raster(Raster),
}

impl ScanProfile {
    /// Build the profile described by `settings`.
    ///
    /// `ProfileKind::Auto` is resolved with [`select_profile`] from the kind
    /// of the primary stage and whether a cross axis is present.
    pub fn from_settings(
        settings: &ScanSettings,
        primary: Option<StageKind>,
        cross_axis: Option<Arc<dyn Stage>>,
    ) -> ScanResult<Self> {
        let kind = match settings.profile {
            ProfileKind::Auto => select_profile(primary, cross_axis.is_some()),
            explicit => explicit,
        };

        let profile: ScanProfile = match kind {
            ProfileKind::Auto | ProfileKind::Stationary => {
                Stationary::new(settings.frames).into()
            }
            ProfileKind::Translation => {
                Translation::new(settings.start_position, settings.length).into()
            }
            ProfileKind::Rotation => Rotation::new(settings.length).into(),
            ProfileKind::Raster => {
                let cross_axis = cross_axis.ok_or(ScanError::MissingStage("raster"))?;
                let mut raster = Raster::new(Rotation::new(settings.length), cross_axis);
                raster.set_scan_lines(settings.scan_lines);
                if let Some(step) = settings.line_step {
                    raster.set_line_step(step);
                }
                if let Some(percent) = settings.overlap_percent {
                    raster.set_percent_overlap(percent);
                }
                raster.into()
            }
        };
        Ok(profile)
    }
}

/// Choose a profile from the stages that are connected.
pub fn select_profile(primary: Option<StageKind>, has_cross_axis: bool) -> ProfileKind {
    match (primary, has_cross_axis) {
        (Some(StageKind::Rotation), true) => ProfileKind::Raster,
        (Some(StageKind::Rotation), false) => ProfileKind::Rotation,
        (Some(StageKind::Translation), _) => ProfileKind::Translation,
        // A lone cross axis cannot drive a sweep
        (Some(StageKind::CrossRotation), _) | (None, _) => ProfileKind::Stationary,
    }
}

/// A profile bound to an orchestrator, runnable on a [`Worker`].
pub struct ScanJob<P: MotionProfile> {
    orchestrator: RecordingOrchestrator,
    profile: P,
    outcomes: Mutex<Vec<RecordingOutcome>>,
}

/// Worker running a [`ScanJob`].
pub type ScanWorker<P = ScanProfile> = Worker<ScanJob<P>>;

impl<P: MotionProfile> ScanJob<P> {
    /// Bind `profile` to `orchestrator`.
    ///
    /// Fails if the profile drives a stage and the orchestrator has none.
    pub fn new(orchestrator: RecordingOrchestrator, profile: P) -> ScanResult<Self> {
        if profile.requires_stage() && orchestrator.stage().is_none() {
            return Err(ScanError::MissingStage(profile.name()));
        }
        Ok(Self {
            orchestrator,
            profile,
            outcomes: Mutex::new(Vec::new()),
        })
    }

    /// The bound profile.
    pub fn profile(&self) -> &P {
        &self.profile
    }

    /// Mutable access for setters between runs.
    pub fn profile_mut(&mut self) -> &mut P {
        &mut self.profile
    }

    /// The orchestrator recordings go through.
    pub fn orchestrator(&self) -> &RecordingOrchestrator {
        &self.orchestrator
    }

    /// Outcomes of the most recent run.
    pub fn outcomes(&self) -> Vec<RecordingOutcome> {
        self.outcomes.lock().clone()
    }

    /// Whether the most recent run made at least one recording and all succeeded.
    pub fn succeeded(&self) -> bool {
        let outcomes = self.outcomes.lock();
        !outcomes.is_empty() && outcomes.iter().all(RecordingOutcome::success)
    }
}

impl<P: MotionProfile + 'static> WorkerBody for ScanJob<P> {
    fn name(&self) -> &str {
        self.profile.name()
    }

    fn run(&self, cancel: &CancelToken) {
        info!(profile = self.profile.name(), "Scan started");
        self.outcomes.lock().clear();

        let outcomes = self.profile.execute(&self.orchestrator, cancel);

        let succeeded = outcomes.iter().filter(|o| o.success()).count();
        info!(
            profile = self.profile.name(),
            recordings = outcomes.len(),
            succeeded,
            cancelled = cancel.is_cancelled(),
            "Scan finished"
        );
        *self.outcomes.lock() = outcomes;
    }
}

/// Log a failed recording.
fn report(orchestrator: &RecordingOrchestrator, outcome: &RecordingOutcome) {
    if !outcome.success() {
        orchestrator.log().error("Recording aborted.");
    }
}
