//! Mock Hardware Implementations
//!
//! Simulated collaborators for testing without physical hardware. Every mock
//! can share a [`CallJournal`], which records the order of side-effecting
//! calls across devices so tests can assert sequencing contracts.
//!
//! # Available Mocks
//!
//! - `MockCamera` - line-scan camera producing synthetic lines at its frame period
//! - `MockStage` - single axis, instant by default or with travel time
//! - `MockRecorder` - recorder that completes instantly or at a fixed line rate
//!
//! All mocks use blocking `std::thread::sleep`, matching the threading model
//! of the workers that drive them.

use anyhow::{anyhow, bail, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crate::hardware::capabilities::{
    ImageLine, ImageMode, LineScanCamera, Recorder, RecorderSettings, RecordingStatus, Stage,
    StageKind,
};

// =============================================================================
// CallJournal - Cross-device call ordering
// =============================================================================

/// A side-effecting call made on a mock device.
#[derive(Debug, Clone, PartialEq)]
pub enum HardwareCall {
    /// `Recorder::configure`
    RecorderConfigure,
    /// `Recorder::set_destination`
    RecorderDestination(String),
    /// `Recorder::set_auto_stop_frames`
    RecorderAutoStop(u32),
    /// `Recorder::start`
    RecorderStart,
    /// `Recorder::stop`
    RecorderStop,
    /// `LineScanCamera::start_acquisition`
    CameraStartAcquisition,
    /// `LineScanCamera::stop_acquisition`
    CameraStopAcquisition,
    /// `Stage::set_speed`
    StageSetSpeed { stage: String, speed: f64 },
    /// `Stage::move_absolute`
    StageMoveAbsolute { stage: String, position: f64 },
    /// `Stage::move_relative`
    StageMoveRelative { stage: String, distance: f64 },
    /// `Stage::stop`
    StageStop { stage: String },
}

/// Shared, ordered log of [`HardwareCall`]s.
#[derive(Debug, Clone, Default)]
pub struct CallJournal(Arc<Mutex<Vec<HardwareCall>>>);

impl CallJournal {
    /// Create an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a call.
    pub fn record(&self, call: HardwareCall) {
        self.0.lock().push(call);
    }

    /// Snapshot of all calls so far.
    pub fn calls(&self) -> Vec<HardwareCall> {
        self.0.lock().clone()
    }

    /// Index of the first call matching `predicate`.
    pub fn position(&self, predicate: impl Fn(&HardwareCall) -> bool) -> Option<usize> {
        self.0.lock().iter().position(predicate)
    }

    /// Index of the last call matching `predicate`.
    pub fn last_position(&self, predicate: impl Fn(&HardwareCall) -> bool) -> Option<usize> {
        self.0.lock().iter().rposition(predicate)
    }

    /// Number of calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&HardwareCall) -> bool) -> usize {
        self.0.lock().iter().filter(|call| predicate(call)).count()
    }

    /// Forget all recorded calls.
    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

// =============================================================================
// MockCamera - Simulated Line-Scan Camera
// =============================================================================

/// Mock line-scan camera
///
/// Produces one synthetic line per frame period while acquiring. Each reader
/// thread gets its own frame counter. Optionally flags every n-th line as
/// saturated.
///
/// Defaults: 384 spatial × 288 spectral pixels, 15 ms frame period, 16°
/// lens at 30 cm, `RecordHD = E`, 0.73 mrad square pixels.
pub struct MockCamera {
    id: String,
    spatial_size: usize,
    spectral_size: usize,
    frame_period_us: u32,
    integration_time_us: u32,
    averaged_frames: u16,
    field_of_view: Option<f64>,
    working_distance: Option<f64>,
    saturate_every: Option<u64>,
    fail_acquisition: bool,
    parameters: RwLock<HashMap<String, String>>,
    acquiring: AtomicBool,
    cursors: Mutex<HashMap<ThreadId, u64>>,
    journal: CallJournal,
}

impl MockCamera {
    /// Create a mock camera writing to its own journal
    pub fn new() -> Self {
        let parameters = HashMap::from([
            ("RecordHD".to_string(), "E".to_string()),
            ("pixelsize_x".to_string(), "0.00073".to_string()),
            ("pixelsize_y".to_string(), "0.00073".to_string()),
        ]);

        Self {
            id: "MOCK-LS-0001".to_string(),
            spatial_size: 384,
            spectral_size: 288,
            frame_period_us: 15_000,
            integration_time_us: 5_000,
            averaged_frames: 1,
            field_of_view: Some(16.0_f64.to_radians()),
            working_distance: Some(30.0),
            saturate_every: None,
            fail_acquisition: false,
            parameters: RwLock::new(parameters),
            acquiring: AtomicBool::new(false),
            cursors: Mutex::new(HashMap::new()),
            journal: CallJournal::new(),
        }
    }

    /// Record calls into a shared journal
    pub fn with_journal(mut self, journal: CallJournal) -> Self {
        self.journal = journal;
        self
    }

    /// Override the camera id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Override frame period and averaging
    pub fn with_timing(mut self, frame_period_us: u32, averaged_frames: u16) -> Self {
        self.frame_period_us = frame_period_us;
        self.averaged_frames = averaged_frames;
        self
    }

    /// Override the integration time
    pub fn with_integration_time(mut self, integration_time_us: u32) -> Self {
        self.integration_time_us = integration_time_us;
        self
    }

    /// Override the spatial pixel count
    pub fn with_spatial_size(mut self, spatial_size: usize) -> Self {
        self.spatial_size = spatial_size;
        self
    }

    /// Set the lens geometry; `None` makes the corresponding query fail
    pub fn with_lens(mut self, field_of_view: Option<f64>, working_distance: Option<f64>) -> Self {
        self.field_of_view = field_of_view;
        self.working_distance = working_distance;
        self
    }

    /// Set or replace a named parameter
    pub fn with_parameter(self, name: &str, value: &str) -> Self {
        self.parameters
            .write()
            .insert(name.to_string(), value.to_string());
        self
    }

    /// Remove a named parameter
    pub fn without_parameter(self, name: &str) -> Self {
        self.parameters.write().remove(name);
        self
    }

    /// Flag every `n`-th line as saturated
    pub fn with_saturation_every(mut self, n: u64) -> Self {
        self.saturate_every = Some(n);
        self
    }

    /// Make `start_acquisition` fail
    pub fn with_failing_acquisition(mut self) -> Self {
        self.fail_acquisition = true;
        self
    }

    /// Number of threads currently holding a read cursor
    pub fn active_readers(&self) -> usize {
        self.cursors.lock().len()
    }

    fn frame_period(&self) -> Duration {
        Duration::from_micros(u64::from(self.frame_period_us))
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl LineScanCamera for MockCamera {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn spatial_size(&self) -> usize {
        self.spatial_size
    }

    fn spectral_size(&self) -> usize {
        self.spectral_size
    }

    fn frame_period_us(&self) -> u32 {
        self.frame_period_us
    }

    fn integration_time_us(&self) -> u32 {
        self.integration_time_us
    }

    fn averaged_frames(&self) -> u16 {
        self.averaged_frames
    }

    fn parameter(&self, name: &str) -> Option<String> {
        self.parameters.read().get(name).cloned()
    }

    fn lens_field_of_view(&self) -> Result<f64> {
        self.field_of_view
            .ok_or_else(|| anyhow!("lens field of view unavailable"))
    }

    fn lens_working_distance(&self) -> Result<f64> {
        self.working_distance
            .ok_or_else(|| anyhow!("lens working distance unavailable"))
    }

    fn start_acquisition(&self) -> Result<()> {
        self.journal.record(HardwareCall::CameraStartAcquisition);
        if self.fail_acquisition {
            bail!("camera {} refused to start acquisition", self.id);
        }
        self.acquiring.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_acquisition(&self) -> Result<()> {
        self.journal.record(HardwareCall::CameraStopAcquisition);
        self.acquiring.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_acquiring(&self) -> bool {
        self.acquiring.load(Ordering::SeqCst)
    }

    fn next_frame(&self, _mode: ImageMode, timeout: Duration) -> Result<Option<ImageLine>> {
        let period = self.frame_period();
        if !self.is_acquiring() || period > timeout {
            thread::sleep(timeout);
            return Ok(None);
        }
        thread::sleep(period);

        let frame_number = {
            let mut cursors = self.cursors.lock();
            let cursor = cursors.entry(thread::current().id()).or_insert(0);
            *cursor += 1;
            *cursor
        };

        let mut saturated = vec![0u16; self.spatial_size];
        if let Some(n) = self.saturate_every.filter(|&n| n > 0) {
            if frame_number % n == 0 {
                if let Some(first) = saturated.first_mut() {
                    *first = 1;
                }
            }
        }

        Ok(Some(ImageLine {
            frame_number,
            pixels: vec![1000; self.spatial_size * self.spectral_size],
            saturated,
        }))
    }

    fn release_reader(&self) {
        self.cursors.lock().remove(&thread::current().id());
    }
}

// =============================================================================
// MockStage - Simulated Motion Stage
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct StageMotion {
    from: f64,
    target: f64,
    speed: f64,
    started: Instant,
}

impl StageMotion {
    fn duration(&self) -> Duration {
        let distance = (self.target - self.from).abs();
        if distance == 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(distance / self.speed)
    }

    fn position_at(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.started);
        if elapsed >= self.duration() {
            return self.target;
        }
        let travelled = self.speed * elapsed.as_secs_f64();
        if self.target >= self.from {
            self.from + travelled
        } else {
            self.from - travelled
        }
    }

    fn is_moving_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) < self.duration()
    }
}

/// Mock motion stage
///
/// Instant by default: every move completes before `move_*` returns. With
/// [`MockStage::with_travel_time`] moves take `distance / speed` seconds and
/// `stop` freezes the axis where it is.
pub struct MockStage {
    id: String,
    kind: StageKind,
    instant: bool,
    recommended_speed: f64,
    motion: Mutex<StageMotion>,
    journal: CallJournal,
}

impl MockStage {
    /// Create an instant mock stage at position 0
    pub fn new(id: impl Into<String>, kind: StageKind) -> Self {
        Self {
            id: id.into(),
            kind,
            instant: true,
            recommended_speed: 5.0,
            motion: Mutex::new(StageMotion {
                from: 0.0,
                target: 0.0,
                speed: 1.0,
                started: Instant::now(),
            }),
            journal: CallJournal::new(),
        }
    }

    /// Record calls into a shared journal
    pub fn with_journal(mut self, journal: CallJournal) -> Self {
        self.journal = journal;
        self
    }

    /// Start at `position` instead of 0
    pub fn with_position(self, position: f64) -> Self {
        {
            let mut motion = self.motion.lock();
            motion.from = position;
            motion.target = position;
        }
        self
    }

    /// Simulate travel time at the configured speed
    pub fn with_travel_time(mut self) -> Self {
        self.instant = false;
        self
    }

    /// Override the recommended repositioning speed
    pub fn with_recommended_speed(mut self, speed: f64) -> Self {
        self.recommended_speed = speed;
        self
    }

    fn command_move(&self, target: f64) {
        let now = Instant::now();
        let mut motion = self.motion.lock();
        let current = motion.position_at(now);
        motion.from = if self.instant { target } else { current };
        motion.target = target;
        motion.started = now;
    }
}

impl Stage for MockStage {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> StageKind {
        self.kind
    }

    fn speed(&self) -> Result<f64> {
        Ok(self.motion.lock().speed)
    }

    fn set_speed(&self, units_per_second: f64) -> Result<()> {
        self.journal.record(HardwareCall::StageSetSpeed {
            stage: self.id.clone(),
            speed: units_per_second,
        });
        if !(units_per_second.is_finite() && units_per_second > 0.0) {
            bail!("stage {}: invalid speed {}", self.id, units_per_second);
        }
        let now = Instant::now();
        let mut motion = self.motion.lock();
        // Re-anchor so an in-flight move continues from where it is
        let current = motion.position_at(now);
        motion.from = current;
        motion.started = now;
        motion.speed = units_per_second;
        Ok(())
    }

    fn position(&self) -> Result<f64> {
        Ok(self.motion.lock().position_at(Instant::now()))
    }

    fn move_absolute(&self, position: f64) -> Result<()> {
        self.journal.record(HardwareCall::StageMoveAbsolute {
            stage: self.id.clone(),
            position,
        });
        self.command_move(position);
        Ok(())
    }

    fn move_relative(&self, distance: f64) -> Result<()> {
        self.journal.record(HardwareCall::StageMoveRelative {
            stage: self.id.clone(),
            distance,
        });
        let target = self.motion.lock().target + distance;
        self.command_move(target);
        Ok(())
    }

    fn recommended_speed(&self) -> Result<f64> {
        Ok(self.recommended_speed)
    }

    fn is_moving(&self) -> Result<bool> {
        Ok(self.motion.lock().is_moving_at(Instant::now()))
    }

    fn stop(&self) -> Result<()> {
        self.journal.record(HardwareCall::StageStop {
            stage: self.id.clone(),
        });
        let now = Instant::now();
        let mut motion = self.motion.lock();
        let current = motion.position_at(now);
        motion.from = current;
        motion.target = current;
        motion.started = now;
        Ok(())
    }
}

// =============================================================================
// MockRecorder - Simulated Frame Recorder
// =============================================================================

#[derive(Debug, Default)]
struct RecorderState {
    settings: Option<RecorderSettings>,
    destination: Option<String>,
    auto_stop_frames: u32,
    started: Option<Instant>,
    frozen_frames: u64,
    destinations: Vec<String>,
}

/// Mock recorder
///
/// Without a line rate, a bounded recording completes as soon as it starts
/// and an unbounded one (auto-stop 0) writes nothing until stopped. With
/// [`MockRecorder::with_line_rate`], frames accumulate over time.
pub struct MockRecorder {
    line_rate: Option<f64>,
    terminal_status: Option<RecordingStatus>,
    fail_start: bool,
    state: Mutex<RecorderState>,
    journal: CallJournal,
}

impl MockRecorder {
    /// Create an instant mock recorder
    pub fn new() -> Self {
        Self {
            line_rate: None,
            terminal_status: None,
            fail_start: false,
            state: Mutex::new(RecorderState::default()),
            journal: CallJournal::new(),
        }
    }

    /// Record calls into a shared journal
    pub fn with_journal(mut self, journal: CallJournal) -> Self {
        self.journal = journal;
        self
    }

    /// Write `lines_per_second` frames per second
    pub fn with_line_rate(mut self, lines_per_second: f64) -> Self {
        self.line_rate = Some(lines_per_second);
        self
    }

    /// Report `status` as soon as a recording starts
    pub fn with_terminal_status(mut self, status: RecordingStatus) -> Self {
        self.terminal_status = Some(status);
        self
    }

    /// Make `start` fail
    pub fn with_failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Every destination a recording was started with, in order
    pub fn destinations(&self) -> Vec<String> {
        self.state.lock().destinations.clone()
    }

    /// Settings applied through `configure`
    pub fn settings(&self) -> Option<RecorderSettings> {
        self.state.lock().settings.clone()
    }

    /// Current auto-stop frame count
    pub fn auto_stop_frames(&self) -> u32 {
        self.state.lock().auto_stop_frames
    }

    fn frames_at(&self, state: &RecorderState, now: Instant) -> u64 {
        let Some(started) = state.started else {
            return state.frozen_frames;
        };
        let limit = u64::from(state.auto_stop_frames);
        let produced = match self.line_rate {
            Some(rate) => (now.saturating_duration_since(started).as_secs_f64() * rate) as u64,
            None => limit,
        };
        if limit > 0 {
            produced.min(limit)
        } else {
            produced
        }
    }
}

impl Default for MockRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder for MockRecorder {
    fn configure(&self, settings: &RecorderSettings) -> Result<()> {
        self.journal.record(HardwareCall::RecorderConfigure);
        self.state.lock().settings = Some(settings.clone());
        Ok(())
    }

    fn set_destination(&self, file_name: &str) -> Result<()> {
        self.journal
            .record(HardwareCall::RecorderDestination(file_name.to_string()));
        self.state.lock().destination = Some(file_name.to_string());
        Ok(())
    }

    fn set_auto_stop_frames(&self, frames: u32) -> Result<()> {
        self.journal.record(HardwareCall::RecorderAutoStop(frames));
        self.state.lock().auto_stop_frames = frames;
        Ok(())
    }

    fn start(&self) -> Result<()> {
        self.journal.record(HardwareCall::RecorderStart);
        if self.fail_start {
            bail!("recorder refused to start");
        }
        let mut state = self.state.lock();
        let destination = state
            .destination
            .clone()
            .ok_or_else(|| anyhow!("no destination set"))?;
        state.destinations.push(destination);
        state.frozen_frames = 0;
        state.started = Some(Instant::now());
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.journal.record(HardwareCall::RecorderStop);
        let mut state = self.state.lock();
        let frames = self.frames_at(&state, Instant::now());
        state.frozen_frames = frames;
        state.started = None;
        Ok(())
    }

    fn status(&self) -> RecordingStatus {
        let state = self.state.lock();
        if let Some(status) = self.terminal_status {
            if state.started.is_some() || !state.destinations.is_empty() {
                return status;
            }
        }
        if state.started.is_none() {
            return RecordingStatus::Stopped;
        }
        let limit = u64::from(state.auto_stop_frames);
        if limit > 0 && self.frames_at(&state, Instant::now()) >= limit {
            RecordingStatus::Stopped
        } else {
            RecordingStatus::Started
        }
    }

    fn frames_written(&self) -> u64 {
        let state = self.state.lock();
        self.frames_at(&state, Instant::now())
    }
}
