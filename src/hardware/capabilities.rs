//! Collaborator Capabilities
//!
//! The orchestration layer drives three devices it does not own:
//!
//! - [`LineScanCamera`]: a push-broom imaging sensor producing one image line
//!   per frame period
//! - [`Stage`]: a single motorized axis (linear or rotary)
//! - [`Recorder`]: the component that writes acquired frames to disk
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is blocking (workers run on dedicated OS threads, not an executor)
//! - Is thread-safe (requires Send + Sync) and takes `&self`
//! - Uses anyhow::Result for errors
//!
//! Devices are shared through `Arc<dyn Trait>` handles. Workers never shut a
//! device down; its owner does.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Shared Types
// =============================================================================

/// Processing applied to frames before they are recorded or delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageMode {
    /// Unprocessed sensor counts
    Raw,
    /// Dark background subtracted
    BackgroundSubtracted,
    /// Radiometrically corrected ("RE")
    Responsivity,
    /// Raw with bad pixels replaced
    BadPixelCorrected,
}

impl ImageMode {
    /// Tag used in synthesized recording file names.
    pub fn file_tag(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Responsivity => "corr",
            Self::BackgroundSubtracted | Self::BadPixelCorrected => "custom",
        }
    }

    /// Numeric mode code understood by the acquisition driver.
    pub fn code(&self) -> i32 {
        match self {
            Self::Raw => 0,
            Self::BackgroundSubtracted => 1,
            Self::Responsivity => 2,
            Self::BadPixelCorrected => 3,
        }
    }
}

/// Recorder state as reported by [`Recorder::status`].
///
/// Negative codes are terminal failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordingStatus {
    /// Start requested, not yet writing
    PendingStart,
    /// Writing frames
    Started,
    /// Stop requested, flushing
    PendingStop,
    /// Finished normally
    Stopped,
    /// Waiting on an end-of-scan background acquisition
    BackgroundAtEndBlocked,
    /// Aborted because frames were lost
    StoppedLostFrames,
    /// Aborted because a write failed
    StoppedWriteFailure,
    /// Aborted because an internal buffer overflowed
    StoppedOverflow,
    /// A code this crate does not know
    Unknown(i32),
}

impl RecordingStatus {
    /// Wire code of this status.
    pub fn code(&self) -> i32 {
        match self {
            Self::PendingStart => 0,
            Self::Started => 1,
            Self::PendingStop => 2,
            Self::Stopped => 3,
            Self::BackgroundAtEndBlocked => 4,
            Self::StoppedLostFrames => -4,
            Self::StoppedWriteFailure => -5,
            Self::StoppedOverflow => -6,
            Self::Unknown(code) => *code,
        }
    }

    /// Decode a wire code.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::PendingStart,
            1 => Self::Started,
            2 => Self::PendingStop,
            3 => Self::Stopped,
            4 => Self::BackgroundAtEndBlocked,
            -4 => Self::StoppedLostFrames,
            -5 => Self::StoppedWriteFailure,
            -6 => Self::StoppedOverflow,
            other => Self::Unknown(other),
        }
    }

    /// Whether the recorder reports a terminal failure.
    pub fn is_failure(&self) -> bool {
        self.code() < 0
    }
}

impl fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

/// One acquired image line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageLine {
    /// Sequence number assigned by the camera
    pub frame_number: u64,
    /// Pixel values, spatial-major
    pub pixels: Vec<u16>,
    /// Saturated pixel count per spatial position
    pub saturated: Vec<u16>,
}

impl ImageLine {
    /// Whether any spatial position reports saturation.
    pub fn has_saturation(&self) -> bool {
        self.saturated.iter().any(|&count| count > 0)
    }
}

/// Kind of axis a stage drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    /// Linear axis, units are centimetres
    Translation,
    /// Primary rotation axis, units are degrees
    Rotation,
    /// Secondary rotation axis perpendicular to the primary, degrees
    CrossRotation,
}

impl StageKind {
    /// Parse the type string reported by stage discovery.
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "translation" => Some(Self::Translation),
            "rotation" => Some(Self::Rotation),
            "y-rotation" | "cross-rotation" => Some(Self::CrossRotation),
            _ => None,
        }
    }
}

/// Settings applied to a recorder once, when an orchestrator is built.
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderSettings {
    /// Free-text comment written into the file header
    pub comment: String,
    /// Processing mode of written frames
    pub image_mode: ImageMode,
    /// Whether to store per-line saturation counts
    pub write_saturation_matrix: bool,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            comment: "Example recording".to_string(),
            image_mode: ImageMode::Responsivity,
            write_saturation_matrix: true,
        }
    }
}

// =============================================================================
// LineScanCamera
// =============================================================================

/// Capability: line-scan camera
///
/// # Contract
/// - `start_acquisition` is idempotent; calling it while acquiring succeeds
/// - `next_frame` keeps an independent read cursor per calling thread and
///   returns `Ok(None)` when no frame arrived within `timeout`
/// - `release_reader` frees the calling thread's cursor
pub trait LineScanCamera: Send + Sync {
    /// Camera identifier (serial or model id)
    fn id(&self) -> String;

    /// Number of spatial pixels per line
    fn spatial_size(&self) -> usize;

    /// Number of spectral bands per pixel
    fn spectral_size(&self) -> usize;

    /// Frame period in microseconds
    fn frame_period_us(&self) -> u32;

    /// Integration time in microseconds
    fn integration_time_us(&self) -> u32;

    /// Number of frames averaged into each delivered line
    fn averaged_frames(&self) -> u16;

    /// Named camera parameter, if the camera knows it
    fn parameter(&self, name: &str) -> Option<String>;

    /// Named numeric camera parameter
    fn parameter_f64(&self, name: &str) -> Option<f64> {
        self.parameter(name)?.trim().parse().ok()
    }

    /// Full field of view of the mounted lens, radians
    fn lens_field_of_view(&self) -> Result<f64>;

    /// Working distance of the mounted lens, centimetres (0 = infinity)
    fn lens_working_distance(&self) -> Result<f64>;

    /// Begin acquisition
    fn start_acquisition(&self) -> Result<()>;

    /// End acquisition
    fn stop_acquisition(&self) -> Result<()>;

    /// Whether the camera is currently acquiring
    fn is_acquiring(&self) -> bool;

    /// Fetch the next line for the calling thread
    fn next_frame(&self, mode: ImageMode, timeout: Duration) -> Result<Option<ImageLine>>;

    /// Release the calling thread's read cursor
    fn release_reader(&self);
}

// =============================================================================
// Stage
// =============================================================================

/// Capability: single motorized axis
///
/// Units are centimetres for translation stages and degrees for rotation
/// stages; speeds are units per second.
///
/// # Contract
/// - Moves are asynchronous: `move_absolute`/`move_relative` return once the
///   move is commanded, `is_moving` reports completion
/// - `stop` halts any move in progress and is safe to call while idle
pub trait Stage: Send + Sync {
    /// Stage identifier
    fn id(&self) -> String;

    /// Axis kind
    fn kind(&self) -> StageKind;

    /// Current speed setting
    fn speed(&self) -> Result<f64>;

    /// Set the speed used by subsequent moves
    fn set_speed(&self, units_per_second: f64) -> Result<()>;

    /// Current position
    fn position(&self) -> Result<f64>;

    /// Command a move to `position`
    fn move_absolute(&self, position: f64) -> Result<()>;

    /// Command a move by `distance` from the current position
    fn move_relative(&self, distance: f64) -> Result<()>;

    /// Speed the manufacturer recommends for repositioning
    fn recommended_speed(&self) -> Result<f64>;

    /// Whether a move is in progress
    fn is_moving(&self) -> Result<bool>;

    /// Halt motion immediately
    fn stop(&self) -> Result<()>;
}

// =============================================================================
// Recorder
// =============================================================================

/// Capability: frame recorder
///
/// # Contract
/// - `configure`, `set_destination` and `set_auto_stop_frames` are only
///   called while the recorder is stopped
/// - An auto-stop count of 0 records until `stop` is called
/// - `stop` is safe to call after the recorder stopped on its own
pub trait Recorder: Send + Sync {
    /// Apply comment, image mode and saturation-matrix settings
    fn configure(&self, settings: &RecorderSettings) -> Result<()>;

    /// Set the output file for the next recording
    fn set_destination(&self, file_name: &str) -> Result<()>;

    /// Stop automatically after `frames` frames (0 = never)
    fn set_auto_stop_frames(&self, frames: u32) -> Result<()>;

    /// Begin recording
    fn start(&self) -> Result<()>;

    /// End recording and close the file
    fn stop(&self) -> Result<()>;

    /// Current recorder state
    fn status(&self) -> RecordingStatus;

    /// Frames written during the current or last recording
    fn frames_written(&self) -> u64;
}

impl<R: Recorder + ?Sized> Recorder for Arc<R> {
    fn configure(&self, settings: &RecorderSettings) -> Result<()> {
        (**self).configure(settings)
    }

    fn set_destination(&self, file_name: &str) -> Result<()> {
        (**self).set_destination(file_name)
    }

    fn set_auto_stop_frames(&self, frames: u32) -> Result<()> {
        (**self).set_auto_stop_frames(frames)
    }

    fn start(&self) -> Result<()> {
        (**self).start()
    }

    fn stop(&self) -> Result<()> {
        (**self).stop()
    }

    fn status(&self) -> RecordingStatus {
        (**self).status()
    }

    fn frames_written(&self) -> u64 {
        (**self).frames_written()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip_known_values() {
        for status in [
            RecordingStatus::PendingStart,
            RecordingStatus::Stopped,
            RecordingStatus::BackgroundAtEndBlocked,
            RecordingStatus::StoppedOverflow,
        ] {
            assert_eq!(RecordingStatus::from_code(status.code()), status);
        }
        assert_eq!(RecordingStatus::from_code(42), RecordingStatus::Unknown(42));
    }

    #[test]
    fn negative_status_is_failure() {
        assert!(RecordingStatus::StoppedLostFrames.is_failure());
        assert!(RecordingStatus::StoppedWriteFailure.is_failure());
        assert!(RecordingStatus::Unknown(-1).is_failure());
        assert!(!RecordingStatus::Stopped.is_failure());
        assert!(!RecordingStatus::PendingStart.is_failure());
    }

    #[test]
    fn file_tags_follow_image_mode() {
        assert_eq!(ImageMode::Raw.file_tag(), "raw");
        assert_eq!(ImageMode::Responsivity.file_tag(), "corr");
        assert_eq!(ImageMode::BackgroundSubtracted.file_tag(), "custom");
        assert_eq!(ImageMode::BadPixelCorrected.file_tag(), "custom");
    }

    #[test]
    fn saturation_detection() {
        let mut line = ImageLine {
            frame_number: 1,
            pixels: vec![10; 4],
            saturated: vec![0; 4],
        };
        assert!(!line.has_saturation());
        line.saturated[2] = 3;
        assert!(line.has_saturation());
    }

    #[test]
    fn stage_type_names() {
        assert_eq!(StageKind::from_type_name("rotation"), Some(StageKind::Rotation));
        assert_eq!(
            StageKind::from_type_name("y-rotation"),
            Some(StageKind::CrossRotation)
        );
        assert_eq!(
            StageKind::from_type_name("Translation"),
            Some(StageKind::Translation)
        );
        assert_eq!(StageKind::from_type_name("tilt"), None);
    }
}
