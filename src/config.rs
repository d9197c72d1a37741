//! Scan configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (`config/default.toml` unless another path is given)
//! 2. Environment variables prefixed with `LINESCAN_`, nested with `__`
//!
//! Example: `LINESCAN_SCAN__LENGTH=20.5` overrides `scan.length`.
//!
//! # Example
//! ```no_run
//! use linescan_daq::config::ScanConfig;
//!
//! let config = ScanConfig::load()?;
//! config.validate()?;
//! println!("Profile: {:?}", config.scan.profile);
//! # Ok::<(), linescan_daq::error::ScanError>(())
//! ```

use crate::error::{ScanError, ScanResult};
use crate::hardware::ImageMode;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Top-level scan configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Recorder settings applied when an orchestrator is built
    #[serde(default)]
    pub recording: RecordingConfig,
    /// Poll intervals and timeouts
    #[serde(default)]
    pub timing: TimingConfig,
    /// Motion profile and scan geometry
    #[serde(default)]
    pub scan: ScanSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "linescan".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Recorder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Free-text comment embedded in every recording
    #[serde(default = "default_comment")]
    pub comment: String,
    /// Processing mode of written frames
    #[serde(default = "default_image_mode")]
    pub image_mode: ImageMode,
    /// Whether the recorder stores per-line saturation counts
    #[serde(default = "default_true")]
    pub write_saturation_matrix: bool,
    /// User prefix placed in front of generated file names
    #[serde(default)]
    pub file_prefix: String,
    /// File extension of recordings
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Drive used when the camera does not report `RecordHD`
    #[serde(default = "default_drive")]
    pub fallback_drive: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            comment: default_comment(),
            image_mode: default_image_mode(),
            write_saturation_matrix: true,
            file_prefix: String::new(),
            extension: default_extension(),
            fallback_drive: default_drive(),
        }
    }
}

/// Poll intervals and timeouts, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Recorder status poll interval
    #[serde(default = "default_status_poll")]
    pub status_poll_ms: u64,
    /// Stage `is_moving` poll interval
    #[serde(default = "default_movement_poll")]
    pub movement_poll_ms: u64,
    /// Upper bound on a movement wait (absent = wait indefinitely)
    #[serde(default)]
    pub movement_timeout_ms: Option<u64>,
    /// Frame fetch timeout used by the frame reader
    #[serde(default = "default_frame_timeout")]
    pub frame_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            status_poll_ms: default_status_poll(),
            movement_poll_ms: default_movement_poll(),
            movement_timeout_ms: None,
            frame_timeout_ms: default_frame_timeout(),
        }
    }
}

impl TimingConfig {
    /// Status poll interval as a `Duration`.
    pub fn status_poll(&self) -> Duration {
        Duration::from_millis(self.status_poll_ms)
    }

    /// Movement poll interval as a `Duration`.
    pub fn movement_poll(&self) -> Duration {
        Duration::from_millis(self.movement_poll_ms)
    }

    /// Movement timeout, if one is configured.
    pub fn movement_timeout(&self) -> Option<Duration> {
        self.movement_timeout_ms.map(Duration::from_millis)
    }

    /// Frame fetch timeout as a `Duration`.
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }
}

/// Which motion profile drives the scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProfileKind {
    /// Pick from the stages that are present
    #[default]
    Auto,
    /// Camera only, fixed number of frames
    Stationary,
    /// Linear stage sweep
    Translation,
    /// Rotation stage sweep
    Rotation,
    /// Rotation sweeps stepped along a second rotation axis
    Raster,
}

/// Scan geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Motion profile to run
    #[serde(default)]
    pub profile: ProfileKind,
    /// Scan length in stage units (cm or degrees)
    #[serde(default = "default_length")]
    pub length: f64,
    /// Translation start position in stage units
    #[serde(default)]
    pub start_position: f64,
    /// Stationary frame count (0 records until stopped)
    #[serde(default)]
    pub frames: u32,
    /// Raster line count
    #[serde(default = "default_scan_lines")]
    pub scan_lines: u32,
    /// Raster cross-axis step in degrees
    #[serde(default)]
    pub line_step: Option<f64>,
    /// Raster cross-axis step as a percentage of the field of view
    #[serde(default)]
    pub overlap_percent: Option<f64>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            profile: ProfileKind::Auto,
            length: default_length(),
            start_position: 0.0,
            frames: 0,
            scan_lines: default_scan_lines(),
            line_step: None,
            overlap_percent: None,
        }
    }
}

// Default value functions
fn default_comment() -> String {
    "Example recording".to_string()
}

fn default_image_mode() -> ImageMode {
    ImageMode::Responsivity
}

fn default_true() -> bool {
    true
}

fn default_extension() -> String {
    "hyspex".to_string()
}

fn default_drive() -> String {
    "D".to_string()
}

fn default_status_poll() -> u64 {
    500
}

fn default_movement_poll() -> u64 {
    10
}

fn default_frame_timeout() -> u64 {
    500
}

fn default_length() -> f64 {
    10.0
}

fn default_scan_lines() -> u32 {
    1
}

impl ScanConfig {
    /// Load configuration from the default file and environment variables
    pub fn load() -> ScanResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// Built-in defaults sit underneath the file, so a partial file is fine.
    /// A missing file is not an error; environment variables still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> ScanResult<Self> {
        let config = Figment::from(Serialized::defaults(ScanConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("LINESCAN_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> ScanResult<String> {
        toml::to_string_pretty(self).map_err(|e| ScanError::Validation(e.to_string()))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> ScanResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ScanError::Validation(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.timing.status_poll_ms == 0 || self.timing.movement_poll_ms == 0 {
            return Err(ScanError::Validation(
                "Poll intervals must be greater than zero".to_string(),
            ));
        }

        if self.recording.extension.is_empty() || self.recording.fallback_drive.is_empty() {
            return Err(ScanError::Validation(
                "Recording extension and fallback drive must not be empty".to_string(),
            ));
        }

        let scan = &self.scan;
        if !scan.length.is_finite() || scan.length < 0.0 {
            return Err(ScanError::Validation(format!(
                "Invalid scan length {}. Must be a non-negative number",
                scan.length
            )));
        }

        if scan.scan_lines == 0 {
            return Err(ScanError::Validation(
                "scan_lines must be at least 1".to_string(),
            ));
        }

        if scan.line_step.is_some() && scan.overlap_percent.is_some() {
            return Err(ScanError::Validation(
                "Set either line_step or overlap_percent, not both".to_string(),
            ));
        }

        if let Some(percent) = scan.overlap_percent {
            if !(0.0..=100.0).contains(&percent) {
                return Err(ScanError::Validation(format!(
                    "Invalid overlap_percent {percent}. Must be 0-100"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = ScanConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timing.status_poll(), Duration::from_millis(500));
        assert_eq!(config.timing.movement_poll(), Duration::from_millis(10));
        assert_eq!(config.timing.movement_timeout(), None);
        assert_eq!(config.recording.comment, "Example recording");
        assert_eq!(config.recording.image_mode, ImageMode::Responsivity);
    }

    #[test]
    fn invalid_log_level_rejected() {
        let mut config = ScanConfig::default();
        config.application.log_level = "loud".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid log_level"));
    }

    #[test]
    fn conflicting_raster_step_rejected() {
        let mut config = ScanConfig::default();
        config.scan.line_step = Some(1.5);
        config.scan.overlap_percent = Some(20.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_scan_lines_rejected() {
        let mut config = ScanConfig::default();
        config.scan.scan_lines = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn load_from_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[scan]
profile = "raster"
length = 45.0
scan_lines = 3
overlap_percent = 25.0

[timing]
status_poll_ms = 50
"#
        )
        .unwrap();

        let config = ScanConfig::load_from(file.path()).unwrap();
        assert_eq!(config.scan.profile, ProfileKind::Raster);
        assert_eq!(config.scan.length, 45.0);
        assert_eq!(config.scan.scan_lines, 3);
        assert_eq!(config.timing.status_poll_ms, 50);
        assert_eq!(config.timing.movement_poll_ms, 10);
        assert_eq!(config.recording.extension, "hyspex");
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn environment_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scan]\nlength = 5.0").unwrap();

        std::env::set_var("LINESCAN_SCAN__LENGTH", "12.5");
        let config = ScanConfig::load_from(file.path());
        std::env::remove_var("LINESCAN_SCAN__LENGTH");

        assert_eq!(config.unwrap().scan.length, 12.5);
    }

    #[test]
    #[serial]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScanConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ScanConfig::default());
    }

    #[test]
    fn renders_as_toml() {
        let rendered = ScanConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[scan]"));
        assert!(rendered.contains("image_mode = \"responsivity\""));
    }
}
