//! Recording file names.
//!
//! Generated names have the shape
//! `{drive}://{prefix}_{cameraId}_{integration}us_{timestamp}_{tag}.{ext}`,
//! for example `E://field_MOCK-LS-0001_5000us_2024-03-01T142501_corr.hyspex`.

use chrono::NaiveDateTime;
use std::fmt;

use crate::hardware::ImageMode;

/// Timestamp layout embedded in file names.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H%M%S";

/// A synthesized recording destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingFileName {
    drive: String,
    stem: String,
    extension: String,
}

impl RecordingFileName {
    /// Build a file name from its parts.
    pub fn synthesize(
        drive: &str,
        prefix: &str,
        camera_id: &str,
        integration_time_us: u32,
        timestamp: NaiveDateTime,
        mode: ImageMode,
        extension: &str,
    ) -> Self {
        let stem = format!(
            "{prefix}_{camera_id}_{integration_time_us}us_{}_{}",
            timestamp.format(TIMESTAMP_FORMAT),
            mode.file_tag()
        );
        Self {
            drive: drive.to_string(),
            stem,
            extension: extension.to_string(),
        }
    }

    /// Same destination with a `{line}_of_{total}_` prefix on the stem.
    pub fn with_line_prefix(&self, line: u32, total: u32) -> Self {
        Self {
            drive: self.drive.clone(),
            stem: format!("{line}_of_{total}_{}", self.stem),
            extension: self.extension.clone(),
        }
    }

    /// Drive letter or volume.
    pub fn drive(&self) -> &str {
        &self.drive
    }

    /// File name without drive or extension.
    pub fn stem(&self) -> &str {
        &self.stem
    }
}

impl fmt::Display for RecordingFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}.{}", self.drive, self.stem, self.extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn timestamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(14, 25, 1))
            .unwrap()
    }

    #[test]
    fn synthesized_name_layout() {
        let name = RecordingFileName::synthesize(
            "E",
            "field",
            "MOCK-LS-0001",
            5000,
            timestamp(),
            ImageMode::Responsivity,
            "hyspex",
        );
        assert_eq!(
            name.to_string(),
            "E://field_MOCK-LS-0001_5000us_2024-03-01T142501_corr.hyspex"
        );
    }

    #[test]
    fn mode_tags() {
        let raw = RecordingFileName::synthesize("D", "", "cam", 10, timestamp(), ImageMode::Raw, "hyspex");
        assert!(raw.stem().ends_with("_raw"));
        assert!(raw.stem().starts_with("_cam_10us_"));

        let custom = RecordingFileName::synthesize(
            "D",
            "",
            "cam",
            10,
            timestamp(),
            ImageMode::BackgroundSubtracted,
            "hyspex",
        );
        assert!(custom.stem().ends_with("_custom"));
    }

    #[test]
    fn line_prefix() {
        let base = RecordingFileName::synthesize("D", "p", "cam", 10, timestamp(), ImageMode::Raw, "hyspex");
        let line = base.with_line_prefix(1, 3);
        assert_eq!(line.drive(), "D");
        assert_eq!(line.stem(), format!("1_of_3_{}", base.stem()));
        assert!(line.to_string().starts_with("D://1_of_3_p_cam"));
    }
}
