//! Scan geometry.
//!
//! Pure conversions between optics, stage units and frame counts. "Units" are
//! centimetres for translation stages and degrees for rotation stages.

use std::f64::consts::PI;

/// Number of whole image lines covering `length` units.
///
/// A negative `length` is a backward sweep and covers as many lines as the
/// forward one. Returns `None` when `units_per_line` is absent, zero,
/// negative or not finite, or when `length` is not finite.
pub fn frame_count(length: f64, units_per_line: Option<f64>) -> Option<u32> {
    let units = usable(units_per_line?)?;
    if !length.is_finite() {
        return None;
    }
    let lines = (length.abs() / units).floor();
    (lines <= f64::from(u32::MAX)).then_some(lines as u32)
}

/// Stage speed (units per second) that advances one line per delivered frame.
///
/// `frame_period_us × averaged_frames` is the time between delivered lines.
pub fn recording_speed(
    units_per_line: Option<f64>,
    frame_period_us: u32,
    averaged_frames: u16,
) -> Option<f64> {
    let units = usable(units_per_line?)?;
    let line_time_us = f64::from(frame_period_us) * f64::from(averaged_frames);
    if line_time_us <= 0.0 {
        return None;
    }
    Some(units * 1e6 / line_time_us)
}

/// Width of the imaged strip (cm) at the lens working distance.
pub fn field_of_view_width(field_of_view_rad: f64, working_distance_cm: f64) -> f64 {
    2.0 * working_distance_cm * (field_of_view_rad / 2.0).tan()
}

/// Centimetres per line for a translation scan: strip width over spatial pixels.
///
/// A lens focused at infinity (working distance 0) yields `None`.
pub fn translation_units_per_line(
    field_of_view_rad: f64,
    working_distance_cm: f64,
    spatial_pixels: usize,
) -> Option<f64> {
    if spatial_pixels == 0 {
        return None;
    }
    let width = field_of_view_width(field_of_view_rad, working_distance_cm);
    usable(width / spatial_pixels as f64)
}

/// Degrees per line for a rotation scan.
///
/// `pixel_x` is the spatial pixel size and `pixel_y` the slit size, both in
/// radians. Rectangular pixels are corrected by the nearest integer aspect
/// ratio so the scan direction samples square pixels.
pub fn rotation_units_per_line(pixel_x_rad: f64, pixel_y_rad: f64) -> Option<f64> {
    if !(pixel_x_rad > 0.0 && pixel_y_rad > 0.0) {
        return None;
    }
    let scale = (pixel_y_rad / pixel_x_rad + 0.5).floor();
    if scale < 1.0 {
        return None;
    }
    usable(pixel_y_rad * 180.0 / (PI * scale))
}

/// Cross-axis raster step (degrees) giving `percent` of the field of view.
pub fn overlap_step_degrees(field_of_view_rad: f64, percent: f64) -> f64 {
    field_of_view_rad.to_degrees() * percent / 100.0
}

fn usable(value: f64) -> Option<f64> {
    (value.is_finite() && value > 0.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_floors() {
        assert_eq!(frame_count(40.0, Some(0.5)), Some(80));
        assert_eq!(frame_count(40.9, Some(0.5)), Some(81));
        assert_eq!(frame_count(0.4, Some(0.5)), Some(0));
    }

    #[test]
    fn frame_count_without_units_is_none() {
        assert_eq!(frame_count(40.0, Some(0.0)), None);
        assert_eq!(frame_count(40.0, None), None);
        assert_eq!(frame_count(40.0, Some(f64::NAN)), None);
        assert_eq!(frame_count(f64::INFINITY, Some(0.5)), None);
    }

    #[test]
    fn backward_sweep_counts_like_forward() {
        assert_eq!(frame_count(-40.0, Some(0.5)), Some(80));
        assert_eq!(frame_count(-0.4, Some(0.5)), Some(0));
    }

    #[test]
    fn recording_speed_matches_line_rate() {
        let speed = recording_speed(Some(0.01), 15_000, 1).unwrap();
        assert!((speed - 0.666_666_7).abs() < 1e-6);

        let averaged = recording_speed(Some(0.01), 15_000, 4).unwrap();
        assert!((averaged - speed / 4.0).abs() < 1e-9);
    }

    #[test]
    fn recording_speed_needs_timing() {
        assert_eq!(recording_speed(Some(0.01), 0, 1), None);
        assert_eq!(recording_speed(Some(0.01), 15_000, 0), None);
        assert_eq!(recording_speed(None, 15_000, 1), None);
    }

    #[test]
    fn translation_resolution() {
        // 90° lens at 10 cm images a 20 cm strip
        let units = translation_units_per_line(PI / 2.0, 10.0, 400).unwrap();
        assert!((units - 0.05).abs() < 1e-9);
        assert_eq!(translation_units_per_line(PI / 2.0, 0.0, 400), None);
        assert_eq!(translation_units_per_line(PI / 2.0, 10.0, 0), None);
    }

    #[test]
    fn rotation_resolution_square_pixels() {
        let units = rotation_units_per_line(0.001, 0.001).unwrap();
        assert!((units - 0.001_f64.to_degrees()).abs() < 1e-12);
    }

    #[test]
    fn rotation_resolution_rectangular_pixels() {
        // Slit twice as tall as the pixel is wide: half the angle per line
        let units = rotation_units_per_line(0.001, 0.002).unwrap();
        assert!((units - 0.001_f64.to_degrees()).abs() < 1e-12);
        assert_eq!(rotation_units_per_line(0.0, 0.002), None);
        assert_eq!(rotation_units_per_line(0.01, 0.001), None);
    }

    #[test]
    fn overlap_step() {
        let step = overlap_step_degrees(16.0_f64.to_radians(), 25.0);
        assert!((step - 4.0).abs() < 1e-9);
    }
}
