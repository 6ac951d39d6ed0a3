//! Pixel-to-millimeter scale: manual two-point calibration and the
//! marker-geometry scale.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::marker::DetectedMarker;

/// Shortest pixel distance that can define a scale. Calibration points
/// are picked on whole pixels.
const MIN_PIXEL_DISTANCE: f64 = 1.0;

/// Two-point pixel ruler along a known axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationData {
    pub point1: Point2<f64>,
    pub point2: Point2<f64>,
    pub length_mm: f64,
}

impl CalibrationData {
    /// Build a calibration, rejecting points under a pixel apart and
    /// non-positive lengths.
    pub fn new(
        point1: Point2<f64>,
        point2: Point2<f64>,
        length_mm: f64,
    ) -> Result<Self, ConfigError> {
        let calibration = Self {
            point1,
            point2,
            length_mm,
        };
        calibration.validate()?;
        Ok(calibration)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.length_mm.is_finite() || self.length_mm <= 0.0 {
            return Err(ConfigError::InvalidCalibrationLength(self.length_mm));
        }
        let distance = self.pixel_length();
        if !distance.is_finite() || distance < MIN_PIXEL_DISTANCE {
            return Err(ConfigError::DegenerateCalibration { distance });
        }
        Ok(())
    }

    /// Euclidean distance between the two points, in pixels.
    pub fn pixel_length(&self) -> f64 {
        (self.point2 - self.point1).norm()
    }

    pub fn mm_per_pixel(&self) -> f64 {
        self.length_mm / self.pixel_length()
    }

    /// Axis angle in radians, `atan2(dy, dx)`.
    pub fn angle(&self) -> f64 {
        let d = self.point2 - self.point1;
        d.y.atan2(d.x)
    }

    /// Signed position of `point` along the calibrated axis, in millimeters
    /// from `point1`.
    pub fn project_to_axis(&self, point: Point2<f64>) -> f64 {
        let angle = self.angle();
        let d = point - self.point1;
        (d.x * angle.cos() + d.y * angle.sin()) * self.mm_per_pixel()
    }
}

/// Scale from marker geometry: `tag_size_mm` over the mean top/bottom edge
/// length across `markers`.
///
/// Returns `None` without markers or when the quads are degenerate.
pub fn mm_per_pixel_from_markers<'a>(
    markers: impl IntoIterator<Item = &'a DetectedMarker>,
    tag_size_mm: f64,
) -> Option<f64> {
    let (sum, count) = markers
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), m| (sum + m.mean_edge_length(), count + 1));
    if count == 0 {
        return None;
    }
    let edge = sum / count as f64;
    (edge > MIN_PIXEL_DISTANCE).then(|| tag_size_mm / edge)
}
