//! Builder for creating RawMarker objects from various input formats.

use nalgebra::Point2;

use crate::marker::RawMarker;

/// Builder for creating `RawMarker` objects from backend output or test fixtures.
#[derive(Debug, Clone)]
pub struct MarkerBuilder {
    id: u32,
    corners: [Point2<f64>; 4],
    center: Option<Point2<f64>>,
    decision_margin: f32,
    hamming: u32,
}

impl Default for MarkerBuilder {
    fn default() -> Self {
        Self {
            id: 0,
            corners: [Point2::origin(); 4],
            center: None,
            decision_margin: 0.0,
            hamming: 0,
        }
    }
}

impl MarkerBuilder {
    /// Create a new marker builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the decoded marker id.
    pub fn id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    /// Set the quad corners in pixels.
    pub fn corners(mut self, corners: [Point2<f64>; 4]) -> Self {
        self.corners = corners;
        self
    }

    /// Set the quad corners from `[x, y]` arrays, as most backends report them.
    pub fn corner_array(self, corners: [[f64; 2]; 4]) -> Self {
        self.corners(corners.map(|[x, y]| Point2::new(x, y)))
    }

    /// Set an axis-aligned square quad (center x, center y, side length).
    ///
    /// Corners follow the AprilTag winding: bottom-left, bottom-right,
    /// top-right, top-left in image coordinates.
    pub fn square(self, cx: f64, cy: f64, side: f64) -> Self {
        let h = side / 2.0;
        self.corners([
            Point2::new(cx - h, cy + h),
            Point2::new(cx + h, cy + h),
            Point2::new(cx + h, cy - h),
            Point2::new(cx - h, cy - h),
        ])
    }

    /// Set the quad center explicitly instead of the corner mean.
    pub fn center(mut self, cx: f64, cy: f64) -> Self {
        self.center = Some(Point2::new(cx, cy));
        self
    }

    /// Set the detection quality score.
    pub fn decision_margin(mut self, margin: f32) -> Self {
        self.decision_margin = margin;
        self
    }

    /// Set the number of corrected bit errors.
    pub fn hamming(mut self, hamming: u32) -> Self {
        self.hamming = hamming;
        self
    }

    /// Build the final `RawMarker`.
    pub fn build(self) -> RawMarker {
        let center = self.center.unwrap_or_else(|| {
            let sum = self
                .corners
                .iter()
                .fold(nalgebra::Vector2::zeros(), |acc, c| acc + c.coords);
            Point2::from(sum / 4.0)
        });
        RawMarker {
            id: self.id,
            corners: self.corners,
            center,
            decision_margin: self.decision_margin,
            hamming: self.hamming,
        }
    }
}
