//! Marker detection records.

use nalgebra::{Matrix3, Point2, Vector3};

/// Marker as reported by a detection backend, before pose estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMarker {
    /// Decoded marker id
    pub id: u32,
    /// Quad corners in pixels, consistent winding as reported by the backend
    pub corners: [Point2<f64>; 4],
    /// Quad center in pixels
    pub center: Point2<f64>,
    /// Detection quality; higher is more confident
    pub decision_margin: f32,
    /// Number of bit errors corrected while decoding
    pub hamming: u32,
}

/// 6-DoF marker pose in the camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerPose {
    /// Rotation from marker frame to camera frame
    pub rotation: Matrix3<f64>,
    /// Marker origin in the camera frame, in meters
    pub translation: Vector3<f64>,
    /// RMS corner reprojection error in pixels
    pub reprojection_error: f64,
}

impl MarkerPose {
    /// Translation in millimeters.
    pub fn translation_mm(&self) -> Vector3<f64> {
        self.translation * 1000.0
    }
}

/// One fiducial detection in a single frame.
///
/// Built fresh every frame and never mutated; only state derived from it
/// outlives the frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedMarker {
    pub id: u32,
    pub center: Point2<f64>,
    pub corners: [Point2<f64>; 4],
    pub decision_margin: f32,
    pub hamming: u32,
    /// Present only when pose estimation is enabled and succeeded.
    pub pose: Option<MarkerPose>,
}

impl DetectedMarker {
    pub fn from_raw(raw: RawMarker, pose: Option<MarkerPose>) -> Self {
        Self {
            id: raw.id,
            center: raw.center,
            corners: raw.corners,
            decision_margin: raw.decision_margin,
            hamming: raw.hamming,
            pose,
        }
    }

    pub fn has_pose(&self) -> bool {
        self.pose.is_some()
    }

    /// Distance from the camera along the optical axis, in millimeters.
    pub fn distance_mm(&self) -> Option<f64> {
        self.pose.map(|p| p.translation.z * 1000.0)
    }

    /// Mean of the top (0→1) and bottom (3→2) quad edge lengths, in pixels.
    pub fn mean_edge_length(&self) -> f64 {
        let c = &self.corners;
        let top = (c[1] - c[0]).norm();
        let bottom = (c[2] - c[3]).norm();
        (top + bottom) / 2.0
    }
}
