//! Planar pose estimation for square markers.

use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::marker::MarkerPose;

/// Focal length of a ~67° horizontal field-of-view camera, per pixel of width.
const APPROX_FOCAL_PER_WIDTH: f64 = 1450.0 / 1920.0;

/// Pinhole camera intrinsics in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Approximate intrinsics from frame dimensions: principal point at the
    /// image center, square pixels, ~67° horizontal field of view.
    pub fn approximate(width: usize, height: usize) -> Self {
        let f = width as f64 * APPROX_FOCAL_PER_WIDTH;
        Self::new(f, f, width as f64 / 2.0, height as f64 / 2.0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ok = [self.fx, self.fy, self.cx, self.cy]
            .iter()
            .all(|v| v.is_finite())
            && self.fx > 0.0
            && self.fy > 0.0;
        if ok {
            Ok(())
        } else {
            Err(ConfigError::InvalidDetectorOption {
                name: "intrinsics",
                reason: format!("focal lengths must be positive and finite, got {self:?}"),
            })
        }
    }

    /// Project a camera-frame point to pixels.
    #[inline]
    pub fn project(&self, p: &Vector3<f64>) -> Point2<f64> {
        Point2::new(
            self.fx * p.x / p.z + self.cx,
            self.fy * p.y / p.z + self.cy,
        )
    }

    /// Pixel to normalized image coordinates.
    #[inline]
    pub fn normalize(&self, p: &Point2<f64>) -> Point2<f64> {
        Point2::new((p.x - self.cx) / self.fx, (p.y - self.cy) / self.fy)
    }

    /// Camera-frame point seen at `pixel` at depth `z`.
    pub fn back_project(&self, pixel: &Point2<f64>, z: f64) -> Vector3<f64> {
        let n = self.normalize(pixel);
        Vector3::new(n.x * z, n.y * z, z)
    }
}

/// Marker corners in the marker's own frame, on the unit square.
///
/// Winding matches the backend corner order: (-1, 1), (1, 1), (1, -1), (-1, -1).
const UNIT_CORNERS: [[f64; 2]; 4] = [[-1.0, 1.0], [1.0, 1.0], [1.0, -1.0], [-1.0, -1.0]];

/// Homography `H` with `dst ~ H * src` from exactly four correspondences.
fn homography_from_4pt(src: &[[f64; 2]; 4], dst: &[Point2<f64>; 4]) -> Option<Matrix3<f64>> {
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let [x, y] = src[k];
        let u = dst[k].x;
        let v = dst[k].y;

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let h = a.lu().solve(&b)?;
    Some(Matrix3::new(
        h[0], h[1], h[2], //
        h[3], h[4], h[5], //
        h[6], h[7], 1.0,
    ))
}

/// Estimate a marker's pose from its pixel corners.
///
/// `marker_size_m` is the outer edge length in meters. Returns `None` for
/// degenerate quads or solutions placing the marker behind the camera.
pub fn estimate_marker_pose(
    corners: &[Point2<f64>; 4],
    intrinsics: &CameraIntrinsics,
    marker_size_m: f64,
) -> Option<MarkerPose> {
    if !(marker_size_m.is_finite() && marker_size_m > 0.0) {
        return None;
    }
    let normalized = corners.map(|c| intrinsics.normalize(&c));
    let h_unit = homography_from_4pt(&UNIT_CORNERS, &normalized)?;

    // Marker-frame coordinates are the unit square scaled by half the edge.
    let half = marker_size_m / 2.0;
    let h1: Vector3<f64> = h_unit.column(0) / half;
    let h2: Vector3<f64> = h_unit.column(1) / half;
    let h3: Vector3<f64> = h_unit.column(2).into_owned();

    let n1 = h1.norm();
    let n2 = h2.norm();
    if n1 < 1e-12 || n2 < 1e-12 {
        return None;
    }
    let mut lambda = 2.0 / (n1 + n2);
    if h3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = h1 * lambda;
    let r2 = h2 * lambda;
    let r3 = r1.cross(&r2);
    let translation = h3 * lambda;

    let approx = Matrix3::from_columns(&[r1, r2, r3]);
    let svd = approx.svd(true, true);
    let mut u = svd.u?;
    let v_t = svd.v_t?;
    let mut rotation = u * v_t;
    if rotation.determinant() < 0.0 {
        let flipped = -u.column(2);
        u.set_column(2, &flipped);
        rotation = u * v_t;
    }

    let mut sq_err = 0.0;
    for (k, [x, y]) in UNIT_CORNERS.iter().enumerate() {
        let p = rotation * Vector3::new(x * half, y * half, 0.0) + translation;
        if p.z <= 0.0 {
            return None;
        }
        sq_err += (intrinsics.project(&p) - corners[k]).norm_squared();
    }

    Some(MarkerPose {
        rotation,
        translation,
        reprojection_error: (sq_err / 4.0).sqrt(),
    })
}
