//! Trajectory rows handed to the recorder.

use std::collections::BTreeMap;

use nalgebra::{Point2, Vector3};
use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationData;
use crate::tracker::aggregator::AggregatePosition;
use crate::tracker::track_state::TrackingSource;

/// Where a frame sits in the recording.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStamp {
    /// Index assigned by the session, monotonically increasing
    pub frame_index: u64,
    /// Seconds since the session started
    pub time_s: f64,
    /// Index reported by the frame source, if it tracks one
    pub video_frame: Option<u64>,
}

impl FrameStamp {
    pub fn new(frame_index: u64, time_s: f64) -> Self {
        Self {
            frame_index,
            time_s,
            video_frame: None,
        }
    }

    pub fn with_video_frame(mut self, video_frame: Option<u64>) -> Self {
        self.video_frame = video_frame;
        self
    }
}

/// Camera-frame marker position attached to a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseEstimate {
    /// Position in millimeters
    pub position_mm: Vector3<f64>,
    /// Mean reprojection error in pixels; absent for derived estimates
    pub reprojection_error: Option<f64>,
    /// Back-projected from the pixel position at a remembered depth rather
    /// than measured from marker corners
    pub derived: bool,
}

/// One row of the exported trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub frame_index: u64,
    pub time_s: f64,
    /// Aggregate pixel position
    pub raw_x: f64,
    pub raw_y: f64,
    /// Scale in effect for this frame; `None` until a marker has been measured
    pub mm_per_pixel: Option<f64>,
    /// `marker` when any contributing id was detected this frame
    pub tracking_source: TrackingSource,
    /// Mean confidence across contributing ids
    pub tracking_confidence: f64,
    pub tags_tracked: usize,
    /// Contributing ids, ascending
    pub tag_ids: Vec<u32>,
    pub tag_sources: BTreeMap<u32, TrackingSource>,
    pub pose_x_mm: Option<f64>,
    pub pose_y_mm: Option<f64>,
    pub pose_z_mm: Option<f64>,
    pub pose_err: Option<f64>,
    #[serde(default)]
    pub pose_derived: bool,
    pub video_frame: Option<u64>,
}

impl PositionRecord {
    /// Build a record from a frame's aggregate, without pose.
    pub fn new(stamp: FrameStamp, aggregate: &AggregatePosition) -> Self {
        Self {
            frame_index: stamp.frame_index,
            time_s: stamp.time_s,
            raw_x: aggregate.center.x,
            raw_y: aggregate.center.y,
            mm_per_pixel: aggregate.mm_per_pixel,
            tracking_source: aggregate.source,
            tracking_confidence: aggregate.confidence,
            tags_tracked: aggregate.contributing.len(),
            tag_ids: aggregate.contributing.keys().copied().collect(),
            tag_sources: aggregate.contributing.clone(),
            pose_x_mm: None,
            pose_y_mm: None,
            pose_z_mm: None,
            pose_err: None,
            pose_derived: false,
            video_frame: stamp.video_frame,
        }
    }

    pub fn with_pose(mut self, pose: Option<PoseEstimate>) -> Self {
        if let Some(pose) = pose {
            self.pose_x_mm = Some(pose.position_mm.x);
            self.pose_y_mm = Some(pose.position_mm.y);
            self.pose_z_mm = Some(pose.position_mm.z);
            self.pose_err = pose.reprojection_error;
            self.pose_derived = pose.derived;
        }
        self
    }

    pub fn position_px(&self) -> Point2<f64> {
        Point2::new(self.raw_x, self.raw_y)
    }

    /// Pixel position scaled to millimeters, when a scale is known.
    pub fn position_mm(&self) -> Option<Point2<f64>> {
        self.mm_per_pixel.map(|s| Point2::new(self.raw_x * s, self.raw_y * s))
    }

    /// Signed position along a manually calibrated axis, in millimeters.
    pub fn position_on_axis_mm(&self, calibration: &CalibrationData) -> f64 {
        calibration.project_to_axis(self.position_px())
    }

    pub fn pose_mm(&self) -> Option<Vector3<f64>> {
        Some(Vector3::new(self.pose_x_mm?, self.pose_y_mm?, self.pose_z_mm?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregate() -> AggregatePosition {
        AggregatePosition {
            center: Point2::new(40.0, 10.0),
            source: TrackingSource::Fallback,
            confidence: 0.75,
            mm_per_pixel: Some(0.5),
            contributing: BTreeMap::from([
                (9, TrackingSource::Fallback),
                (2, TrackingSource::Fallback),
            ]),
        }
    }

    #[test]
    fn test_record_from_aggregate() {
        let stamp = FrameStamp::new(12, 0.4).with_video_frame(Some(120));
        let record = PositionRecord::new(stamp, &aggregate());
        assert_eq!(record.frame_index, 12);
        assert_eq!(record.tags_tracked, 2);
        assert_eq!(record.tag_ids, vec![2, 9]);
        assert_eq!(record.video_frame, Some(120));
        assert_eq!(record.position_mm(), Some(Point2::new(20.0, 5.0)));
        assert_eq!(record.pose_mm(), None);
        assert!(!record.pose_derived);
    }

    #[test]
    fn test_with_pose_and_axis() {
        let pose = PoseEstimate {
            position_mm: Vector3::new(1.0, 2.0, 300.0),
            reprojection_error: None,
            derived: true,
        };
        let record =
            PositionRecord::new(FrameStamp::new(0, 0.0), &aggregate()).with_pose(Some(pose));
        assert_eq!(record.pose_mm(), Some(Vector3::new(1.0, 2.0, 300.0)));
        assert!(record.pose_derived);

        let cal =
            CalibrationData::new(Point2::new(0.0, 10.0), Point2::new(100.0, 10.0), 50.0).unwrap();
        assert_eq!(record.position_on_axis_mm(&cal), 20.0);
    }

    #[test]
    fn test_json_shape() {
        let record = PositionRecord::new(FrameStamp::new(3, 0.1), &aggregate());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["tracking_source"], "fallback");
        assert_eq!(value["tag_sources"]["9"], "fallback");
        assert!(value["pose_x_mm"].is_null());
    }
}
