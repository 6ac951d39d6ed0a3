//! TrackerPipeline for combining marker detection with hybrid tracking.

use std::collections::BTreeMap;

use nalgebra::Vector3;

use crate::config::TrackingConfig;
use crate::error::{ConfigError, Result};
use crate::frame::Frame;
use crate::marker::{DetectedMarker, MarkerBackend, MarkerDetector};
use crate::tracker::{
    FrameStamp, FrameUpdate, HybridTrackingResult, MultiMarkerAggregator, PoseEstimate,
    PositionRecord,
};

/// What one frame produced.
#[derive(Debug, Clone, Default)]
pub struct FrameOutput {
    /// Every detection in the frame
    pub detections: Vec<DetectedMarker>,
    /// Per-id results for tracked ids that were not lost
    pub results: BTreeMap<u32, HybridTrackingResult>,
    /// `None` when every tracked id was lost
    pub record: Option<PositionRecord>,
}

/// Bundles a [`MarkerDetector`] with a [`MultiMarkerAggregator`] and turns
/// each frame into a [`PositionRecord`].
pub struct TrackerPipeline<B: MarkerBackend> {
    detector: MarkerDetector<B>,
    aggregator: MultiMarkerAggregator,
    /// Mean marker depth from the last frame with a measured pose
    last_depth_mm: Option<f64>,
}

impl<B: MarkerBackend> TrackerPipeline<B> {
    /// Create a pipeline, validating the whole configuration up front.
    pub fn new(backend: B, config: &TrackingConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let detector = MarkerDetector::new(backend, config.detector.clone())?;
        let aggregator = MultiMarkerAggregator::new(&config.fallback, config.detector.tag_size_mm)?;
        Ok(Self::from_parts(detector, aggregator))
    }

    pub fn from_parts(detector: MarkerDetector<B>, aggregator: MultiMarkerAggregator) -> Self {
        Self {
            detector,
            aggregator,
            last_depth_mm: None,
        }
    }

    /// Replace the tracked id set.
    pub fn set_tracked_ids(&mut self, ids: impl IntoIterator<Item = u32>) {
        self.aggregator.set_tracked_ids(ids);
    }

    /// Detect, track and build this frame's record.
    pub fn process_frame(&mut self, frame: &Frame, stamp: FrameStamp) -> Result<FrameOutput> {
        let FrameUpdate {
            detections,
            results,
            aggregate,
        } = self.aggregator.update(&mut self.detector, frame)?;

        let record = aggregate.map(|aggregate| {
            let pose = self.pose_estimate(&results, frame, &aggregate.center);
            PositionRecord::new(stamp, &aggregate).with_pose(pose)
        });

        Ok(FrameOutput {
            detections,
            results,
            record,
        })
    }

    /// Mean measured pose over marker-sourced ids, or a derived estimate at
    /// the last measured depth.
    fn pose_estimate(
        &mut self,
        results: &BTreeMap<u32, HybridTrackingResult>,
        frame: &Frame,
        center: &nalgebra::Point2<f64>,
    ) -> Option<PoseEstimate> {
        let poses: Vec<_> = results
            .values()
            .filter_map(|r| r.marker.as_ref()?.pose)
            .collect();

        if !poses.is_empty() {
            let n = poses.len() as f64;
            let position_mm = poses
                .iter()
                .fold(Vector3::zeros(), |acc, p| acc + p.translation_mm())
                / n;
            let error = poses.iter().map(|p| p.reprojection_error).sum::<f64>() / n;
            self.last_depth_mm = Some(position_mm.z);
            return Some(PoseEstimate {
                position_mm,
                reprojection_error: Some(error),
                derived: false,
            });
        }

        let depth = self.last_depth_mm?;
        let intrinsics = self.detector.intrinsics_for(frame.width(), frame.height());
        Some(PoseEstimate {
            position_mm: intrinsics.back_project(center, depth),
            reprojection_error: None,
            derived: true,
        })
    }

    pub fn last_depth_mm(&self) -> Option<f64> {
        self.last_depth_mm
    }

    /// Get a reference to the underlying detector.
    pub fn detector(&self) -> &MarkerDetector<B> {
        &self.detector
    }

    /// Get a mutable reference to the underlying detector.
    pub fn detector_mut(&mut self) -> &mut MarkerDetector<B> {
        &mut self.detector
    }

    /// Get a reference to the underlying aggregator.
    pub fn aggregator(&self) -> &MultiMarkerAggregator {
        &self.aggregator
    }

    /// Get a mutable reference to the underlying aggregator.
    pub fn aggregator_mut(&mut self) -> &mut MultiMarkerAggregator {
        &mut self.aggregator
    }
}
