//! Multi-marker aggregation: one detector pass per frame, one state machine
//! per tracked id, one merged position.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::Point2;
use ndarray::ArrayView2;

use crate::calibration::mm_per_pixel_from_markers;
use crate::config::FallbackConfig;
use crate::error::{ConfigError, Result};
use crate::frame::Frame;
use crate::marker::{DetectedMarker, MarkerBackend, MarkerDetector};
use crate::tracker::hybrid::{HybridParams, HybridTrackingResult, HybridTrackingState};
use crate::tracker::track_state::TrackingSource;

/// Merged position of every id with a result this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatePosition {
    /// Mean of the contributing centers
    pub center: Point2<f64>,
    /// `Marker` if any contributing id was detected, else `Fallback`
    pub source: TrackingSource,
    /// Mean of the contributing confidences
    pub confidence: f64,
    /// Scale in effect after this frame
    pub mm_per_pixel: Option<f64>,
    /// Contributing ids and their sources
    pub contributing: BTreeMap<u32, TrackingSource>,
}

/// Everything one frame produced.
#[derive(Debug, Clone, Default)]
pub struct FrameUpdate {
    /// Every detection in the frame, tracked or not
    pub detections: Vec<DetectedMarker>,
    /// Results for tracked ids that were not lost
    pub results: BTreeMap<u32, HybridTrackingResult>,
    /// `None` when every tracked id is lost
    pub aggregate: Option<AggregatePosition>,
}

impl FrameUpdate {
    pub fn is_lost(&self) -> bool {
        self.aggregate.is_none()
    }
}

/// Runs a [`HybridTrackingState`] for every tracked id and merges the results.
#[derive(Debug)]
pub struct MultiMarkerAggregator {
    states: BTreeMap<u32, HybridTrackingState>,
    tracked_ids: BTreeSet<u32>,
    params: HybridParams,
    max_fallback_frames: u32,
    tag_size_mm: f64,
    mm_per_pixel: Option<f64>,
}

impl MultiMarkerAggregator {
    /// Create an aggregator for markers `tag_size_mm` wide.
    pub fn new(
        config: &FallbackConfig,
        tag_size_mm: f64,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        if !tag_size_mm.is_finite() || tag_size_mm <= 0.0 {
            return Err(ConfigError::InvalidMarkerSize(tag_size_mm));
        }
        Ok(Self {
            states: BTreeMap::new(),
            tracked_ids: BTreeSet::new(),
            params: HybridParams::from_config(config),
            max_fallback_frames: config.max_fallback_frames,
            tag_size_mm,
            mm_per_pixel: None,
        })
    }

    /// Replace the tracked set. States of ids no longer tracked are dropped.
    pub fn set_tracked_ids(&mut self, ids: impl IntoIterator<Item = u32>) {
        self.tracked_ids = ids.into_iter().collect();
        self.states.retain(|id, _| self.tracked_ids.contains(id));
        self.ensure_states();
    }

    /// Start tracking one more id.
    pub fn track(&mut self, id: u32) {
        self.tracked_ids.insert(id);
        self.ensure_states();
    }

    pub fn untrack(&mut self, id: u32) {
        self.tracked_ids.remove(&id);
        self.states.remove(&id);
    }

    /// Reset one id's state, as if it had never been seen.
    pub fn retrack(&mut self, id: u32) {
        if let Some(state) = self.states.get_mut(&id) {
            log::debug!("marker {id}: retracking");
            state.reset();
        }
    }

    /// Reset every tracked id.
    pub fn retrack_all(&mut self) {
        self.states.values_mut().for_each(HybridTrackingState::reset);
    }

    /// Drop every tracked id, its state, and the learned scale.
    pub fn clear(&mut self) {
        self.tracked_ids.clear();
        self.states.clear();
        self.mm_per_pixel = None;
    }

    pub fn tracked_ids(&self) -> &BTreeSet<u32> {
        &self.tracked_ids
    }

    pub fn state(&self, id: u32) -> Option<&HybridTrackingState> {
        self.states.get(&id)
    }

    pub fn states(&self) -> impl Iterator<Item = (&u32, &HybridTrackingState)> {
        self.states.iter()
    }

    /// Last scale measured from marker geometry.
    pub fn mm_per_pixel(&self) -> Option<f64> {
        self.mm_per_pixel
    }

    pub fn tag_size_mm(&self) -> f64 {
        self.tag_size_mm
    }

    pub fn params(&self) -> &HybridParams {
        &self.params
    }

    /// Detect once in `frame` and advance every tracked id.
    pub fn update<B: MarkerBackend>(
        &mut self,
        detector: &mut MarkerDetector<B>,
        frame: &Frame,
    ) -> Result<FrameUpdate> {
        let gray = frame.to_gray();
        let detections = detector.detect_gray(gray.view())?;
        Ok(self.update_with_detections(gray.view(), detections))
    }

    /// Advance every tracked id using a frame's detections.
    pub fn update_with_detections(
        &mut self,
        gray: ArrayView2<'_, u8>,
        detections: Vec<DetectedMarker>,
    ) -> FrameUpdate {
        self.ensure_states();

        let mut best: BTreeMap<u32, &DetectedMarker> = BTreeMap::new();
        for det in &detections {
            best.entry(det.id)
                .and_modify(|b| {
                    if det.decision_margin > b.decision_margin {
                        *b = det;
                    }
                })
                .or_insert(det);
        }

        let mut results = BTreeMap::new();
        for (&id, state) in self.states.iter_mut() {
            if let Some(result) = state.update_with(gray, best.get(&id).copied(), &self.params) {
                results.insert(id, result);
            }
        }

        let measured = results.values().filter_map(|r| r.marker.as_ref());
        if let Some(scale) = mm_per_pixel_from_markers(measured, self.tag_size_mm) {
            self.mm_per_pixel = Some(scale);
        }

        let aggregate = self.aggregate(&results);
        if aggregate.is_none() && !self.tracked_ids.is_empty() {
            log::trace!("all {} tracked id(s) lost this frame", self.tracked_ids.len());
        }

        FrameUpdate {
            detections,
            results,
            aggregate,
        }
    }

    fn aggregate(
        &self,
        results: &BTreeMap<u32, HybridTrackingResult>,
    ) -> Option<AggregatePosition> {
        if results.is_empty() {
            return None;
        }
        let n = results.len() as f64;
        let (sum, confidence) = results
            .values()
            .fold((nalgebra::Vector2::zeros(), 0.0), |(sum, conf), r| {
                (sum + r.center.coords, conf + r.confidence)
            });
        let source = if results.values().any(|r| r.source == TrackingSource::Marker) {
            TrackingSource::Marker
        } else {
            TrackingSource::Fallback
        };

        Some(AggregatePosition {
            center: Point2::from(sum / n),
            source,
            confidence: confidence / n,
            mm_per_pixel: self.mm_per_pixel,
            contributing: results.iter().map(|(&id, r)| (id, r.source)).collect(),
        })
    }

    fn ensure_states(&mut self) {
        for &id in &self.tracked_ids {
            self.states
                .entry(id)
                .or_insert_with(|| HybridTrackingState::new(id, self.max_fallback_frames));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::MarkerBuilder;
    use crate::test_utils::frame_with_patch;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn marker(id: u32, cx: f64, cy: f64, side: f64) -> DetectedMarker {
        DetectedMarker::from_raw(MarkerBuilder::new().id(id).square(cx, cy, side).build(), None)
    }

    fn aggregator(max_fallback_frames: u32) -> MultiMarkerAggregator {
        let config = FallbackConfig {
            max_fallback_frames,
            ..FallbackConfig::default()
        };
        MultiMarkerAggregator::new(&config, 11.1).unwrap()
    }

    #[test]
    fn test_rejects_invalid_setup() {
        assert_eq!(
            MultiMarkerAggregator::new(&FallbackConfig::default(), 0.0).unwrap_err(),
            ConfigError::InvalidMarkerSize(0.0)
        );
        let config = FallbackConfig {
            max_fallback_frames: 0,
            ..FallbackConfig::default()
        };
        assert!(MultiMarkerAggregator::new(&config, 11.1).is_err());
    }

    #[test]
    fn test_mean_of_marker_centers_and_scale() {
        let frame = frame_with_patch(200, 120, &[(50, 60, 30, 1), (150, 60, 30, 2)]);
        let mut agg = aggregator(30);
        agg.set_tracked_ids([1, 2]);

        let update = agg.update_with_detections(
            frame.view(),
            vec![
                marker(1, 50.0, 60.0, 20.0),
                marker(2, 150.0, 60.0, 30.0),
                marker(8, 10.0, 10.0, 5.0),
            ],
        );
        let aggregate = update.aggregate.unwrap();
        assert_eq!(aggregate.center, Point2::new(100.0, 60.0));
        assert_eq!(aggregate.source, TrackingSource::Marker);
        assert_eq!(aggregate.confidence, 1.0);
        assert_relative_eq!(aggregate.mm_per_pixel.unwrap(), 11.1 / 25.0);
        assert_eq!(update.detections.len(), 3);
        assert!(!update.results.contains_key(&8));
    }

    #[test]
    fn test_scale_held_on_fallback_frames() {
        let frame = frame_with_patch(200, 120, &[(50, 60, 30, 3)]);
        let mut agg = aggregator(30);
        agg.track(1);
        agg.update_with_detections(frame.view(), vec![marker(1, 50.0, 60.0, 20.0)]);
        let scale = agg.mm_per_pixel().unwrap();

        for _ in 0..5 {
            let update = agg.update_with_detections(frame.view(), vec![]);
            let aggregate = update.aggregate.unwrap();
            assert_eq!(aggregate.source, TrackingSource::Fallback);
            assert_eq!(aggregate.mm_per_pixel.unwrap().to_bits(), scale.to_bits());
        }
    }

    #[test]
    fn test_lost_id_leaves_the_mean() {
        let frame = frame_with_patch(200, 120, &[(50, 60, 30, 4)]);
        let blank = Array2::from_elem((120, 200), 100u8);
        let mut agg = aggregator(2);
        agg.set_tracked_ids([1, 2]);
        let detections = vec![marker(1, 50.0, 60.0, 20.0), marker(2, 150.0, 60.0, 20.0)];
        agg.update_with_detections(frame.view(), detections);

        // Id 2 vanishes; only grace holds keep it around on a frame without its texture.
        let update = agg.update_with_detections(blank.view(), vec![marker(1, 50.0, 60.0, 20.0)]);
        assert_eq!(update.aggregate.unwrap().center, Point2::new(100.0, 60.0));

        let update = agg.update_with_detections(blank.view(), vec![marker(1, 50.0, 60.0, 20.0)]);
        assert_eq!(update.aggregate.as_ref().unwrap().center, Point2::new(100.0, 60.0));

        let update = agg.update_with_detections(blank.view(), vec![marker(1, 50.0, 60.0, 20.0)]);
        let aggregate = update.aggregate.unwrap();
        assert_eq!(aggregate.center, Point2::new(50.0, 60.0));
        assert_eq!(aggregate.contributing.len(), 1);
        assert!(agg.state(2).unwrap().is_tracking_lost());
    }

    #[test]
    fn test_all_lost_emits_nothing() {
        let blank = Array2::from_elem((120, 200), 100u8);
        let mut agg = aggregator(30);
        agg.track(5);
        let update = agg.update_with_detections(blank.view(), vec![]);
        assert!(update.is_lost());
        assert!(update.results.is_empty());
        assert_eq!(agg.mm_per_pixel(), None);
    }

    #[test]
    fn test_retrack_and_clear() {
        let frame = frame_with_patch(200, 120, &[(50, 60, 30, 5)]);
        let mut agg = aggregator(30);
        agg.set_tracked_ids([1, 3]);
        agg.update_with_detections(frame.view(), vec![marker(1, 50.0, 60.0, 20.0)]);
        assert!(agg.state(1).unwrap().fallback_initialized());

        agg.retrack(1);
        assert!(!agg.state(1).unwrap().fallback_initialized());

        agg.set_tracked_ids([3]);
        assert!(agg.state(1).is_none());

        agg.clear();
        assert!(agg.tracked_ids().is_empty());
        assert_eq!(agg.mm_per_pixel(), None);
    }
}
