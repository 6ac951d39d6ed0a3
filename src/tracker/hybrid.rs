//! Per-marker hybrid state machine: marker detections as ground truth,
//! appearance tracking in between.

use nalgebra::Point2;
use ndarray::{Array2, ArrayView2};

use crate::config::FallbackConfig;
use crate::marker::DetectedMarker;
use crate::tracker::appearance::{AppearanceParams, AppearanceTracker};
use crate::tracker::rect::Rect;
use crate::tracker::track_state::TrackingSource;

/// Floor for every fallback confidence.
const MIN_CONFIDENCE: f64 = 0.1;

/// State machine options shared by every tracked id.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridParams {
    /// Growth of the appearance box on each side, as a fraction of the quad extent
    pub bbox_padding: f64,
    /// Frames after a marker loss during which the last marker position is held
    pub grace_frames: u32,
    pub appearance: AppearanceParams,
}

impl HybridParams {
    pub fn from_config(config: &FallbackConfig) -> Self {
        Self {
            bbox_padding: config.bbox_padding,
            grace_frames: config.grace_frames,
            appearance: AppearanceParams::resolve(config),
        }
    }
}

impl Default for HybridParams {
    fn default() -> Self {
        Self::from_config(&FallbackConfig::default())
    }
}

/// One id's position estimate for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridTrackingResult {
    pub center: Point2<f64>,
    pub source: TrackingSource,
    /// The detection, when `source` is [`TrackingSource::Marker`]
    pub marker: Option<DetectedMarker>,
    /// 1.0 for marker results, decaying toward 0.1 during fallback
    pub confidence: f64,
}

/// Tracking state for one marker id, persisting across frames.
#[derive(Debug)]
pub struct HybridTrackingState {
    tracked_id: u32,
    fallback: Option<AppearanceTracker>,
    last_marker_center: Option<Point2<f64>>,
    frames_since_marker: u32,
    max_fallback_frames: u32,
    last_source: TrackingSource,
    appearance_inits: u64,
}

impl HybridTrackingState {
    pub fn new(tracked_id: u32, max_fallback_frames: u32) -> Self {
        Self {
            tracked_id,
            fallback: None,
            last_marker_center: None,
            frames_since_marker: 0,
            max_fallback_frames,
            last_source: TrackingSource::Lost,
            appearance_inits: 0,
        }
    }

    /// Forget everything learned about the marker.
    pub fn reset(&mut self) {
        self.fallback = None;
        self.last_marker_center = None;
        self.frames_since_marker = 0;
        self.last_source = TrackingSource::Lost;
    }

    pub fn tracked_id(&self) -> u32 {
        self.tracked_id
    }

    /// Whether the fallback ceiling has been passed.
    pub fn is_tracking_lost(&self) -> bool {
        self.frames_since_marker > self.max_fallback_frames
    }

    /// Whether an appearance tracker is ready for the next fallback frame.
    pub fn fallback_initialized(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn fallback(&self) -> Option<&AppearanceTracker> {
        self.fallback.as_ref()
    }

    /// Grayscale patch captured at the last marker detection.
    pub fn template_image(&self) -> Option<&Array2<u8>> {
        self.fallback.as_ref().map(AppearanceTracker::template)
    }

    pub fn last_bbox(&self) -> Option<Rect> {
        self.fallback.as_ref().map(AppearanceTracker::last_bbox)
    }

    pub fn last_marker_center(&self) -> Option<Point2<f64>> {
        self.last_marker_center
    }

    pub fn frames_since_marker(&self) -> u32 {
        self.frames_since_marker
    }

    pub fn max_fallback_frames(&self) -> u32 {
        self.max_fallback_frames
    }

    pub fn last_source(&self) -> TrackingSource {
        self.last_source
    }

    /// Number of appearance tracker (re)initializations attempted so far.
    pub fn appearance_inits(&self) -> u64 {
        self.appearance_inits
    }

    /// Advance one frame given every detection in the frame.
    ///
    /// When the id appears more than once, the detection with the highest
    /// decision margin wins.
    pub fn update(
        &mut self,
        gray: ArrayView2<'_, u8>,
        detections: &[DetectedMarker],
        params: &HybridParams,
    ) -> Option<HybridTrackingResult> {
        let marker = detections
            .iter()
            .filter(|d| d.id == self.tracked_id)
            .max_by(|a, b| a.decision_margin.total_cmp(&b.decision_margin));
        self.update_with(gray, marker, params)
    }

    /// Advance one frame given this id's detection, if any.
    pub fn update_with(
        &mut self,
        gray: ArrayView2<'_, u8>,
        marker: Option<&DetectedMarker>,
        params: &HybridParams,
    ) -> Option<HybridTrackingResult> {
        let result = match marker {
            Some(marker) => Some(self.on_marker(gray, marker, params)),
            None => self.on_missing(gray, params),
        };
        let source = result.as_ref().map_or(TrackingSource::Lost, |r| r.source);
        if source != self.last_source {
            log::debug!(
                "marker {}: {} -> {} ({} frame(s) since marker)",
                self.tracked_id,
                self.last_source,
                source,
                self.frames_since_marker
            );
        }
        self.last_source = source;
        result
    }

    fn on_marker(
        &mut self,
        gray: ArrayView2<'_, u8>,
        marker: &DetectedMarker,
        params: &HybridParams,
    ) -> HybridTrackingResult {
        self.last_marker_center = Some(marker.center);
        self.frames_since_marker = 0;

        // Always recapture so fallback follows the freshest pixels.
        let bbox = Rect::around_quad(&marker.corners, params.bbox_padding);
        self.fallback = AppearanceTracker::init(gray, bbox, &params.appearance);
        self.appearance_inits += 1;

        HybridTrackingResult {
            center: marker.center,
            source: TrackingSource::Marker,
            marker: Some(marker.clone()),
            confidence: 1.0,
        }
    }

    fn on_missing(
        &mut self,
        gray: ArrayView2<'_, u8>,
        params: &HybridParams,
    ) -> Option<HybridTrackingResult> {
        if self.is_tracking_lost() {
            return None;
        }
        self.frames_since_marker += 1;
        if self.is_tracking_lost() {
            return None;
        }

        let frames = self.frames_since_marker as f64;
        if let Some(center) = self.fallback.as_mut().and_then(|t| t.update(gray)) {
            let confidence = (1.0 - frames / self.max_fallback_frames as f64).max(MIN_CONFIDENCE);
            return Some(HybridTrackingResult {
                center,
                source: TrackingSource::Fallback,
                marker: None,
                confidence,
            });
        }

        if self.frames_since_marker <= params.grace_frames {
            let center = self.last_marker_center?;
            return Some(HybridTrackingResult {
                center,
                source: TrackingSource::Fallback,
                marker: None,
                confidence: (0.5 - frames * 0.1).max(MIN_CONFIDENCE),
            });
        }

        None
    }
}
