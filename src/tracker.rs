//! Hybrid marker/appearance tracking.
//!
//! Each tracked marker id owns a [`HybridTrackingState`] that treats marker
//! detections as ground truth and falls back to an [`AppearanceTracker`]
//! while the marker is missing. The [`MultiMarkerAggregator`] runs one state
//! per id and merges them into a single position per frame.

mod aggregator;
mod appearance;
mod correlation;
mod hybrid;
mod record;
mod rect;
mod template;
mod track_state;

pub use aggregator::{AggregatePosition, FrameUpdate, MultiMarkerAggregator};
pub use appearance::{AppearanceParams, AppearanceTracker, AppearanceTrackerHandle};
pub use correlation::{
    CorrelationTracker, has_native_correlation_tracker, native_correlation_tracker,
};
pub use hybrid::{HybridParams, HybridTrackingResult, HybridTrackingState};
pub use record::{FrameStamp, PoseEstimate, PositionRecord};
pub use rect::Rect;
pub use template::{TemplateMatch, match_template};
pub use track_state::TrackingSource;

#[cfg(feature = "correlation-tracker")]
pub use correlation::NccCorrelationTracker;
