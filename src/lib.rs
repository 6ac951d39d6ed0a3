//! Hybrid fiducial-marker and appearance tracking.
//!
//! Markers detected in a frame are treated as ground truth. While a marker is
//! hidden, an appearance tracker follows the pixels captured at its last
//! detection, with confidence decaying until the id is declared lost.

pub mod calibration;
pub mod config;
pub mod error;
pub mod frame;
pub mod integration;
pub mod marker;
pub mod tracker;

#[cfg(test)]
mod test_utils;

pub use calibration::CalibrationData;
pub use config::{DetectorConfig, FallbackConfig, SessionConfig, TrackingConfig};
pub use error::{ConfigError, Result, TrackingError};
pub use frame::Frame;
pub use integration::{RecordingSession, TrackerPipeline};
pub use marker::{DetectedMarker, MarkerBackend, MarkerDetector};
pub use tracker::{HybridTrackingState, MultiMarkerAggregator, PositionRecord, TrackingSource};
