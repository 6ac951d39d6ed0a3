//! Fiducial marker detection.
//!
//! The [`MarkerDetector`] wraps any fiducial library implementing
//! [`MarkerBackend`], converting frames to grayscale, normalizing the
//! library's output into [`DetectedMarker`]s and estimating a pose per marker
//! when the physical marker size is known.

mod builder;
mod detector;
mod pose;
mod types;

pub use builder::MarkerBuilder;
pub use detector::{MarkerBackend, MarkerDetector};
pub use pose::{CameraIntrinsics, estimate_marker_pose};
pub use types::{DetectedMarker, MarkerPose, RawMarker};

#[cfg(feature = "apriltag-backend")]
mod apriltag_backend;

#[cfg(feature = "apriltag-backend")]
pub use apriltag_backend::{AprilTagBackend, AprilTagBackendError};
