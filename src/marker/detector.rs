//! Marker detector: the single per-frame call into the fiducial library.

use ndarray::ArrayView2;

use crate::config::DetectorConfig;
use crate::error::{ConfigError, Result, TrackingError};
use crate::frame::{Frame, dims};
use crate::marker::pose::{CameraIntrinsics, estimate_marker_pose};
use crate::marker::{DetectedMarker, RawMarker};

/// Trait for fiducial marker detection libraries.
///
/// Implement this trait to connect any marker library to the tracker.
///
/// # Example
///
/// ```ignore
/// use hybridtrack_rs::marker::{MarkerBackend, RawMarker};
/// use ndarray::ArrayView2;
///
/// struct MyLibrary {
///     // Your detector handle here
/// }
///
/// impl MarkerBackend for MyLibrary {
///     type Error = std::io::Error;
///
///     fn detect(&mut self, gray: ArrayView2<'_, u8>) -> Result<Vec<RawMarker>, Self::Error> {
///         // Run the library and convert its detections
///         Ok(vec![])
///     }
/// }
/// ```
pub trait MarkerBackend {
    /// Error type for backend failures. A frame with no markers is not a failure.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Detect markers in a grayscale frame (row-major, `height x width`).
    fn detect(
        &mut self,
        gray: ArrayView2<'_, u8>,
    ) -> std::result::Result<Vec<RawMarker>, Self::Error>;
}

impl<B: MarkerBackend + ?Sized> MarkerBackend for Box<B> {
    type Error = B::Error;

    fn detect(
        &mut self,
        gray: ArrayView2<'_, u8>,
    ) -> std::result::Result<Vec<RawMarker>, Self::Error> {
        (**self).detect(gray)
    }
}

/// Wraps a [`MarkerBackend`] with grayscale conversion and pose estimation.
///
/// Deterministic whenever the backend is: identical pixels and configuration
/// yield identical detection lists.
pub struct MarkerDetector<B: MarkerBackend> {
    backend: B,
    config: DetectorConfig,
}

impl<B: MarkerBackend> MarkerDetector<B> {
    /// Create a detector, rejecting invalid configuration up front.
    pub fn new(backend: B, config: DetectorConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { backend, config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Physical marker edge length in millimeters.
    pub fn tag_size_mm(&self) -> f64 {
        self.config.tag_size_mm
    }

    /// Intrinsics used for a frame of the given size.
    pub fn intrinsics_for(&self, width: usize, height: usize) -> CameraIntrinsics {
        self.config
            .intrinsics
            .unwrap_or_else(|| CameraIntrinsics::approximate(width, height))
    }

    /// Detect markers in a color or grayscale frame.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectedMarker>> {
        let gray = frame.to_gray();
        self.detect_gray(gray.view())
    }

    /// Detect markers in an already grayscale frame.
    pub fn detect_gray(&mut self, gray: ArrayView2<'_, u8>) -> Result<Vec<DetectedMarker>> {
        let (width, height) = dims(&gray);
        let raw = self.backend.detect(gray).map_err(TrackingError::detector)?;
        log::trace!("backend reported {} marker(s)", raw.len());

        let intrinsics = self.intrinsics_for(width, height);
        let size_m = self.config.tag_size_mm / 1000.0;
        let estimate_pose = self.config.estimate_pose;

        Ok(raw
            .into_iter()
            .map(|marker| {
                let pose = if estimate_pose {
                    estimate_marker_pose(&marker.corners, &intrinsics, size_m)
                } else {
                    None
                };
                DetectedMarker::from_raw(marker, pose)
            })
            .collect())
    }

    /// Get a reference to the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Get a mutable reference to the underlying backend.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
