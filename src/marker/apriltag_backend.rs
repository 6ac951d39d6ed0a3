//! AprilTag detection backend.
//!
//! This module provides an `AprilTagBackend` that implements `MarkerBackend`
//! on top of the reference AprilTag library through the `apriltag` crate.
//!
//! # Example
//!
//! ```ignore
//! use hybridtrack_rs::config::DetectorConfig;
//! use hybridtrack_rs::marker::{AprilTagBackend, MarkerDetector};
//!
//! let config = DetectorConfig::default();
//! let backend = AprilTagBackend::new(&config)?;
//! let detector = MarkerDetector::new(backend, config)?;
//! ```

use apriltag::{Detector, DetectorBuilder, Family, Image};
use ndarray::ArrayView2;

use crate::config::DetectorConfig;
use crate::error::ConfigError;
use crate::marker::{MarkerBackend, MarkerBuilder, RawMarker};

/// Error type for AprilTag detection failures.
#[derive(Debug, thiserror::Error)]
pub enum AprilTagBackendError {
    /// The library could not allocate an image of the frame's size.
    #[error("cannot allocate a {width}x{height} detector image")]
    ImageAllocation { width: usize, height: usize },
}

/// AprilTag detector configured from a [`DetectorConfig`].
pub struct AprilTagBackend {
    detector: Detector,
}

impl AprilTagBackend {
    /// Build a detector for the configured family and tuning knobs.
    pub fn new(config: &DetectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let family: Family = config
            .family
            .parse()
            .map_err(|_| ConfigError::UnknownFamily(config.family.clone()))?;

        let mut detector = DetectorBuilder::new()
            .add_family_bits(family, 1)
            .build()
            .map_err(|_| ConfigError::UnknownFamily(config.family.clone()))?;

        detector.set_thread_number(config.nthreads.min(u8::MAX as usize) as u8);
        detector.set_decimation(config.quad_decimate);
        detector.set_sigma(config.quad_sigma);
        detector.set_refine_edges(config.refine_edges);
        detector.set_shapening(config.decode_sharpening);

        Ok(Self { detector })
    }
}

impl MarkerBackend for AprilTagBackend {
    type Error = AprilTagBackendError;

    fn detect(&mut self, gray: ArrayView2<'_, u8>) -> Result<Vec<RawMarker>, Self::Error> {
        let (height, width) = gray.dim();
        let mut image = Image::zeros_with_stride(width, height, width)
            .ok_or(AprilTagBackendError::ImageAllocation { width, height })?;
        for ((y, x), &value) in gray.indexed_iter() {
            image[(x, y)] = value;
        }

        Ok(self
            .detector
            .detect(&image)
            .into_iter()
            .map(|det| {
                let [cx, cy] = det.center();
                MarkerBuilder::new()
                    .id(det.id() as u32)
                    .corner_array(det.corners())
                    .center(cx, cy)
                    .decision_margin(det.decision_margin())
                    .hamming(det.hamming() as u32)
                    .build()
            })
            .collect())
    }
}
