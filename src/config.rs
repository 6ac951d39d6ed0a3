//! Tracking configuration, supplied at session start.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::marker::CameraIntrinsics;

/// Top-level configuration for a tracking session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Marker detector options
    pub detector: DetectorConfig,
    /// Appearance-tracker fallback options
    pub fallback: FallbackConfig,
    /// Recording session options
    pub session: SessionConfig,
}

/// Fiducial detector options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Marker family / dictionary name, e.g. `tagStandard41h12`.
    pub family: String,
    /// Worker threads used by the detection backend.
    pub nthreads: usize,
    /// Decimation applied before quad detection; 1.0 is full resolution.
    pub quad_decimate: f32,
    /// Gaussian blur sigma applied before quad detection; 0 disables it.
    pub quad_sigma: f32,
    /// Snap quad edges to strong gradients for better corner accuracy.
    pub refine_edges: bool,
    /// Sharpening applied to decoded bit samples.
    pub decode_sharpening: f64,
    /// Physical marker edge length (outer edge to outer edge) in mm.
    pub tag_size_mm: f64,
    /// Estimate a 6-DoF pose per marker.
    pub estimate_pose: bool,
    /// Camera intrinsics; approximated from frame dimensions when absent.
    pub intrinsics: Option<CameraIntrinsics>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            family: "tagStandard41h12".to_string(),
            nthreads: 4,
            quad_decimate: 1.0,
            quad_sigma: 4.0,
            refine_edges: true,
            decode_sharpening: 0.25,
            tag_size_mm: 11.1,
            estimate_pose: true,
            intrinsics: None,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(self.tag_size_mm.is_finite() && self.tag_size_mm > 0.0) {
            return Err(ConfigError::InvalidMarkerSize(self.tag_size_mm));
        }
        if self.family.trim().is_empty() {
            return Err(ConfigError::UnknownFamily(self.family.clone()));
        }
        if self.nthreads == 0 {
            return Err(detector_option("nthreads", "must be at least 1"));
        }
        if !(self.quad_decimate.is_finite() && self.quad_decimate >= 1.0) {
            return Err(detector_option("quad_decimate", "must be >= 1.0"));
        }
        if !(self.quad_sigma.is_finite() && self.quad_sigma >= 0.0) {
            return Err(detector_option("quad_sigma", "must be >= 0.0"));
        }
        if !(self.decode_sharpening.is_finite() && self.decode_sharpening >= 0.0) {
            return Err(detector_option("decode_sharpening", "must be >= 0.0"));
        }
        if let Some(k) = &self.intrinsics {
            k.validate()?;
        }
        Ok(())
    }
}

fn detector_option(name: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidDetectorOption {
        name,
        reason: reason.to_string(),
    }
}

/// Options for the per-marker fallback tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Padding around the marker quad for the appearance box (0.3 = 30% per side).
    pub bbox_padding: f64,
    /// Frames without a marker after which the id is declared lost.
    pub max_fallback_frames: u32,
    /// Frames during which the last marker position may be held.
    pub grace_frames: u32,
    /// Use the native correlation tracker when it is compiled in.
    pub use_correlation_tracker: bool,
    /// Smallest appearance box accepted at initialization, in pixels.
    pub min_init_size: usize,
    /// Smallest box accepted from the correlation tracker, in pixels.
    pub min_track_size: usize,
    /// Normalized correlation a template match must exceed.
    pub match_threshold: f32,
    /// Template-search margin as a multiple of the template's larger side.
    pub search_margin_factor: f32,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            bbox_padding: 0.3,
            max_fallback_frames: 30,
            grace_frames: 3,
            use_correlation_tracker: true,
            min_init_size: 10,
            min_track_size: 5,
            match_threshold: 0.5,
            search_margin_factor: 8.0,
        }
    }
}

impl FallbackConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(self.bbox_padding.is_finite() && self.bbox_padding >= 0.0) {
            return Err(ConfigError::InvalidPadding(self.bbox_padding));
        }
        if self.max_fallback_frames == 0 {
            return Err(ConfigError::ZeroFallbackCeiling);
        }
        if self.min_init_size == 0 {
            return Err(fallback_option("min_init_size", "must be at least 1"));
        }
        if self.min_track_size == 0 {
            return Err(fallback_option("min_track_size", "must be at least 1"));
        }
        if !(self.match_threshold.is_finite() && (-1.0..1.0).contains(&self.match_threshold)) {
            return Err(fallback_option("match_threshold", "must lie in [-1, 1)"));
        }
        if !(self.search_margin_factor.is_finite() && self.search_margin_factor > 0.0) {
            return Err(fallback_option("search_margin_factor", "must be positive"));
        }
        Ok(())
    }
}

fn fallback_option(name: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidFallbackOption {
        name,
        reason: reason.to_string(),
    }
}

/// Options for the recording worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Minimum interval between published status snapshots, in milliseconds.
    pub status_interval_ms: u64,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
    /// Nominal source frame rate; timestamps follow wall-clock time when absent.
    pub fps: Option<f64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: 250,
            max_frames: None,
            fps: None,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        match self.fps {
            Some(fps) if !(fps.is_finite() && fps > 0.0) => Err(ConfigError::InvalidFrameRate(fps)),
            _ => Ok(()),
        }
    }
}

impl TrackingConfig {
    /// Check every section, returning the first problem found.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.detector.validate()?;
        self.fallback.validate()?;
        self.session.validate()
    }

    /// Parse and validate a JSON configuration string.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }
}
