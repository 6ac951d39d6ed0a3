//! Error types for the hybrid tracking engine.

use thiserror::Error;

/// Invalid configuration, surfaced at session setup rather than mid-recording.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("marker size must be a positive finite length in mm, got {0}")]
    InvalidMarkerSize(f64),
    #[error("max_fallback_frames must be at least 1")]
    ZeroFallbackCeiling,
    #[error("bounding box padding must be finite and non-negative, got {0}")]
    InvalidPadding(f64),
    #[error("invalid detector option `{name}`: {reason}")]
    InvalidDetectorOption { name: &'static str, reason: String },
    #[error("invalid fallback option `{name}`: {reason}")]
    InvalidFallbackOption { name: &'static str, reason: String },
    #[error("calibration points are {distance:.3e} px apart; need a measurable distance")]
    DegenerateCalibration { distance: f64 },
    #[error("calibration length must be a positive finite length in mm, got {0}")]
    InvalidCalibrationLength(f64),
    #[error("session frame rate must be positive and finite, got {0}")]
    InvalidFrameRate(f64),
    #[error("unknown marker family `{0}`")]
    UnknownFamily(String),
}

/// Errors raised by the tracking engine and its session runner.
///
/// Routine per-frame marker absence is never an error.
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The marker detection backend failed on a frame.
    #[error("marker detector failed: {0}")]
    Detector(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The recording worker thread panicked before returning.
    #[error("recording worker panicked")]
    WorkerPanicked,
}

impl TrackingError {
    pub(crate) fn detector<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Detector(Box::new(err))
    }
}

/// Convenience alias for results carrying a [`TrackingError`].
pub type Result<T> = std::result::Result<T, TrackingError>;
