use serde::{Deserialize, Serialize};

/// Where a frame's position estimate for a marker came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingSource {
    /// Marker detected this frame (ground truth)
    Marker,
    /// Interpolated by the appearance tracker, or held after a brief dropout
    Fallback,
    /// No usable estimate
    #[default]
    Lost,
}

impl TrackingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingSource::Marker => "marker",
            TrackingSource::Fallback => "fallback",
            TrackingSource::Lost => "lost",
        }
    }
}

impl std::fmt::Display for TrackingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
