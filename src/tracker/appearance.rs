//! Appearance tracker: the per-marker fallback used while the marker is not detected.

use nalgebra::Point2;
use ndarray::{Array2, ArrayView2, s};

use crate::config::FallbackConfig;
use crate::frame::dims;
use crate::tracker::correlation::{
    CorrelationTracker, has_native_correlation_tracker, native_correlation_tracker,
};
use crate::tracker::rect::Rect;
use crate::tracker::template::match_template;

/// Appearance tracker options, resolved once per session.
#[derive(Debug, Clone, PartialEq)]
pub struct AppearanceParams {
    /// Construct the native correlation tracker at init
    pub use_native: bool,
    pub min_init_size: usize,
    pub min_track_size: usize,
    pub match_threshold: f32,
    pub search_margin_factor: f32,
}

impl AppearanceParams {
    /// Resolve options against the build's capabilities.
    pub fn resolve(config: &FallbackConfig) -> Self {
        let use_native = config.use_correlation_tracker && has_native_correlation_tracker();
        if config.use_correlation_tracker && !use_native {
            log::debug!("native correlation tracker unavailable; using template matching only");
        }
        Self {
            use_native,
            min_init_size: config.min_init_size,
            min_track_size: config.min_track_size,
            match_threshold: config.match_threshold,
            search_margin_factor: config.search_margin_factor,
        }
    }
}

impl Default for AppearanceParams {
    fn default() -> Self {
        Self::resolve(&FallbackConfig::default())
    }
}

/// The two fallback strategies, distinguished by type.
///
/// Both carry the grayscale template captured at the last marker detection;
/// the native variant uses it as a wide-window backstop.
pub enum AppearanceTrackerHandle {
    Native {
        tracker: Box<dyn CorrelationTracker>,
        template: Array2<u8>,
    },
    TemplateOnly {
        template: Array2<u8>,
    },
}

impl AppearanceTrackerHandle {
    pub fn template(&self) -> &Array2<u8> {
        match self {
            AppearanceTrackerHandle::Native { template, .. } => template,
            AppearanceTrackerHandle::TemplateOnly { template } => template,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, AppearanceTrackerHandle::Native { .. })
    }
}

impl std::fmt::Debug for AppearanceTrackerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_native() { "Native" } else { "TemplateOnly" };
        let (h, w) = self.template().dim();
        write!(f, "{kind}(template {w}x{h})")
    }
}

/// Fallback tracker for one marker.
///
/// Only exists with a captured template, so a usable tracker always has one.
#[derive(Debug)]
pub struct AppearanceTracker {
    handle: AppearanceTrackerHandle,
    last_bbox: Rect,
    params: AppearanceParams,
}

impl AppearanceTracker {
    /// Capture the pixels inside `bbox` and start tracking them.
    ///
    /// The box is clamped to the frame; boxes smaller than the minimum size
    /// are rejected with `None`.
    pub fn init(gray: ArrayView2<'_, u8>, bbox: Rect, params: &AppearanceParams) -> Option<Self> {
        let (w, h) = dims(&gray);
        let clamped = bbox.clamp_to(w, h);
        if !clamped.has_min_size(params.min_init_size) {
            log::warn!(
                "appearance box {clamped:?} below {}px; not tracking",
                params.min_init_size
            );
            return None;
        }

        let (rows, cols) = clamped.rows_cols();
        let template = gray.slice(s![rows, cols]).to_owned();

        let handle = match params.use_native.then(native_correlation_tracker).flatten() {
            Some(mut tracker) => {
                if tracker.init(gray, clamped) {
                    AppearanceTrackerHandle::Native { tracker, template }
                } else {
                    log::debug!("correlation tracker rejected {clamped:?}; template matching only");
                    AppearanceTrackerHandle::TemplateOnly { template }
                }
            }
            None => AppearanceTrackerHandle::TemplateOnly { template },
        };

        Some(Self {
            handle,
            last_bbox: clamped,
            params: params.clone(),
        })
    }

    pub fn handle(&self) -> &AppearanceTrackerHandle {
        &self.handle
    }

    pub fn template(&self) -> &Array2<u8> {
        self.handle.template()
    }

    pub fn last_bbox(&self) -> Rect {
        self.last_bbox
    }

    /// Locate the tracked appearance in a new frame.
    ///
    /// Tries the correlation tracker first, then a wide-window template
    /// search. `None` means this frame's appearance tracking failed.
    pub fn update(&mut self, gray: ArrayView2<'_, u8>) -> Option<Point2<f64>> {
        let (w, h) = dims(&gray);
        let min_size = self.params.min_track_size;

        if let AppearanceTrackerHandle::Native { tracker, .. } = &mut self.handle {
            match tracker.update(gray) {
                Some(bbox) if bbox.is_within(w, h) && bbox.has_min_size(min_size) => {
                    self.last_bbox = bbox;
                    return Some(bbox.center());
                }
                _ => log::trace!("correlation tracker missed; searching template"),
            }
        }

        let bbox = self.template_search(gray)?;
        self.last_bbox = bbox;
        Some(bbox.center())
    }

    /// Search a window around the last box for the stored template.
    fn template_search(&self, gray: ArrayView2<'_, u8>) -> Option<Rect> {
        let template = self.handle.template();
        let (th, tw) = template.dim();
        if th < self.params.min_track_size || tw < self.params.min_track_size {
            return None;
        }

        let (w, h) = dims(&gray);
        let margin = (tw.max(th) as f32 * self.params.search_margin_factor) as f64;
        let center = self.last_bbox.center();
        let window = Rect::from_tlbr(
            ((center.x - margin) as i32).max(0),
            ((center.y - margin) as i32).max(0),
            ((center.x + margin) as i32).min(w as i32),
            ((center.y + margin) as i32).min(h as i32),
        );
        if window.width <= tw as i32 || window.height <= th as i32 {
            return None;
        }

        let (rows, cols) = window.rows_cols();
        let template = template.mapv(|v| v as f32);
        let found = match_template(gray.slice(s![rows, cols]), template.view())?;
        if found.score <= self.params.match_threshold {
            return None;
        }

        Some(Rect::new(
            window.x + found.x as i32,
            window.y + found.y as i32,
            tw as i32,
            th as i32,
        ))
    }
}
