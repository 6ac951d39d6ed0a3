//! Native correlation tracker used as the primary fallback between marker detections.
//!
//! Availability is a compile-time capability (the `correlation-tracker`
//! feature). Without it the appearance tracker runs in template-only mode.

use ndarray::ArrayView2;

use crate::tracker::rect::Rect;

/// Frame-to-frame visual tracker following a bounding box.
pub trait CorrelationTracker: Send {
    /// Start tracking the pixels inside `bbox` (already clamped to the frame).
    fn init(&mut self, gray: ArrayView2<'_, u8>, bbox: Rect) -> bool;

    /// Advance one frame; returns the new box, or `None` when tracking failed.
    fn update(&mut self, gray: ArrayView2<'_, u8>) -> Option<Rect>;
}

/// Whether a native correlation tracker is compiled into this build.
pub const fn has_native_correlation_tracker() -> bool {
    cfg!(feature = "correlation-tracker")
}

/// Construct the native correlation tracker, if available.
pub fn native_correlation_tracker() -> Option<Box<dyn CorrelationTracker>> {
    #[cfg(feature = "correlation-tracker")]
    {
        Some(Box::new(ncc::NccCorrelationTracker::default()))
    }
    #[cfg(not(feature = "correlation-tracker"))]
    {
        None
    }
}

#[cfg(feature = "correlation-tracker")]
pub use ncc::NccCorrelationTracker;

#[cfg(feature = "correlation-tracker")]
mod ncc {
    use ndarray::{Array2, ArrayView2, s};

    use super::CorrelationTracker;
    use crate::frame::dims;
    use crate::tracker::rect::Rect;
    use crate::tracker::template::match_template;

    /// Correlation tracker with a running appearance model.
    ///
    /// Each update searches a window around the previous box (half the box's
    /// larger side in every direction) for the best normalized correlation
    /// with the model, then blends the new patch into the model.
    #[derive(Debug, Clone)]
    pub struct NccCorrelationTracker {
        model: Option<Array2<f32>>,
        bbox: Rect,
        /// Search radius as a fraction of the box's larger side
        pub search_radius: f32,
        /// Weight of the newest patch in the appearance model
        pub learning_rate: f32,
        /// Minimum correlation for an update to succeed
        pub min_score: f32,
    }

    impl Default for NccCorrelationTracker {
        fn default() -> Self {
            Self {
                model: None,
                bbox: Rect::default(),
                search_radius: 0.5,
                learning_rate: 0.125,
                min_score: 0.6,
            }
        }
    }

    impl CorrelationTracker for NccCorrelationTracker {
        fn init(&mut self, gray: ArrayView2<'_, u8>, bbox: Rect) -> bool {
            let (w, h) = dims(&gray);
            if bbox.area() == 0 || !bbox.is_within(w, h) {
                self.model = None;
                return false;
            }
            let (rows, cols) = bbox.rows_cols();
            self.model = Some(gray.slice(s![rows, cols]).mapv(|v| v as f32));
            self.bbox = bbox;
            true
        }

        fn update(&mut self, gray: ArrayView2<'_, u8>) -> Option<Rect> {
            let model = self.model.as_mut()?;
            let (w, h) = dims(&gray);
            let side = self.bbox.width.max(self.bbox.height) as f32;
            let radius = ((side * self.search_radius) as i32).max(2);
            let window = Rect::new(
                self.bbox.x - radius,
                self.bbox.y - radius,
                self.bbox.width + 2 * radius,
                self.bbox.height + 2 * radius,
            )
            .clamp_to(w, h);
            if window.width < self.bbox.width || window.height < self.bbox.height {
                return None;
            }

            let (rows, cols) = window.rows_cols();
            let found = match_template(gray.slice(s![rows, cols]), model.view())?;
            if found.score < self.min_score {
                return None;
            }

            let bbox = Rect::new(
                window.x + found.x as i32,
                window.y + found.y as i32,
                self.bbox.width,
                self.bbox.height,
            );
            let (rows, cols) = bbox.rows_cols();
            let patch = gray.slice(s![rows, cols]);
            let rate = self.learning_rate;
            model.zip_mut_with(&patch, |m, &p| *m = (1.0 - rate) * *m + rate * p as f32);
            self.bbox = bbox;
            Some(bbox)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::test_utils::frame_with_patch;

        #[test]
        fn test_follows_small_motion() {
            let first = frame_with_patch(120, 90, &[(50, 40, 20, 4)]);
            let mut tracker = NccCorrelationTracker::default();
            assert!(tracker.init(first.view(), Rect::new(40, 30, 20, 20)));

            let moved = frame_with_patch(120, 90, &[(54, 43, 20, 4)]);
            let bbox = tracker.update(moved.view()).unwrap();
            assert_eq!(bbox, Rect::new(44, 33, 20, 20));
        }

        #[test]
        fn test_fails_on_blank_frame() {
            let first = frame_with_patch(120, 90, &[(50, 40, 20, 4)]);
            let mut tracker = NccCorrelationTracker::default();
            assert!(tracker.init(first.view(), Rect::new(40, 30, 20, 20)));

            let blank = Array2::from_elem((90, 120), 100u8);
            assert!(tracker.update(blank.view()).is_none());
        }

        #[test]
        fn test_rejects_box_outside_frame() {
            let frame = frame_with_patch(60, 60, &[(30, 30, 20, 1)]);
            let mut tracker = NccCorrelationTracker::default();
            assert!(!tracker.init(frame.view(), Rect::new(50, 50, 20, 20)));
            assert!(tracker.update(frame.view()).is_none());
        }
    }
}
