/// Integer pixel bounding box in frame coordinates.
///
/// Supports the formats used across the tracker:
/// - TLWH: Top-Left X, Top-Left Y, Width, Height
/// - TLBR: Top-Left X, Top-Left Y, Bottom-Right X, Bottom-Right Y (exclusive)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    /// Top-left x coordinate
    pub x: i32,
    /// Top-left y coordinate
    pub y: i32,
    /// Width of the bounding box
    pub width: i32,
    /// Height of the bounding box
    pub height: i32,
}

use nalgebra::Point2;

impl Rect {
    /// Create a new Rect from top-left coordinates and dimensions (TLWH format).
    #[inline]
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a Rect from TLBR format (top-left x, top-left y, bottom-right x, bottom-right y).
    #[inline]
    pub fn from_tlbr(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        }
    }

    /// Convert to TLBR format: (x1, y1, x2, y2).
    #[inline]
    pub fn to_tlbr(&self) -> [i32; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }

    /// Box around a marker quad, grown by `padding` times its extent on each side.
    ///
    /// Coordinates truncate toward zero, so the box may start outside the frame;
    /// clamp it before cropping.
    pub fn around_quad(corners: &[Point2<f64>; 4], padding: f64) -> Self {
        let (mut x_min, mut y_min) = (f64::INFINITY, f64::INFINITY);
        let (mut x_max, mut y_max) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for c in corners {
            x_min = x_min.min(c.x);
            y_min = y_min.min(c.y);
            x_max = x_max.max(c.x);
            y_max = y_max.max(c.y);
        }
        let width = x_max - x_min;
        let height = y_max - y_min;
        let pad_x = width * padding;
        let pad_y = height * padding;

        Self {
            x: (x_min - pad_x) as i32,
            y: (y_min - pad_y) as i32,
            width: (width + 2.0 * pad_x) as i32,
            height: (height + 2.0 * pad_y) as i32,
        }
    }

    /// Get the center point of the bounding box.
    #[inline]
    pub fn center(&self) -> Point2<f64> {
        Point2::new(
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// Get the area of the bounding box.
    #[inline]
    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    /// Intersection with a `width x height` frame.
    pub fn clamp_to(&self, width: usize, height: usize) -> Rect {
        let [x1, y1, x2, y2] = self.to_tlbr();
        let x1 = x1.clamp(0, width as i32);
        let y1 = y1.clamp(0, height as i32);
        let x2 = x2.clamp(x1, width as i32);
        let y2 = y2.clamp(y1, height as i32);
        Rect::from_tlbr(x1, y1, x2, y2)
    }

    /// Whether the box lies entirely inside a `width x height` frame.
    pub fn is_within(&self, width: usize, height: usize) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.width >= 0
            && self.height >= 0
            && self.x as i64 + self.width as i64 <= width as i64
            && self.y as i64 + self.height as i64 <= height as i64
    }

    /// Whether both sides are at least `min` pixels.
    #[inline]
    pub fn has_min_size(&self, min: usize) -> bool {
        self.width >= min as i32 && self.height >= min as i32
    }

    /// Row and column ranges for slicing a `height x width` array.
    ///
    /// Only meaningful for boxes that are [`Rect::is_within`] the frame.
    #[inline]
    pub(crate) fn rows_cols(&self) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
        let [x1, y1, x2, y2] = self.to_tlbr();
        (y1 as usize..y2 as usize, x1 as usize..x2 as usize)
    }
}
