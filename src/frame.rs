//! Video frame representation shared by the detector and the appearance tracker.

use std::borrow::Cow;

use ndarray::{Array2, Array3, ArrayView2, Axis};

/// A single video frame.
///
/// Color frames are interleaved `height x width x 3` in BGR channel order,
/// the layout produced by most capture stacks.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Single-channel 8-bit frame, `height x width`.
    Gray(Array2<u8>),
    /// Three-channel 8-bit BGR frame, `height x width x 3`.
    Bgr(Array3<u8>),
}

impl Frame {
    /// Frame width in pixels.
    pub fn width(&self) -> usize {
        match self {
            Frame::Gray(g) => g.ncols(),
            Frame::Bgr(c) => c.len_of(Axis(1)),
        }
    }

    /// Frame height in pixels.
    pub fn height(&self) -> usize {
        match self {
            Frame::Gray(g) => g.nrows(),
            Frame::Bgr(c) => c.len_of(Axis(0)),
        }
    }

    /// Grayscale version of the frame, borrowed when already single-channel.
    pub fn to_gray(&self) -> Cow<'_, Array2<u8>> {
        match self {
            Frame::Gray(g) => Cow::Borrowed(g),
            Frame::Bgr(c) => Cow::Owned(bgr_to_gray(c)),
        }
    }
}

impl From<Array2<u8>> for Frame {
    fn from(gray: Array2<u8>) -> Self {
        Frame::Gray(gray)
    }
}

impl From<Array3<u8>> for Frame {
    fn from(bgr: Array3<u8>) -> Self {
        Frame::Bgr(bgr)
    }
}

/// BT.601 luma from an interleaved BGR image.
///
/// Images with other than three channels fall back to their first channel.
pub fn bgr_to_gray(bgr: &Array3<u8>) -> Array2<u8> {
    let (h, w, c) = bgr.dim();
    if c != 3 {
        return bgr.index_axis(Axis(2), 0).to_owned();
    }
    Array2::from_shape_fn((h, w), |(y, x)| {
        let b = bgr[[y, x, 0]] as f32;
        let g = bgr[[y, x, 1]] as f32;
        let r = bgr[[y, x, 2]] as f32;
        (0.114 * b + 0.587 * g + 0.299 * r).round().clamp(0.0, 255.0) as u8
    })
}

/// Dimensions of a grayscale view as `(width, height)`.
#[inline]
pub(crate) fn dims(gray: &ArrayView2<'_, u8>) -> (usize, usize) {
    (gray.ncols(), gray.nrows())
}
