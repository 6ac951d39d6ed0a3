//! Shared helpers for image-based unit tests.

use ndarray::{Array2, s};

use crate::marker::{MarkerBackend, RawMarker};

/// Deterministic high-contrast pseudo-random texture value for pixel `(x, y)`.
pub(crate) fn texture(x: u32, y: u32, seed: u32) -> u8 {
    let mut h = x
        .wrapping_mul(73_856_093)
        ^ y.wrapping_mul(19_349_663)
        ^ seed.wrapping_add(1).wrapping_mul(83_492_791);
    h ^= h >> 13;
    h = h.wrapping_mul(0x5bd1_e995);
    h ^= h >> 15;
    (h % 200 + 28) as u8
}

/// Flat background with a textured `side x side` patch centered on `(cx, cy)`.
///
/// Texture is anchored to the patch so the pattern moves with it.
pub(crate) fn frame_with_patch(
    width: usize,
    height: usize,
    patches: &[(usize, usize, usize, u32)],
) -> Array2<u8> {
    let mut gray = Array2::from_elem((height, width), 100u8);
    for &(cx, cy, side, seed) in patches {
        let x0 = cx - side / 2;
        let y0 = cy - side / 2;
        let patch = Array2::from_shape_fn((side, side), |(y, x)| texture(x as u32, y as u32, seed));
        gray.slice_mut(s![y0..y0 + side, x0..x0 + side]).assign(&patch);
    }
    gray
}

/// Backend replaying a fixed list of detections per call.
pub(crate) struct ScriptedBackend {
    pub frames: Vec<Vec<RawMarker>>,
    pub calls: usize,
}

impl ScriptedBackend {
    pub fn new(frames: Vec<Vec<RawMarker>>) -> Self {
        Self { frames, calls: 0 }
    }
}

impl MarkerBackend for ScriptedBackend {
    type Error = std::convert::Infallible;

    fn detect(
        &mut self,
        _gray: ndarray::ArrayView2<'_, u8>,
    ) -> Result<Vec<RawMarker>, Self::Error> {
        let out = self.frames.get(self.calls).cloned().unwrap_or_default();
        self.calls += 1;
        Ok(out)
    }
}
