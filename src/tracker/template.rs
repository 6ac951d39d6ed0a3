//! Normalized cross-correlation template search.

use ndarray::{Array2, ArrayView2};

/// Best template placement inside a search image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateMatch {
    /// Column of the template's top-left corner in the search image
    pub x: usize,
    /// Row of the template's top-left corner in the search image
    pub y: usize,
    /// Zero-mean normalized correlation in [-1, 1]
    pub score: f32,
}

const VARIANCE_EPS: f64 = 1e-6;

/// Summed-area tables of pixel values and squared values, `(h + 1) x (w + 1)`.
struct IntegralImages {
    sum: Array2<f64>,
    sq_sum: Array2<f64>,
}

impl IntegralImages {
    fn new(image: &ArrayView2<'_, u8>) -> Self {
        let (h, w) = image.dim();
        let mut sum = Array2::<f64>::zeros((h + 1, w + 1));
        let mut sq_sum = Array2::<f64>::zeros((h + 1, w + 1));
        for y in 0..h {
            let mut row = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w {
                let v = image[[y, x]] as f64;
                row += v;
                row_sq += v * v;
                sum[[y + 1, x + 1]] = sum[[y, x + 1]] + row;
                sq_sum[[y + 1, x + 1]] = sq_sum[[y, x + 1]] + row_sq;
            }
        }
        Self { sum, sq_sum }
    }

    #[inline]
    fn window(table: &Array2<f64>, x: usize, y: usize, w: usize, h: usize) -> f64 {
        table[[y + h, x + w]] - table[[y, x + w]] - table[[y + h, x]] + table[[y, x]]
    }
}

/// Slide `template` over `image` and return the placement with the highest
/// zero-mean normalized correlation.
///
/// Placements over flat image regions are skipped. Returns `None` when the
/// template is larger than the image, the template itself is flat, or no
/// placement has any texture.
pub fn match_template(
    image: ArrayView2<'_, u8>,
    template: ArrayView2<'_, f32>,
) -> Option<TemplateMatch> {
    let (ih, iw) = image.dim();
    let (th, tw) = template.dim();
    if th == 0 || tw == 0 || th > ih || tw > iw {
        return None;
    }

    let n = (th * tw) as f64;
    let t_mean = template.iter().map(|&v| v as f64).sum::<f64>() / n;
    let centered = template.mapv(|v| v as f64 - t_mean);
    let t_norm = centered.iter().map(|v| v * v).sum::<f64>().sqrt();
    if t_norm < VARIANCE_EPS {
        return None;
    }

    let tables = IntegralImages::new(&image);
    let mut best: Option<TemplateMatch> = None;

    for oy in 0..=(ih - th) {
        for ox in 0..=(iw - tw) {
            let s = IntegralImages::window(&tables.sum, ox, oy, tw, th);
            let sq = IntegralImages::window(&tables.sq_sum, ox, oy, tw, th);
            let var = sq - s * s / n;
            if var < VARIANCE_EPS {
                continue;
            }

            // The centered template sums to zero, so the image mean drops out.
            let mut num = 0.0;
            for ty in 0..th {
                for tx in 0..tw {
                    num += centered[[ty, tx]] * image[[oy + ty, ox + tx]] as f64;
                }
            }
            let score = (num / (t_norm * var.sqrt())) as f32;

            if best.is_none_or(|b| score > b.score) {
                best = Some(TemplateMatch {
                    x: ox,
                    y: oy,
                    score,
                });
            }
        }
    }

    best
}
