use std::collections::HashMap;

use crate::components::{mem::MemRaster, ResampleAlg};

/// Half-width of the filter in overview pixels. Windowed algorithms
/// derive their source extent directly and need no margin.
pub(crate) fn kernel_radius(alg: ResampleAlg) -> usize {
    match alg {
        ResampleAlg::NearestNeighbour | ResampleAlg::Average | ResampleAlg::Mode => 0,
        ResampleAlg::Bilinear | ResampleAlg::Gauss => 1,
        ResampleAlg::Cubic | ResampleAlg::CubicSpline => 2,
        ResampleAlg::Lanczos => 3,
    }
}

/// One source chunk and the destination region it produces.
///
/// Source coordinates live in the request's transformer space: a
/// destination pixel `d` maps to source `(d + 0.5) * ratio + delta`.
/// `chunk_x_off`/`chunk_y_off` locate the chunk in that same space and
/// may be negative.
pub(crate) struct ChunkParams<'a> {
    pub x_ratio: f64,
    pub y_ratio: f64,
    pub x_delta: f64,
    pub y_delta: f64,
    pub chunk: &'a [f32],
    /// Validity mask, one byte per chunk sample, zero meaning invalid.
    pub mask: Option<&'a [u8]>,
    pub chunk_x_off: isize,
    pub chunk_width: usize,
    pub chunk_y_off: isize,
    pub chunk_height: usize,
    pub dst_x_start: usize,
    pub dst_x_end: usize,
    pub dst_y_start: usize,
    pub dst_y_end: usize,
    pub nodata: Option<f32>,
}

impl ChunkParams<'_> {
    fn valid(&self, x: usize, y: usize) -> bool {
        match self.mask {
            Some(mask) => mask[y * self.chunk_width + x] != 0,
            None => true,
        }
    }

    fn sample(&self, x: usize, y: usize) -> f32 {
        self.chunk[y * self.chunk_width + x]
    }

    fn fill_value(&self) -> f64 {
        self.nodata.unwrap_or(0.0) as f64
    }

    /// Integer source span for windowed algorithms, clamped to the
    /// chunk and never empty.
    fn window(&self, d: usize, ratio: f64, delta: f64, off: isize, len: usize) -> (usize, usize) {
        let lo = (d as f64 * ratio + delta + 0.5).floor() as isize - off;
        let hi = ((d + 1) as f64 * ratio + delta + 0.5).floor() as isize - off;
        let lo = lo.clamp(0, len as isize - 1) as usize;
        let hi = hi.clamp(lo as isize + 1, len as isize) as usize;
        (lo, hi)
    }
}

fn bilinear_weight(x: f64) -> f64 {
    (1.0 - x.abs()).max(0.0)
}

// Catmull-Rom, a = -0.5.
fn cubic_weight(x: f64) -> f64 {
    let x = x.abs();
    if x <= 1.0 {
        ((1.5 * x - 2.5) * x) * x + 1.0
    } else if x <= 2.0 {
        (((-0.5 * x + 2.5) * x) - 4.0) * x + 2.0
    } else {
        0.0
    }
}

// Cubic B-spline.
fn bspline_weight(x: f64) -> f64 {
    let x = x.abs();
    if x <= 1.0 {
        (0.5 * x - 1.0) * x * x + 2.0 / 3.0
    } else if x <= 2.0 {
        let t = 2.0 - x;
        t * t * t / 6.0
    } else {
        0.0
    }
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        let px = std::f64::consts::PI * x;
        px.sin() / px
    }
}

fn lanczos_weight(x: f64) -> f64 {
    if x.abs() >= 3.0 {
        0.0
    } else {
        sinc(x) * sinc(x / 3.0)
    }
}

/// Resamples one chunk into `dst`. Pixels whose source support is
/// entirely invalid receive the nodata value (zero when none is set).
pub(crate) fn resample_chunk(alg: ResampleAlg, p: &ChunkParams, dst: &mut MemRaster) {
    match alg {
        ResampleAlg::NearestNeighbour => windowed(p, dst, |values| {
            values.first().map(|&(v, _)| v as f64)
        }),
        ResampleAlg::Average => windowed(p, dst, |values| {
            if values.is_empty() {
                None
            } else {
                let sum: f64 = values.iter().map(|&(v, w)| v as f64 * w).sum();
                let weight: f64 = values.iter().map(|&(_, w)| w).sum();
                Some(sum / weight)
            }
        }),
        ResampleAlg::Mode => windowed(p, dst, |values| {
            let mut counts: HashMap<u32, (usize, f32)> = HashMap::new();
            let mut best: Option<(usize, f32)> = None;
            for &(v, _) in values {
                let entry = counts.entry(v.to_bits()).or_insert((0, v));
                entry.0 += 1;
                if best.map_or(true, |(n, _)| entry.0 > n) {
                    best = Some(*entry);
                }
            }
            best.map(|(_, v)| v as f64)
        }),
        ResampleAlg::Gauss => gauss(p, dst),
        ResampleAlg::Bilinear => convolve(p, dst, 1, bilinear_weight),
        ResampleAlg::Cubic => convolve(p, dst, 2, cubic_weight),
        ResampleAlg::CubicSpline => convolve(p, dst, 2, bspline_weight),
        ResampleAlg::Lanczos => convolve(p, dst, 3, lanczos_weight),
    }
}

/// Algorithms defined over the exact source window of each destination
/// pixel. The reducer sees the valid samples with unit weights.
fn windowed(
    p: &ChunkParams,
    dst: &mut MemRaster,
    reduce: impl Fn(&[(f32, f64)]) -> Option<f64>,
) {
    let mut values: Vec<(f32, f64)> = Vec::new();
    for dy in p.dst_y_start..p.dst_y_end {
        let (y0, y1) = p.window(dy, p.y_ratio, p.y_delta, p.chunk_y_off, p.chunk_height);
        for dx in p.dst_x_start..p.dst_x_end {
            let (x0, x1) = p.window(dx, p.x_ratio, p.x_delta, p.chunk_x_off, p.chunk_width);
            values.clear();
            for y in y0..y1 {
                for x in x0..x1 {
                    if p.valid(x, y) {
                        values.push((p.sample(x, y), 1.0));
                    }
                }
            }
            let v = reduce(&values).unwrap_or_else(|| p.fill_value());
            dst.set_real(dx, dy, v);
        }
    }
}

/// Separable convolution. The kernel is stretched by the ratio when
/// downsampling so its support still spans the contributing sources.
fn convolve(p: &ChunkParams, dst: &mut MemRaster, radius: usize, weight: impl Fn(f64) -> f64) {
    let x_scale = if p.x_ratio > 1.0 { 1.0 / p.x_ratio } else { 1.0 };
    let y_scale = if p.y_ratio > 1.0 { 1.0 / p.y_ratio } else { 1.0 };
    let x_support = radius as f64 / x_scale;
    let y_support = radius as f64 / y_scale;

    for dy in p.dst_y_start..p.dst_y_end {
        // Center in chunk sample-index space.
        let cy = (dy as f64 + 0.5) * p.y_ratio + p.y_delta - 0.5 - p.chunk_y_off as f64;
        let y0 = ((cy - y_support).ceil().max(0.0)) as usize;
        let y1 = (((cy + y_support).floor()) as isize).min(p.chunk_height as isize - 1);

        for dx in p.dst_x_start..p.dst_x_end {
            let cx = (dx as f64 + 0.5) * p.x_ratio + p.x_delta - 0.5 - p.chunk_x_off as f64;
            let x0 = ((cx - x_support).ceil().max(0.0)) as usize;
            let x1 = (((cx + x_support).floor()) as isize).min(p.chunk_width as isize - 1);

            let mut acc = 0.0;
            let mut total = 0.0;
            if y1 >= y0 as isize && x1 >= x0 as isize {
                for y in y0..=y1 as usize {
                    let wy = weight((y as f64 - cy) * y_scale);
                    if wy == 0.0 {
                        continue;
                    }
                    for x in x0..=x1 as usize {
                        if !p.valid(x, y) {
                            continue;
                        }
                        let w = wy * weight((x as f64 - cx) * x_scale);
                        acc += p.sample(x, y) as f64 * w;
                        total += w;
                    }
                }
            }

            let v = if total != 0.0 {
                acc / total
            } else {
                p.fill_value()
            };
            dst.set_real(dx, dy, v);
        }
    }
}

/// Gaussian-weighted mean over the source window, widened by one
/// sample on each side.
fn gauss(p: &ChunkParams, dst: &mut MemRaster) {
    let sigma_x = (p.x_ratio / 2.0).max(0.5);
    let sigma_y = (p.y_ratio / 2.0).max(0.5);

    for dy in p.dst_y_start..p.dst_y_end {
        let (y0, y1) = p.window(dy, p.y_ratio, p.y_delta, p.chunk_y_off, p.chunk_height);
        let y0 = y0.saturating_sub(1);
        let y1 = (y1 + 1).min(p.chunk_height);
        let cy = (dy as f64 + 0.5) * p.y_ratio + p.y_delta - 0.5 - p.chunk_y_off as f64;

        for dx in p.dst_x_start..p.dst_x_end {
            let (x0, x1) = p.window(dx, p.x_ratio, p.x_delta, p.chunk_x_off, p.chunk_width);
            let x0 = x0.saturating_sub(1);
            let x1 = (x1 + 1).min(p.chunk_width);
            let cx = (dx as f64 + 0.5) * p.x_ratio + p.x_delta - 0.5 - p.chunk_x_off as f64;

            let mut acc = 0.0;
            let mut total = 0.0;
            for y in y0..y1 {
                let dyy = (y as f64 - cy) / sigma_y;
                for x in x0..x1 {
                    if !p.valid(x, y) {
                        continue;
                    }
                    let dxx = (x as f64 - cx) / sigma_x;
                    let w = (-0.5 * (dxx * dxx + dyy * dyy)).exp();
                    acc += p.sample(x, y) as f64 * w;
                    total += w;
                }
            }

            let v = if total != 0.0 {
                acc / total
            } else {
                p.fill_value()
            };
            dst.set_real(dx, dy, v);
        }
    }
}
