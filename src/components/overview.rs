use crate::components::{
    band::RasterBand,
    window::{FloatWindow, Window},
};

/// Resolution of a band relative to `base`, taken from the least
/// reduced axis, in source pixels per overview pixel.
fn relative_resolution(base: &RasterBand, ovr: &RasterBand) -> f64 {
    let x_res = base.width() as f64 / ovr.width() as f64;
    let y_res = base.height() as f64 / ovr.height() as f64;
    if x_res < y_res {
        x_res
    } else {
        y_res
    }
}

/// Picks the most downsampled overview whose resolution is still
/// below 1.2 times the requested reduction, rewriting `window` (and
/// the fractional window, when present) into that overview's pixel
/// space. Returns `None` when no overview helps and the request must
/// run at full resolution.
pub fn best_overview_level(
    band: &RasterBand,
    window: &mut Window,
    buf_width: usize,
    buf_height: usize,
    float_window: &mut Option<FloatWindow>,
) -> Option<usize> {
    let x_reduction = window.x_size as f64 / buf_width as f64;
    let y_reduction = window.y_size as f64 / buf_height as f64;
    let desired = if x_reduction < y_reduction || buf_height == 1 {
        x_reduction
    } else {
        y_reduction
    };

    let mut best: Option<usize> = None;
    let mut best_resolution = 0.0;

    for (level, ovr) in band.overviews().iter().enumerate() {
        let resolution = relative_resolution(band, &ovr.band);
        if resolution >= desired * 1.2 || resolution <= best_resolution {
            continue;
        }
        // Bit-to-grayscale overviews hold expanded values, not the
        // band's own data.
        if ovr
            .resampling
            .as_deref()
            .is_some_and(|r| r.to_ascii_uppercase().starts_with("AVERAGE_BIT2"))
        {
            continue;
        }
        best = Some(level);
        best_resolution = resolution;
    }

    let level = best?;
    let ovr = &band.overviews()[level].band;

    let x_res = band.width() as f64 / ovr.width() as f64;
    let y_res = band.height() as f64 / ovr.height() as f64;

    let x_off = ((window.x_off as f64 / x_res + 0.5) as usize).min(ovr.width() - 1);
    let y_off = ((window.y_off as f64 / y_res + 0.5) as usize).min(ovr.height() - 1);
    let mut x_size = ((window.x_size as f64 / x_res + 0.5) as usize).max(1);
    let mut y_size = ((window.y_size as f64 / y_res + 0.5) as usize).max(1);
    if x_off + x_size > ovr.width() {
        x_size = ovr.width() - x_off;
    }
    if y_off + y_size > ovr.height() {
        y_size = ovr.height() - y_off;
    }

    *window = Window::new(x_off, y_off, x_size, y_size);

    if let Some(fw) = float_window {
        fw.x_off /= x_res;
        fw.x_size /= x_res;
        fw.y_off /= y_res;
        fw.y_size /= y_res;
    }

    Some(level)
}
