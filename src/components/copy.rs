use log::{debug, warn};

use crate::{
    components::{
        band::{RasterBand, DEFAULT_CACHE_BUDGET},
        dataset::{Dataset, Interleave},
        io::IoOpts,
        pixel::PixelType,
        window::{BufferLayout, Window},
        RwFlag,
    },
    errors::{GridioError, Result},
};

/// Options of the whole-raster copy routines.
pub struct CopyOptions {
    /// Force pixel-interleaved or band-sequential operation. Defaults
    /// to interleaved when either dataset reports pixel interleaving.
    pub interleave: Option<Interleave>,
    /// The destination compresses its blocks, so each should be
    /// written exactly once.
    pub compressed_dest: bool,
    /// Skip swaths whose source reports no data coverage.
    pub skip_holes: bool,
    /// Swath buffer budget in bytes; derived from the cache budget
    /// when unset.
    pub swath_bytes: Option<usize>,
    /// Block cache budget the swath sizing reasons against.
    pub cache_budget: usize,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            interleave: None,
            compressed_dest: false,
            skip_holes: false,
            swath_bytes: None,
            cache_budget: DEFAULT_CACHE_BUDGET,
        }
    }
}

const MIN_TARGET_SWATH: usize = 1_000_000;
const IDEAL_SWATH_FLOOR: usize = 10 * 1000 * 1000;

fn is_jpeg2000(band: &RasterBand) -> bool {
    band.compression()
        .is_some_and(|c| c.eq_ignore_ascii_case("JPEG2000"))
}

/// Sizes the swath buffer for a whole-raster copy. Aims for one row of
/// destination blocks and keeps the buffer aligned to both bands' block
/// dimensions where that fits the target size.
pub fn compute_swath_size(
    src: &RasterBand,
    dst: &RasterBand,
    band_count: usize,
    dst_compressed: bool,
    interleave: bool,
    opts: &CopyOptions,
) -> (usize, usize) {
    let width = src.width();
    let height = src.height();
    let src_block_w = src.block_width();
    let src_block_h = src.block_height();
    let dst_block_w = dst.block_width();
    let dst_block_h = dst.block_height();
    let max_block_w = dst_block_w.max(src_block_w);
    let max_block_h = dst_block_h.max(src_block_h);

    let mut pixel_size = dst.pixel_type().size_bytes();
    if interleave {
        pixel_size *= band_count;
    }

    // Aim for one row of blocks, never less.
    let mut swath_cols = width;
    let mut swath_lines = dst_block_h;

    let src_jpeg2000 = is_jpeg2000(src);

    let mut target = match opts.swath_bytes {
        Some(bytes) => bytes,
        None => {
            let mut target = opts.cache_budget / 4;
            let mut ideal = swath_cols * swath_lines * pixel_size;
            if ideal < target && ideal < IDEAL_SWATH_FLOOR {
                ideal = IDEAL_SWATH_FLOOR;
            }
            if src_jpeg2000
                && (!dst_compressed
                    || (src_block_w % dst_block_w == 0 && src_block_h % dst_block_h == 0))
            {
                ideal = ideal.max(swath_cols * src_block_h * pixel_size);
            }
            if target > ideal {
                target = ideal;
            }
            target
        }
    };
    if target < MIN_TARGET_SWATH {
        target = MIN_TARGET_SWATH;
    }

    if dst_compressed && interleave && target > opts.cache_budget {
        warn!(
            "copying into a compressed interleaved destination with a swath \
             ({target} bytes) larger than the cache budget ({})",
            opts.cache_budget
        );
    }

    let round_to = |x: usize, y: usize| (x / y) * y;

    // With compatible tilings on both sides, prefer a swath that is a
    // multiple of both block dimensions.
    if dst_block_w != width
        && src_block_w != width
        && max_block_w % dst_block_w == 0
        && max_block_w % src_block_w == 0
        && max_block_h % dst_block_h == 0
        && max_block_h % src_block_h == 0
        && max_block_w * max_block_h * pixel_size <= target
    {
        swath_cols = target / (max_block_h * pixel_size);
        swath_cols = round_to(swath_cols, max_block_w);
        if swath_cols == 0 {
            swath_cols = max_block_w;
        }
        swath_cols = swath_cols.min(width);
        swath_lines = max_block_h;

        if swath_cols * swath_lines * pixel_size > target {
            swath_cols = width;
            swath_lines = dst_block_h;
        }
    }

    let memory_per_col = swath_cols * pixel_size;
    if memory_per_col * swath_lines > target {
        swath_lines = (target / memory_per_col).max(1);
        debug!(
            "adjusting to {swath_lines} line swath since one block row \
             exceeds the target swath size"
        );
    } else if swath_lines == 1 || memory_per_col * swath_lines < target / 10 {
        // Single scans get batched; established swaths only grow when a
        // block row is well under the target.
        swath_lines = height.min((target / memory_per_col).max(1));

        if swath_lines % max_block_h != 0
            && swath_lines > max_block_h
            && max_block_h % dst_block_h == 0
            && max_block_h % src_block_h == 0
        {
            swath_lines = round_to(swath_lines, max_block_h);
        }
    }

    if src_jpeg2000
        && (!dst_compressed
            || (src_block_w % dst_block_w == 0 && src_block_h % dst_block_h == 0))
    {
        // Sources with tall expensive-to-decode tiles are read a full
        // tile row at a time.
        if swath_lines < src_block_h {
            swath_lines = src_block_h;
            swath_cols = target / (src_block_w * pixel_size);
            swath_cols = round_to(swath_cols, src_block_w);
            if swath_cols == 0 {
                swath_cols = src_block_w;
            }
            swath_cols = swath_cols.min(width);
        } else if swath_lines % src_block_h != 0 {
            swath_lines = round_to(swath_lines, src_block_h);
        }
    } else if dst_compressed {
        if swath_lines < dst_block_h {
            swath_lines = dst_block_h;
            swath_cols = target / (swath_lines * pixel_size);
            swath_cols = round_to(swath_cols, dst_block_w);
            if swath_cols == 0 {
                swath_cols = dst_block_w;
            }
            swath_cols = swath_cols.min(width);
        } else if swath_lines % dst_block_h != 0 {
            swath_lines = round_to(swath_lines, dst_block_h);
        }
    }

    (swath_cols, swath_lines)
}

/// Copies every band of `src` into `dst`. The datasets must agree in
/// size and band count; pixel types may differ.
pub fn copy_whole_raster(
    src: &Dataset,
    dst: &Dataset,
    opts: &CopyOptions,
    mut progress: Option<&mut dyn FnMut(f64) -> bool>,
) -> Result<()> {
    let width = dst.width();
    let height = dst.height();
    let band_count = dst.band_count();
    if src.width() != width || src.height() != height || src.band_count() != band_count {
        return Err(GridioError::SizeMismatch);
    }

    if let Some(p) = progress.as_mut() {
        if !p(0.0) {
            return Err(GridioError::Interrupted);
        }
    }

    let interleave = match opts.interleave {
        Some(i) => i == Interleave::Pixel,
        None => {
            src.interleave() == Interleave::Pixel || dst.interleave() == Interleave::Pixel
        }
    };

    let pixel_type = dst.band(0).pixel_type();
    let (swath_cols, swath_lines) = compute_swath_size(
        src.band(0),
        dst.band(0),
        band_count,
        opts.compressed_dest,
        interleave,
        opts,
    );
    debug!("copy_whole_raster(): {swath_cols}x{swath_lines} swaths, interleave={interleave}");

    let band_factor = if interleave { band_count } else { 1 };
    let mut swath_buf =
        vec![0u8; swath_cols * swath_lines * pixel_type.size_bytes() * band_factor];

    let swaths_y = height.div_ceil(swath_lines);
    let swaths_x = width.div_ceil(swath_cols);

    if !interleave {
        let total = (band_count * swaths_y * swaths_x) as f64;
        let mut done = 0usize;

        for band in 0..band_count {
            let mut y = 0;
            while y < height {
                let lines = swath_lines.min(height - y);
                let mut x = 0;
                while x < width {
                    let cols = swath_cols.min(width - x);
                    let window = Window::new(x, y, cols, lines);

                    if !opts.skip_holes || src.band(band).has_data(window) {
                        copy_swath(
                            src.band(band),
                            dst.band(band),
                            window,
                            &mut swath_buf,
                            pixel_type,
                            done as f64,
                            total,
                            &mut progress,
                        )?;
                    }

                    done += 1;
                    if let Some(p) = progress.as_mut() {
                        if !p(done as f64 / total) {
                            return Err(GridioError::Interrupted);
                        }
                    }
                    x += cols;
                }
                y += lines;
            }
        }
    } else {
        let total = (swaths_y * swaths_x) as f64;
        let mut done = 0usize;

        let mut y = 0;
        while y < height {
            let lines = swath_lines.min(height - y);
            let mut x = 0;
            while x < width {
                let cols = swath_cols.min(width - x);
                let window = Window::new(x, y, cols, lines);

                let has_data = !opts.skip_holes
                    || (0..band_count).any(|b| src.band(b).has_data(window));
                if has_data {
                    let layout = BufferLayout::packed(cols, lines, pixel_type);
                    let span = layout.line_stride * lines;
                    let done_f = done as f64;
                    let mut scaled = |c: f64| match progress.as_mut() {
                        Some(p) => p((done_f + 0.5 * c) / total),
                        None => true,
                    };
                    let mut io_opts = IoOpts {
                        progress: Some(&mut scaled),
                        ..Default::default()
                    };
                    src.raster_io(
                        RwFlag::Read,
                        window,
                        &mut swath_buf[..span * band_count],
                        &layout,
                        None,
                        Some(span),
                        &mut io_opts,
                    )?;
                    dst.raster_io(
                        RwFlag::Write,
                        window,
                        &mut swath_buf[..span * band_count],
                        &layout,
                        None,
                        Some(span),
                        &mut IoOpts::default(),
                    )?;
                }

                done += 1;
                if let Some(p) = progress.as_mut() {
                    if !p(done as f64 / total) {
                        return Err(GridioError::Interrupted);
                    }
                }
                x += cols;
            }
            y += lines;
        }
    }

    Ok(())
}

/// Copies one band into another similarly sized band.
pub fn copy_band_whole_raster(
    src: &RasterBand,
    dst: &RasterBand,
    opts: &CopyOptions,
    mut progress: Option<&mut dyn FnMut(f64) -> bool>,
) -> Result<()> {
    let width = src.width();
    let height = src.height();
    if dst.width() != width || dst.height() != height {
        return Err(GridioError::SizeMismatch);
    }

    if let Some(p) = progress.as_mut() {
        if !p(0.0) {
            return Err(GridioError::Interrupted);
        }
    }

    let pixel_type = dst.pixel_type();
    let (swath_cols, swath_lines) =
        compute_swath_size(src, dst, 1, opts.compressed_dest, false, opts);
    debug!("copy_band_whole_raster(): {swath_cols}x{swath_lines} swaths");

    let mut swath_buf = vec![0u8; swath_cols * swath_lines * pixel_type.size_bytes()];
    let total = (height.div_ceil(swath_lines) * width.div_ceil(swath_cols)) as f64;
    let mut done = 0usize;

    let mut y = 0;
    while y < height {
        let lines = swath_lines.min(height - y);
        let mut x = 0;
        while x < width {
            let cols = swath_cols.min(width - x);
            let window = Window::new(x, y, cols, lines);

            if !opts.skip_holes || src.has_data(window) {
                copy_swath(
                    src,
                    dst,
                    window,
                    &mut swath_buf,
                    pixel_type,
                    done as f64,
                    total,
                    &mut progress,
                )?;
            }

            done += 1;
            if let Some(p) = progress.as_mut() {
                if !p(done as f64 / total) {
                    return Err(GridioError::Interrupted);
                }
            }
            x += cols;
        }
        y += lines;
    }

    Ok(())
}

/// One swath: read from the source band, write to the destination, with
/// the read's progress mapped into the first half of the swath's share.
/// Every band moves through `pixel_type`, the type the swath buffer was
/// sized for; the band I/O converts on both sides.
#[allow(clippy::too_many_arguments)]
fn copy_swath(
    src: &RasterBand,
    dst: &RasterBand,
    window: Window,
    swath_buf: &mut [u8],
    pixel_type: PixelType,
    done: f64,
    total: f64,
    progress: &mut Option<&mut dyn FnMut(f64) -> bool>,
) -> Result<()> {
    let layout = BufferLayout::packed(window.x_size, window.y_size, pixel_type);
    let span = window.x_size * window.y_size * pixel_type.size_bytes();

    let mut scaled = |c: f64| match progress.as_mut() {
        Some(p) => p((done + 0.5 * c) / total),
        None => true,
    };
    let mut read_opts = IoOpts {
        progress: Some(&mut scaled),
        ..Default::default()
    };
    src.raster_io(
        RwFlag::Read,
        window,
        &mut swath_buf[..span],
        &layout,
        &mut read_opts,
    )?;
    dst.raster_io(
        RwFlag::Write,
        window,
        &mut swath_buf[..span],
        &layout,
        &mut IoOpts::default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::pixel::PixelType;

    #[test]
    fn swath_lines_align_to_block_height() {
        let src = RasterBand::in_memory(4096, 4096, 256, 256, PixelType::U8).unwrap();
        let dst = RasterBand::in_memory(4096, 4096, 256, 256, PixelType::U8).unwrap();
        let (_, lines) =
            compute_swath_size(&src, &dst, 1, false, false, &CopyOptions::default());
        assert!(lines >= 256);
        assert_eq!(lines % 256, 0);
    }

    #[test]
    fn compressed_dest_rounds_to_dest_blocks() {
        let src = RasterBand::in_memory(8192, 8192, 8192, 1, PixelType::U8).unwrap();
        let dst = RasterBand::in_memory(8192, 8192, 256, 256, PixelType::U8).unwrap();
        let (_, lines) =
            compute_swath_size(&src, &dst, 1, true, false, &CopyOptions::default());
        assert!(lines >= 256);
        assert_eq!(lines % 256, 0);
    }

    #[test]
    fn band_copy_round_trip_with_conversion() {
        let pixels: Vec<u16> = (0..64u16).map(|v| v * 100).collect();
        let src = RasterBand::from_pixels::<u16>(8, 8, 4, 4, &pixels).unwrap();
        let dst = RasterBand::in_memory(8, 8, 8, 2, PixelType::F64).unwrap();
        copy_band_whole_raster(&src, &dst, &CopyOptions::default(), None).unwrap();

        let layout = BufferLayout::packed(8, 8, PixelType::U16);
        let mut buf = vec![0u8; 128];
        dst.raster_io(
            RwFlag::Read,
            Window::full(8, 8),
            &mut buf,
            &layout,
            &mut IoOpts::default(),
        )
        .unwrap();
        let got: Vec<u16> = buf
            .chunks_exact(2)
            .map(|c| u16::from_ne_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(got, pixels);
    }

    #[test]
    fn skip_holes_leaves_destination_untouched() {
        let pixels = vec![7u8; 64];
        let src = RasterBand::from_pixels::<u8>(8, 8, 8, 8, &pixels)
            .unwrap()
            .with_coverage(|_| false);
        let dst = RasterBand::in_memory(8, 8, 8, 8, PixelType::U8).unwrap();
        let opts = CopyOptions {
            skip_holes: true,
            ..Default::default()
        };
        copy_band_whole_raster(&src, &dst, &opts, None).unwrap();

        let layout = BufferLayout::packed(8, 8, PixelType::U8);
        let mut buf = vec![1u8; 64];
        dst.raster_io(
            RwFlag::Read,
            Window::full(8, 8),
            &mut buf,
            &layout,
            &mut IoOpts::default(),
        )
        .unwrap();
        assert!(buf.iter().all(|&v| v == 0));
    }

    #[test]
    fn mixed_type_bands_copy_through_first_band_type() {
        let b0 = RasterBand::from_pixels::<u8>(16, 16, 8, 8, &[3u8; 256]).unwrap();
        let b1 = RasterBand::from_pixels::<f64>(16, 16, 8, 8, &[9.0f64; 256]).unwrap();
        let src = Dataset::new(vec![b0, b1]).unwrap();
        let d0 = RasterBand::in_memory(16, 16, 8, 8, PixelType::U8).unwrap();
        let d1 = RasterBand::in_memory(16, 16, 8, 8, PixelType::F64).unwrap();
        let dst = Dataset::new(vec![d0, d1]).unwrap();

        copy_whole_raster(&src, &dst, &CopyOptions::default(), None).unwrap();

        let layout = BufferLayout::packed(16, 16, PixelType::F64);
        let mut buf = vec![0u8; 256 * 8];
        for (band, expect) in [(0, 3.0f64), (1, 9.0f64)] {
            dst.band(band)
                .raster_io(
                    RwFlag::Read,
                    Window::full(16, 16),
                    &mut buf,
                    &layout,
                    &mut IoOpts::default(),
                )
                .unwrap();
            assert!(buf
                .chunks_exact(8)
                .map(|c| f64::from_ne_bytes(c.try_into().unwrap()))
                .all(|v| v == expect));
        }
    }

    #[test]
    fn dataset_copy_interleaved_matches_source() {
        let b0 = RasterBand::from_pixels::<u8>(16, 16, 8, 8, &[3u8; 256]).unwrap();
        let b1 = RasterBand::from_pixels::<u8>(16, 16, 8, 8, &[9u8; 256]).unwrap();
        let src = Dataset::new(vec![b0, b1])
            .unwrap()
            .with_interleave(Interleave::Pixel);
        let d0 = RasterBand::in_memory(16, 16, 8, 8, PixelType::U8).unwrap();
        let d1 = RasterBand::in_memory(16, 16, 8, 8, PixelType::U8).unwrap();
        let dst = Dataset::new(vec![d0, d1]).unwrap();

        let mut reports = Vec::new();
        let mut progress = |c: f64| {
            reports.push(c);
            true
        };
        copy_whole_raster(
            &src,
            &dst,
            &CopyOptions::default(),
            Some(&mut progress),
        )
        .unwrap();

        let layout = BufferLayout::packed(16, 16, PixelType::U8);
        let mut buf = vec![0u8; 256];
        for (band, expect) in [(0, 3u8), (1, 9u8)] {
            dst.band(band)
                .raster_io(
                    RwFlag::Read,
                    Window::full(16, 16),
                    &mut buf,
                    &layout,
                    &mut IoOpts::default(),
                )
                .unwrap();
            assert!(buf.iter().all(|&v| v == expect));
        }
        assert_eq!(reports.first().copied(), Some(0.0));
        assert_eq!(reports.last().copied(), Some(1.0));
        assert!(reports.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn cancelled_copy_reports_interrupted() {
        let src = RasterBand::from_pixels::<u8>(8, 8, 8, 8, &[5u8; 64]).unwrap();
        let dst = RasterBand::in_memory(8, 8, 8, 8, PixelType::U8).unwrap();
        let mut progress = |_c: f64| false;
        let err = copy_band_whole_raster(
            &src,
            &dst,
            &CopyOptions::default(),
            Some(&mut progress),
        )
        .unwrap_err();
        assert!(matches!(err, GridioError::Interrupted));
    }
}
