use log::debug;

use crate::{
    components::{
        band::RasterBand,
        io::IoOpts,
        kernels::{self, ChunkParams},
        mem::MemRaster,
        pixel::PixelType,
        warp::{WarpRequest, WarpTransform},
        window::{BufferLayout, Window},
        words::copy_words,
        RwFlag,
    },
    errors::{GridioError, Result},
};

/// Resampled reads run through a work raster of the band's own type;
/// the caller's layout is applied in a final conversion pass.
///
/// When the fractional window offset divided by the scaling ratio is
/// integral, the work raster sits at that virtual origin (no extra
/// pixels are allocated) and the request is rendered at the shifted
/// coordinates, so that reading a sub-window produces bit-identical
/// pixels to reading the whole raster at the same ratio.
pub(crate) fn raster_io_resampled(
    band: &RasterBand,
    window: Window,
    buf: &mut [u8],
    layout: &BufferLayout,
    opts: &mut IoOpts,
) -> Result<()> {
    let mut x_off = window.x_off as f64;
    let mut y_off = window.y_off as f64;
    let mut x_size = window.x_size as f64;
    let mut y_size = window.y_size as f64;
    if let Some(fw) = opts.float_window {
        x_off = fw.x_off;
        y_off = fw.y_off;
        x_size = fw.x_size;
        y_size = fw.y_size;
    }

    let x_ratio = x_size / layout.width as f64;
    let y_ratio = y_size / layout.height as f64;

    let dest_x_off = x_off / x_ratio;
    let mut has_x_virtual = false;
    let mut x_virtual = 0usize;
    if (dest_x_off - (dest_x_off + 0.5).floor()).abs() < 1e-8 {
        has_x_virtual = true;
        x_off = window.x_off as f64;
        x_virtual = (dest_x_off + 0.5) as usize;
    }

    let dest_y_off = y_off / y_ratio;
    let mut has_y_virtual = false;
    let mut y_virtual = 0usize;
    if (dest_y_off - (dest_y_off + 0.5).floor()).abs() < 1e-8 {
        has_y_virtual = true;
        y_off = window.y_off as f64;
        y_virtual = (dest_y_off + 0.5) as usize;
    }

    let mut work = MemRaster::new(layout.width, layout.height, band.pixel_type())?
        .with_origin(x_virtual, y_virtual);

    if band.pixel_type().is_complex() {
        let Some(warper) = band.warper().cloned() else {
            return Err(GridioError::Unsupported(
                "filtered resampling of a complex band requires a warp delegate".into(),
            ));
        };
        let req = WarpRequest {
            dst_x_off: x_virtual,
            dst_y_off: y_virtual,
            dst_width: layout.width,
            dst_height: layout.height,
            transform: WarpTransform {
                x_off: if has_x_virtual { 0.0 } else { x_off },
                y_off: if has_y_virtual { 0.0 } else { y_off },
                x_ratio_dst_to_src: x_ratio,
                y_ratio_dst_to_src: y_ratio,
            },
            resample: opts.resample,
            nodata: band.nodata(),
        };
        match opts.progress.as_mut() {
            Some(p) => warper.chunk_and_warp(band, &mut work, &req, Some(&mut **p))?,
            None => warper.chunk_and_warp(band, &mut work, &req, None)?,
        }
    } else {
        resample_chunked(
            band, window, layout, opts, x_off, y_off, x_ratio, y_ratio, has_x_virtual,
            has_y_virtual, x_virtual, y_virtual, &mut work,
        )?;
    }

    // Apply the caller's type and strides.
    let band_bytes = band.pixel_bytes();
    for y in 0..layout.height {
        copy_words(
            work.row(y + y_virtual),
            band.pixel_type(),
            band_bytes,
            &mut buf[y * layout.line_stride..],
            layout.pixel_type,
            layout.pixel_stride,
            layout.width,
        );
    }
    Ok(())
}

/// Largest padded source chunk read in one piece, in pixels.
const MAX_CHUNK_PIXELS: usize = 1024 * 1024;

#[allow(clippy::too_many_arguments)]
fn resample_chunked(
    band: &RasterBand,
    window: Window,
    layout: &BufferLayout,
    opts: &mut IoOpts,
    x_off: f64,
    y_off: f64,
    x_ratio: f64,
    y_ratio: f64,
    has_x_virtual: bool,
    has_y_virtual: bool,
    x_virtual: usize,
    y_virtual: usize,
    work: &mut MemRaster,
) -> Result<()> {
    let radius = kernels::kernel_radius(opts.resample);
    let nodata = band.nodata().map(|v| v as f32);
    let fill = nodata.unwrap_or(0.0);

    // Shrink the destination block until its padded source chunk fits
    // the budget.
    let mut dst_block_w = layout.width;
    let mut dst_block_h = layout.height;
    let mut chunk_w;
    let mut chunk_h;
    loop {
        chunk_w = (3 + (dst_block_w as f64 * x_ratio) as usize).min(band.width());
        chunk_h = (3 + (dst_block_h as f64 * y_ratio) as usize).min(band.height());
        if (dst_block_w == 1 && dst_block_h == 1) || chunk_w * chunk_h <= MAX_CHUNK_PIXELS {
            break;
        }
        // Full-width requests against full-width blocks chunk by
        // height so each pass stays block aligned.
        if chunk_w >= window.x_size && window.x_size == band.block_width() && dst_block_h > 1 {
            dst_block_h /= 2;
        } else if dst_block_w > 1 && (chunk_w > chunk_h || dst_block_h == 1) {
            dst_block_w /= 2;
        } else {
            dst_block_h /= 2;
        }
    }

    debug!(
        "resample_chunked(): {dst_block_w}x{dst_block_h} destination blocks, \
         {chunk_w}x{chunk_h} source chunks"
    );

    let ovr_x_factor = ((0.5 + x_ratio) as usize).max(1);
    let ovr_y_factor = ((0.5 + y_ratio) as usize).max(1);
    let pad_x = radius * ovr_x_factor;
    let pad_y = radius * ovr_y_factor;
    let queried_w = (chunk_w + 2 * pad_x).min(band.width());
    let queried_h = (chunk_h + 2 * pad_y).min(band.height());

    let mut chunk = vec![0f32; queried_w * queried_h];
    let use_mask = band.mask().is_some();
    let mut mask_chunk = if use_mask {
        vec![0u8; queried_w * queried_h]
    } else {
        Vec::new()
    };

    let total_blocks =
        layout.width.div_ceil(dst_block_w) * layout.height.div_ceil(dst_block_h);
    let mut blocks_done = 0usize;

    let mut dst_y = 0;
    while dst_y < layout.height {
        let dst_y_count = dst_block_h.min(layout.height - dst_y);

        let chunk_y = window.y_off + (dst_y as f64 * y_ratio) as usize;
        let chunk_y2 = (window.y_off
            + 1
            + ((dst_y + dst_y_count) as f64 * y_ratio).ceil() as usize)
            .min(band.height());
        let y_count = chunk_y2 - chunk_y;

        let mut qy_off = chunk_y as isize - pad_y as isize;
        let mut qy_size = y_count + 2 * pad_y;
        if qy_off < 0 {
            qy_size = (qy_size as isize + qy_off) as usize;
            qy_off = 0;
        }
        let qy_off = qy_off as usize;
        let qy_size = qy_size.min(band.height() - qy_off);

        let mut dst_x = 0;
        while dst_x < layout.width {
            let dst_x_count = dst_block_w.min(layout.width - dst_x);

            let chunk_x = window.x_off + (dst_x as f64 * x_ratio) as usize;
            let chunk_x2 = (window.x_off
                + 1
                + ((dst_x + dst_x_count) as f64 * x_ratio).ceil() as usize)
                .min(band.width());
            let x_count = chunk_x2 - chunk_x;

            let mut qx_off = chunk_x as isize - pad_x as isize;
            let mut qx_size = x_count + 2 * pad_x;
            if qx_off < 0 {
                qx_size = (qx_size as isize + qx_off) as usize;
                qx_off = 0;
            }
            let qx_off = qx_off as usize;
            let qx_size = qx_size.min(band.width() - qx_off);

            let queried = Window::new(qx_off, qy_off, qx_size, qy_size);
            let chunk_layout = BufferLayout::packed(qx_size, qy_size, PixelType::F32);
            let chunk_bytes = qx_size * qy_size * 4;
            band.raster_io(
                RwFlag::Read,
                queried,
                &mut f32_bytes_mut(&mut chunk)[..chunk_bytes],
                &chunk_layout,
                &mut IoOpts::default(),
            )?;

            let mut skip_resample = false;
            let mut mask_uniform_opaque = false;
            if use_mask {
                if let Some(mask_band) = band.mask() {
                    let mask_layout = BufferLayout::packed(qx_size, qy_size, PixelType::U8);
                    mask_band.raster_io(
                        RwFlag::Read,
                        queried,
                        &mut mask_chunk[..qx_size * qy_size],
                        &mask_layout,
                        &mut IoOpts::default(),
                    )?;
                }

                let samples = &mask_chunk[..qx_size * qy_size];
                let first = samples[0];
                if samples.iter().all(|&v| v == first) {
                    if first == 0 {
                        // Fully transparent chunk: fill and move on.
                        for j in 0..dst_y_count {
                            for i in 0..dst_x_count {
                                work.set_real(
                                    dst_x + x_virtual + i,
                                    dst_y + y_virtual + j,
                                    fill as f64,
                                );
                            }
                        }
                        skip_resample = true;
                    } else {
                        mask_uniform_opaque = true;
                    }
                }
            }

            if !skip_resample {
                let params = ChunkParams {
                    x_ratio,
                    y_ratio,
                    x_delta: x_off - window.x_off as f64,
                    y_delta: y_off - window.y_off as f64,
                    chunk: &chunk[..qx_size * qy_size],
                    mask: if use_mask && !mask_uniform_opaque {
                        Some(&mask_chunk[..qx_size * qy_size])
                    } else {
                        None
                    },
                    chunk_x_off: qx_off as isize
                        - if has_x_virtual { 0 } else { window.x_off as isize },
                    chunk_width: qx_size,
                    chunk_y_off: qy_off as isize
                        - if has_y_virtual { 0 } else { window.y_off as isize },
                    chunk_height: qy_size,
                    dst_x_start: dst_x + x_virtual,
                    dst_x_end: dst_x + x_virtual + dst_x_count,
                    dst_y_start: dst_y + y_virtual,
                    dst_y_end: dst_y + y_virtual + dst_y_count,
                    nodata,
                };
                kernels::resample_chunk(opts.resample, &params, work);
            }

            blocks_done += 1;
            if let Some(progress) = opts.progress.as_mut() {
                if !progress(blocks_done as f64 / total_blocks as f64) {
                    return Err(GridioError::Interrupted);
                }
            }

            dst_x += dst_x_count;
        }
        dst_y += dst_y_count;
    }
    Ok(())
}

/// View of an `f32` slice as native-endian bytes.
fn f32_bytes_mut(values: &mut [f32]) -> &mut [u8] {
    unsafe {
        std::slice::from_raw_parts_mut(
            values.as_mut_ptr().cast::<u8>(),
            std::mem::size_of_val(values),
        )
    }
}
