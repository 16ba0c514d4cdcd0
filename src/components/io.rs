use log::warn;

use crate::{
    components::{
        band::RasterBand,
        overview::best_overview_level,
        pixel::Pixel,
        resample::raster_io_resampled,
        window::{BufferLayout, FloatWindow, Window},
        words::copy_words,
        ResampleAlg, RwFlag,
    },
    errors::{GridioError, Result},
};

/// Margin added before truncating fractional source coordinates, so
/// that ratios which should land exactly on an integer do.
const COORD_EPS: f64 = 1e-10;

/// Per-request options beyond the window and buffer layout.
#[derive(Default)]
pub struct IoOpts<'a> {
    pub resample: ResampleAlg,
    /// Fractional request window, carried alongside the integer one
    /// when the caller's window is not pixel aligned.
    pub float_window: Option<FloatWindow>,
    /// Called with completion in `[0, 1]`; returning `false` cancels
    /// the transfer.
    pub progress: Option<&'a mut dyn FnMut(f64) -> bool>,
    /// Permit heavily decimated reads without a suitable overview to
    /// return zeros instead of scanning the full-resolution band.
    pub allow_approx_overview: bool,
}

impl IoOpts<'_> {
    fn report(&mut self, complete: f64) -> Result<()> {
        if let Some(progress) = self.progress.as_mut() {
            if !progress(complete) {
                return Err(GridioError::Interrupted);
            }
        }
        Ok(())
    }
}

impl RasterBand {
    /// Transfers a window of the band into (or out of) a caller buffer,
    /// honoring the buffer's pixel type and strides. The source window
    /// and buffer may differ in size, in which case reads resample.
    pub fn raster_io(
        &self,
        rw: RwFlag,
        window: Window,
        buf: &mut [u8],
        layout: &BufferLayout,
        opts: &mut IoOpts,
    ) -> Result<()> {
        if rw == RwFlag::Write {
            if let Some(err) = self.take_flush_error() {
                return Err(err);
            }
        }
        window.check_within(self.width(), self.height())?;
        layout.check_buffer(buf.len())?;

        let buf_bytes = layout.pixel_type.size_bytes();
        let integer_coords = opts
            .float_window
            .map_or(true, |fw| fw.matches(&window));

        // Packed buffer covering full-width blocks row for row.
        if layout.pixel_stride == buf_bytes
            && layout.line_stride == layout.pixel_stride * window.x_size
            && self.block_width() == self.width()
            && layout.width == window.x_size
            && layout.height == window.y_size
            && integer_coords
        {
            return self.io_packed_rows(rw, window, buf, layout, opts);
        }

        if rw == RwFlag::Read
            && (layout.width < window.x_size || layout.height < window.y_size)
            && !self.overviews().is_empty()
        {
            let mut ovr_window = window;
            let mut ovr_float = opts.float_window;
            if let Some(level) = best_overview_level(
                self,
                &mut ovr_window,
                layout.width,
                layout.height,
                &mut ovr_float,
            ) {
                let ovr = &self.overviews()[level].band;
                let saved = opts.float_window;
                opts.float_window = ovr_float;
                let result = ovr.raster_io(rw, ovr_window, buf, layout, opts);
                opts.float_window = saved;
                return result;
            }
        }

        if rw == RwFlag::Read
            && opts.allow_approx_overview
            && layout.width < window.x_size / 100
            && layout.height < window.y_size / 100
            && layout.is_packed()
        {
            buf[..layout.line_stride * layout.height].fill(0);
            return Ok(());
        }

        // Unscaled transfer, possibly with type conversion or strides.
        if window.x_size == layout.width && window.y_size == layout.height && integer_coords {
            return self.io_unscaled(rw, window, buf, layout, opts);
        }

        match rw {
            RwFlag::Write => self.io_write_scaled(window, buf, layout, opts),
            RwFlag::Read => {
                match opts.resample {
                    ResampleAlg::NearestNeighbour => {}
                    ResampleAlg::Bilinear
                    | ResampleAlg::Cubic
                    | ResampleAlg::CubicSpline
                    | ResampleAlg::Lanczos
                        if self.is_paletted() =>
                    {
                        warn!(
                            "resampling method not supported on paletted band, \
                             falling back to nearest neighbour"
                        );
                    }
                    ResampleAlg::Gauss if self.pixel_type().is_complex() => {
                        warn!(
                            "gauss resampling not supported on complex band, \
                             falling back to nearest neighbour"
                        );
                    }
                    _ => return raster_io_resampled(self, window, buf, layout, opts),
                }
                self.io_read_nearest(window, buf, layout, opts)
            }
        }
    }

    /// Reads a window into a freshly allocated `Vec<T>`, converting from
    /// the band's own type where it differs.
    pub fn read_pixels<T: Pixel>(&self, window: Window) -> Result<Vec<T>> {
        let mut out = vec![T::zero(); window.x_size * window.y_size];
        let layout = BufferLayout::packed(window.x_size, window.y_size, T::TYPE);
        let bytes = unsafe {
            std::slice::from_raw_parts_mut(
                out.as_mut_ptr().cast::<u8>(),
                std::mem::size_of_val(out.as_slice()),
            )
        };
        self.raster_io(RwFlag::Read, window, bytes, &layout, &mut IoOpts::default())?;
        Ok(out)
    }

    /// Writes a packed `T` slice into a window of the band.
    pub fn write_pixels<T: Pixel>(&self, window: Window, pixels: &[T]) -> Result<()> {
        if pixels.len() != window.x_size * window.y_size {
            return Err(GridioError::SizeMismatch);
        }
        let mut bytes = unsafe {
            std::slice::from_raw_parts(pixels.as_ptr().cast::<u8>(), std::mem::size_of_val(pixels))
        }
        .to_vec();
        let layout = BufferLayout::packed(window.x_size, window.y_size, T::TYPE);
        self.raster_io(RwFlag::Write, window, &mut bytes, &layout, &mut IoOpts::default())
    }

    /// Case of a packed buffer against full-width blocks: one straight
    /// copy per row.
    fn io_packed_rows(
        &self,
        rw: RwFlag,
        window: Window,
        buf: &mut [u8],
        layout: &BufferLayout,
        opts: &mut IoOpts,
    ) -> Result<()> {
        let bh = self.block_height();
        let bw = self.block_width();
        let band_bytes = self.pixel_bytes();
        let same_type = self.pixel_type() == layout.pixel_type;
        let write = rw == RwFlag::Write;

        let mut buf_y = 0;
        while buf_y < layout.height {
            let src_y = buf_y + window.y_off;
            let block_row = src_y / bh;

            let mut just_initialize = write
                && window.x_off == 0
                && window.x_size == bw
                && window.y_off <= block_row * bh
                && window.y_off + window.y_size >= block_row * bh + bh;

            // A partial block at the bottom edge that the request fully
            // covers is zeroed rather than read, so that words past the
            // validity area hold defined values.
            let mut mem_zero = false;
            if write
                && !just_initialize
                && window.x_off == 0
                && window.x_size == bw
                && window.y_off <= block_row * bh
                && window.y_off + window.y_size == self.height()
                && block_row * bh + bh > self.height()
            {
                just_initialize = true;
                mem_zero = true;
            }

            let mut block = self.acquire_block(0, block_row, just_initialize)?;
            if write {
                block.mark_dirty();
            }
            if mem_zero {
                block.fill(0);
            }

            let rows = (bh - src_y % bh).min(layout.height - buf_y);
            for k in 0..rows {
                let block_off = ((src_y + k - block_row * bh) * bw + window.x_off) * band_bytes;
                let buf_off = (buf_y + k) * layout.line_stride;
                if same_type {
                    let span = layout.width * band_bytes;
                    if write {
                        block[block_off..block_off + span]
                            .copy_from_slice(&buf[buf_off..buf_off + span]);
                    } else {
                        buf[buf_off..buf_off + span]
                            .copy_from_slice(&block[block_off..block_off + span]);
                    }
                } else if write {
                    copy_words(
                        &buf[buf_off..],
                        layout.pixel_type,
                        layout.pixel_stride,
                        &mut block[block_off..],
                        self.pixel_type(),
                        band_bytes,
                        layout.width,
                    );
                } else {
                    copy_words(
                        &block[block_off..],
                        self.pixel_type(),
                        band_bytes,
                        &mut buf[buf_off..],
                        layout.pixel_type,
                        layout.pixel_stride,
                        layout.width,
                    );
                }

                opts.report((buf_y + k + 1) as f64 / layout.height as f64)?;
            }
            buf_y += rows;
        }
        Ok(())
    }

    /// Same-size transfer chunked by block spans, with strides and type
    /// conversion as needed.
    fn io_unscaled(
        &self,
        rw: RwFlag,
        window: Window,
        buf: &mut [u8],
        layout: &BufferLayout,
        opts: &mut IoOpts,
    ) -> Result<()> {
        let bw = self.block_width();
        let bh = self.block_height();
        let band_bytes = self.pixel_bytes();
        let buf_bytes = layout.pixel_type.size_bytes();
        let same_type = self.pixel_type() == layout.pixel_type;
        let write = rw == RwFlag::Write;

        let start_block_col = window.x_off / bw;
        let x_span_end = window.x_off + layout.width;

        let mut buf_y = 0;
        let mut src_y = window.y_off;
        while buf_y < layout.height {
            let block_row = src_y / bh;
            let mut block_col = start_block_col;
            let mut src_x = window.x_off;
            let mut buf_offset = buf_y * layout.line_stride;

            while src_x < x_span_end {
                let x_right = (block_col + 1) * bw;
                let span = x_right.min(x_span_end) - src_x;
                let span_bytes = span * layout.pixel_stride;

                let mut just_initialize = write
                    && window.y_off <= block_row * bh
                    && window.y_off + window.y_size >= block_row * bh + bh
                    && window.x_off <= block_col * bw
                    && window.x_off + window.x_size >= x_right;

                // Partial blocks at the right or bottom raster edge that
                // the request covers in full get zeroed instead of read.
                let mut mem_zero = false;
                if write
                    && !just_initialize
                    && window.x_off <= block_col * bw
                    && window.y_off <= block_row * bh
                    && (window.x_off + window.x_size >= x_right
                        || (window.x_off + window.x_size == self.width()
                            && x_right > self.width()))
                    && (window.y_off + window.y_size >= block_row * bh + bh
                        || (window.y_off + window.y_size == self.height()
                            && block_row * bh + bh > self.height()))
                {
                    just_initialize = true;
                    mem_zero = true;
                }

                let mut block = self.acquire_block(block_col, block_row, just_initialize)?;
                if write {
                    block.mark_dirty();
                }
                if mem_zero {
                    block.fill(0);
                }

                let mut block_offset =
                    (src_x - block_col * bw + (src_y - block_row * bh) * bw) * band_bytes;
                let rows = (bh - src_y % bh).min(layout.height - buf_y);
                for k in 0..rows {
                    let line = buf_offset + k * layout.line_stride;
                    if same_type && layout.pixel_stride == buf_bytes {
                        let bytes = span * band_bytes;
                        if write {
                            block[block_offset..block_offset + bytes]
                                .copy_from_slice(&buf[line..line + bytes]);
                        } else {
                            buf[line..line + bytes]
                                .copy_from_slice(&block[block_offset..block_offset + bytes]);
                        }
                    } else if write {
                        copy_words(
                            &buf[line..],
                            layout.pixel_type,
                            layout.pixel_stride,
                            &mut block[block_offset..],
                            self.pixel_type(),
                            band_bytes,
                            span,
                        );
                    } else {
                        copy_words(
                            &block[block_offset..],
                            self.pixel_type(),
                            band_bytes,
                            &mut buf[line..],
                            layout.pixel_type,
                            layout.pixel_stride,
                            span,
                        );
                    }
                    block_offset += bw * band_bytes;
                }

                buf_offset += span_bytes;
                block_col += 1;
                src_x += span;
            }

            let y_inc = bh - src_y % bh;
            opts.report(
                (buf_y + y_inc).min(layout.height) as f64 / layout.height as f64,
            )?;
            buf_y += y_inc;
            src_y += y_inc;
        }
        Ok(())
    }

    /// Scaled write: walk the raster window pixel by pixel, mapping back
    /// into the buffer.
    fn io_write_scaled(
        &self,
        window: Window,
        buf: &mut [u8],
        layout: &BufferLayout,
        opts: &mut IoOpts,
    ) -> Result<()> {
        let bw = self.block_width();
        let bh = self.block_height();
        let band_bytes = self.pixel_bytes();
        let same_type = self.pixel_type() == layout.pixel_type;

        let (fw_x_size, fw_y_size) = match opts.float_window {
            Some(fw) => (fw.x_size, fw.y_size),
            None => (window.x_size as f64, window.y_size as f64),
        };
        let src_x_inc = fw_x_size / layout.width as f64;
        let src_y_inc = fw_y_size / layout.height as f64;

        for dst_y in window.y_off..window.y_off + window.y_size {
            let block_row = dst_y / bh;
            let buf_y = ((dst_y - window.y_off) as f64 / src_y_inc) as usize;

            let mut x = window.x_off;
            while x < window.x_off + window.x_size {
                let block_col = x / bw;
                let x_end = ((block_col + 1) * bw).min(window.x_off + window.x_size);

                let just_initialize = window.y_off <= block_row * bh
                    && window.y_off + window.y_size >= block_row * bh + bh
                    && window.x_off <= block_col * bw
                    && window.x_off + window.x_size >= block_col * bw + bw;

                let mut block = self.acquire_block(block_col, block_row, just_initialize)?;
                block.mark_dirty();

                for dst_x in x..x_end {
                    let buf_x = ((dst_x - window.x_off) as f64 / src_x_inc) as usize;
                    let buf_offset = buf_y * layout.line_stride + buf_x * layout.pixel_stride;
                    let block_offset =
                        (dst_x - block_col * bw + (dst_y - block_row * bh) * bw) * band_bytes;

                    if same_type {
                        block[block_offset..block_offset + band_bytes]
                            .copy_from_slice(&buf[buf_offset..buf_offset + band_bytes]);
                    } else {
                        copy_words(
                            &buf[buf_offset..],
                            layout.pixel_type,
                            0,
                            &mut block[block_offset..],
                            self.pixel_type(),
                            0,
                            1,
                        );
                    }
                }
                x = x_end;
            }

            opts.report((dst_y - window.y_off + 1) as f64 / window.y_size as f64)?;
        }
        Ok(())
    }

    /// Scaled nearest-neighbour read, iterating source blocks and
    /// filling the buffer region each block maps onto.
    fn io_read_nearest(
        &self,
        window: Window,
        buf: &mut [u8],
        layout: &BufferLayout,
        opts: &mut IoOpts,
    ) -> Result<()> {
        let bw = self.block_width();
        let bh = self.block_height();
        let band_bytes = self.pixel_bytes();
        let byte_copy = self.pixel_type() == layout.pixel_type && band_bytes == 1;
        let same_type = self.pixel_type() == layout.pixel_type;

        let (fw_x_size, fw_y_size) = match opts.float_window {
            Some(fw) => (fw.x_size, fw.y_size),
            None => (window.x_size as f64, window.y_size as f64),
        };
        let src_x_inc = fw_x_size / layout.width as f64;
        let src_y_inc = fw_y_size / layout.height as f64;

        let start_block_col = window.x_off / bw;
        let start_block_row = window.y_off / bh;
        let end_block_col = (window.x_off + window.x_size - 1) / bw;
        let end_block_row = (window.y_off + window.y_size - 1) / bh;

        for block_row in start_block_row..=end_block_row {
            for block_col in start_block_col..=end_block_col {
                let block = self.acquire_block(block_col, block_row, false)?;

                let row_floor = block_row * bh;
                let row_ceil = row_floor + bh;
                let col_floor = block_col * bw;
                let col_ceil = col_floor + bw;

                let buf_y_start = if row_floor > window.y_off {
                    ((row_floor - window.y_off) as f64 / src_y_inc) as usize
                } else {
                    0
                };
                let buf_y_lim = (((row_ceil as f64 - window.y_off as f64) / src_y_inc).ceil()
                    as usize)
                    .min(layout.height);

                let buf_x_start = if col_floor > window.x_off {
                    ((col_floor - window.x_off) as f64 / src_x_inc) as usize
                } else {
                    0
                };
                let buf_x_lim = (((col_ceil as f64 - window.x_off as f64) / src_x_inc).ceil()
                    as usize)
                    .min(layout.width);

                for buf_y in buf_y_start..buf_y_lim {
                    let src_y = ((buf_y as f64 + 0.5) * src_y_inc
                        + window.y_off as f64
                        + COORD_EPS) as usize;
                    let src_y = src_y.clamp(row_floor, row_ceil - 1);
                    let row_words = (src_y - row_floor) * bw;

                    let mut buf_offset =
                        buf_y * layout.line_stride + buf_x_start * layout.pixel_stride;

                    for buf_x in buf_x_start..buf_x_lim {
                        let src_x = ((buf_x as f64 + 0.5) * src_x_inc
                            + window.x_off as f64
                            + COORD_EPS) as usize;
                        let src_x = src_x.clamp(col_floor, col_ceil - 1);
                        let src_offset = (row_words + src_x - col_floor) * band_bytes;

                        if byte_copy {
                            buf[buf_offset] = block[src_offset];
                        } else if same_type {
                            buf[buf_offset..buf_offset + band_bytes]
                                .copy_from_slice(&block[src_offset..src_offset + band_bytes]);
                        } else {
                            copy_words(
                                &block[src_offset..],
                                self.pixel_type(),
                                0,
                                &mut buf[buf_offset..],
                                layout.pixel_type,
                                0,
                                1,
                            );
                        }

                        buf_offset += layout.pixel_stride;
                    }

                    opts.report((buf_y + 1) as f64 / layout.height as f64)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use rstest::rstest;

    use super::*;
    use crate::{
        components::{
            block::BlockStore,
            mem::{MemRaster, MemStore},
            pixel::PixelType,
            warp::{WarpRequest, Warper},
        },
        errors::GridioError,
    };

    fn read_u8(band: &RasterBand, window: Window, w: usize, h: usize) -> Vec<u8> {
        let layout = BufferLayout::packed(w, h, PixelType::U8);
        let mut buf = vec![0u8; w * h];
        band.raster_io(RwFlag::Read, window, &mut buf, &layout, &mut IoOpts::default())
            .unwrap();
        buf
    }

    #[test]
    fn full_width_blocks_round_trip() {
        let pixels: Vec<u8> = (0..48).map(|v| v as u8).collect();
        let band = RasterBand::from_pixels::<u8>(8, 6, 8, 2, &pixels).unwrap();
        assert_eq!(read_u8(&band, Window::full(8, 6), 8, 6), pixels);
    }

    #[test]
    fn tiled_window_round_trip() {
        let pixels: Vec<u8> = (0..100).map(|v| v as u8).collect();
        let band = RasterBand::from_pixels::<u8>(10, 10, 4, 4, &pixels).unwrap();
        // Window straddling four blocks.
        let got = read_u8(&band, Window::new(2, 2, 5, 5), 5, 5);
        let mut expect = Vec::new();
        for y in 2..7 {
            for x in 2..7 {
                expect.push(pixels[y * 10 + x]);
            }
        }
        assert_eq!(got, expect);
    }

    #[rstest]
    #[case::u8(PixelType::U8)]
    #[case::i8(PixelType::I8)]
    #[case::u16(PixelType::U16)]
    #[case::i16(PixelType::I16)]
    #[case::u32(PixelType::U32)]
    #[case::i32(PixelType::I32)]
    #[case::f32(PixelType::F32)]
    #[case::f64(PixelType::F64)]
    #[case::ci16(PixelType::CI16)]
    #[case::ci32(PixelType::CI32)]
    #[case::cf32(PixelType::CF32)]
    #[case::cf64(PixelType::CF64)]
    fn write_then_read_back(#[case] ty: PixelType) {
        let band = RasterBand::in_memory(9, 7, 4, 3, ty).unwrap();
        let layout = BufferLayout::packed(5, 4, PixelType::F64);
        let values: Vec<f64> = (0..20).map(|v| v as f64).collect();
        let mut buf: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        let window = Window::new(3, 2, 5, 4);
        band.raster_io(RwFlag::Write, window, &mut buf, &layout, &mut IoOpts::default())
            .unwrap();

        let mut out = vec![0u8; 20 * 8];
        band.raster_io(RwFlag::Read, window, &mut out, &layout, &mut IoOpts::default())
            .unwrap();
        let got: Vec<f64> = out
            .chunks_exact(8)
            .map(|c| f64::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(got, values);
    }

    #[test]
    fn complex_band_round_trips_both_components() {
        let band = RasterBand::in_memory(4, 4, 2, 2, PixelType::CF32).unwrap();
        let layout = BufferLayout::packed(4, 4, PixelType::CF32);
        let mut buf: Vec<u8> = (0..32)
            .flat_map(|n| (n as f32 - 7.5).to_ne_bytes())
            .collect();
        band.raster_io(
            RwFlag::Write,
            Window::full(4, 4),
            &mut buf,
            &layout,
            &mut IoOpts::default(),
        )
        .unwrap();

        let mut out = vec![0u8; buf.len()];
        band.raster_io(
            RwFlag::Read,
            Window::full(4, 4),
            &mut out,
            &layout,
            &mut IoOpts::default(),
        )
        .unwrap();
        assert_eq!(out, buf);
    }

    #[test]
    fn typed_helpers_convert_between_types() {
        let band = RasterBand::in_memory(4, 4, 4, 2, PixelType::U16).unwrap();
        let values: Vec<u16> = (0..16u16).map(|v| v * 40).collect();
        band.write_pixels(Window::full(4, 4), &values).unwrap();

        let got: Vec<f64> = band.read_pixels(Window::full(4, 4)).unwrap();
        let expect: Vec<f64> = values.iter().map(|&v| v as f64).collect();
        assert_eq!(got, expect);

        let err = band.write_pixels(Window::full(4, 4), &values[..4]).unwrap_err();
        assert!(matches!(err, GridioError::SizeMismatch));
    }

    #[test]
    fn conversion_clamps_on_read() {
        let pixels = [100u16, 300, 65535, 0];
        let band = RasterBand::from_pixels::<u16>(2, 2, 2, 2, &pixels).unwrap();
        assert_eq!(read_u8(&band, Window::full(2, 2), 2, 2), [100, 255, 255, 0]);
    }

    #[test]
    fn strided_buffer_reads_into_interleaved_slots() {
        let pixels = [1u8, 2, 3, 4];
        let band = RasterBand::from_pixels::<u8>(2, 2, 2, 2, &pixels).unwrap();
        let layout = BufferLayout {
            width: 2,
            height: 2,
            pixel_type: PixelType::U8,
            pixel_stride: 3,
            line_stride: 6,
        };
        let mut buf = vec![0xAAu8; 12];
        band.raster_io(
            RwFlag::Read,
            Window::full(2, 2),
            &mut buf,
            &layout,
            &mut IoOpts::default(),
        )
        .unwrap();
        assert_eq!(buf[0], 1);
        assert_eq!(buf[3], 2);
        assert_eq!(buf[6], 3);
        assert_eq!(buf[9], 4);
        assert_eq!(buf[1], 0xAA);
    }

    #[test]
    fn nearest_downsample_picks_center_pixels() {
        let pixels: Vec<u8> = (0..16).map(|v| v as u8).collect();
        let band = RasterBand::from_pixels::<u8>(4, 4, 2, 2, &pixels).unwrap();
        // 2x reduction samples at source columns and rows 1 and 3.
        let got = read_u8(&band, Window::full(4, 4), 2, 2);
        assert_eq!(got, [pixels[5], pixels[7], pixels[13], pixels[15]]);
    }

    #[test]
    fn upsample_replicates_pixels() {
        let pixels = [10u8, 20, 30, 40];
        let band = RasterBand::from_pixels::<u8>(2, 2, 2, 2, &pixels).unwrap();
        let got = read_u8(&band, Window::full(2, 2), 4, 4);
        assert_eq!(
            got,
            [10, 10, 20, 20, 10, 10, 20, 20, 30, 30, 40, 40, 30, 30, 40, 40]
        );
    }

    struct CountingStore {
        inner: MemStore,
        reads: AtomicUsize,
    }

    impl BlockStore for CountingStore {
        fn read_block(&self, col: usize, row: usize, buf: &mut [u8]) -> crate::Result<()> {
            self.reads.fetch_add(1, Ordering::Relaxed);
            self.inner.read_block(col, row, buf)
        }

        fn write_block(&self, col: usize, row: usize, buf: &[u8]) -> crate::Result<()> {
            self.inner.write_block(col, row, buf)
        }
    }

    #[test]
    fn cancelled_read_stops_acquiring_blocks() {
        let store = Arc::new(CountingStore {
            inner: MemStore::zeroed(4, 4, 4, 1, PixelType::U8).unwrap(),
            reads: AtomicUsize::new(0),
        });
        let band =
            RasterBand::new(4, 4, 4, 1, PixelType::U8, store.clone()).unwrap();
        let layout = BufferLayout::packed(4, 4, PixelType::U8);
        let mut buf = vec![0u8; 16];
        let mut progress = |_c: f64| false;
        let mut opts = IoOpts {
            progress: Some(&mut progress),
            ..Default::default()
        };
        let err = band
            .raster_io(RwFlag::Read, Window::full(4, 4), &mut buf, &layout, &mut opts)
            .unwrap_err();
        assert!(matches!(err, GridioError::Interrupted));
        assert_eq!(store.reads.load(Ordering::Relaxed), 1);
    }

    struct BrokenSink;

    impl BlockStore for BrokenSink {
        fn read_block(&self, _col: usize, _row: usize, buf: &mut [u8]) -> crate::Result<()> {
            buf.fill(0);
            Ok(())
        }

        fn write_block(&self, _col: usize, _row: usize, _buf: &[u8]) -> crate::Result<()> {
            Err(GridioError::Storage("write refused".into()))
        }
    }

    #[test_log::test]
    fn failed_flush_surfaces_on_next_write() {
        let band = RasterBand::new(4, 4, 4, 4, PixelType::U8, Arc::new(BrokenSink))
            .unwrap()
            .with_cache_budget(0);
        let layout = BufferLayout::packed(4, 4, PixelType::U8);
        let mut buf = vec![7u8; 16];
        // The dirty block flushes on drop and fails silently.
        band.raster_io(
            RwFlag::Write,
            Window::full(4, 4),
            &mut buf,
            &layout,
            &mut IoOpts::default(),
        )
        .unwrap();
        let err = band
            .raster_io(
                RwFlag::Write,
                Window::full(4, 4),
                &mut buf,
                &layout,
                &mut IoOpts::default(),
            )
            .unwrap_err();
        assert!(matches!(err, GridioError::PendingFlush(_)));
        // The slot is cleared once reported.
        band.raster_io(
            RwFlag::Write,
            Window::full(4, 4),
            &mut buf,
            &layout,
            &mut IoOpts::default(),
        )
        .unwrap();
    }

    #[test]
    fn decimated_read_routes_through_overview() {
        let ovr_pixels = vec![9u8; 2500];
        let ovr = RasterBand::from_pixels::<u8>(50, 50, 50, 10, &ovr_pixels).unwrap();
        let band = RasterBand::from_pixels::<u8>(100, 100, 100, 10, &vec![1u8; 10000])
            .unwrap()
            .with_overview(ovr, None);
        let got = read_u8(&band, Window::full(100, 100), 50, 50);
        assert!(got.iter().all(|&v| v == 9));
    }

    #[test]
    fn approx_overview_returns_zeros_when_allowed() {
        let band = RasterBand::from_pixels::<u8>(512, 512, 64, 64, &vec![5u8; 512 * 512])
            .unwrap();
        let layout = BufferLayout::packed(4, 4, PixelType::U8);
        let mut buf = vec![0xFFu8; 16];
        let mut opts = IoOpts {
            allow_approx_overview: true,
            ..Default::default()
        };
        band.raster_io(
            RwFlag::Read,
            Window::full(512, 512),
            &mut buf,
            &layout,
            &mut opts,
        )
        .unwrap();
        assert!(buf.iter().all(|&v| v == 0));
    }

    #[test]
    fn bilinear_subwindow_matches_whole_raster() {
        let pixels: Vec<u8> = (0..256).map(|v| (v * 7 % 251) as u8).collect();
        let band = RasterBand::from_pixels::<u8>(16, 16, 8, 8, &pixels).unwrap();
        let band2 = RasterBand::from_pixels::<u8>(16, 16, 8, 8, &pixels).unwrap();

        let mut whole = vec![0u8; 64];
        let layout = BufferLayout::packed(8, 8, PixelType::U8);
        let mut opts = IoOpts {
            resample: ResampleAlg::Bilinear,
            ..Default::default()
        };
        band.raster_io(
            RwFlag::Read,
            Window::full(16, 16),
            &mut whole,
            &layout,
            &mut opts,
        )
        .unwrap();

        // The sub-window starts on a destination pixel boundary, so its
        // pixels must be identical to the whole-raster rendering.
        let mut sub = vec![0u8; 16];
        let sub_layout = BufferLayout::packed(4, 4, PixelType::U8);
        let mut opts = IoOpts {
            resample: ResampleAlg::Bilinear,
            ..Default::default()
        };
        band2
            .raster_io(
                RwFlag::Read,
                Window::new(8, 8, 8, 8),
                &mut sub,
                &sub_layout,
                &mut opts,
            )
            .unwrap();

        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(
                    sub[y * 4 + x],
                    whole[(y + 4) * 8 + (x + 4)],
                    "mismatch at ({x},{y})"
                );
            }
        }
    }

    #[test]
    fn average_downsample_of_constant_band() {
        let band = RasterBand::from_pixels::<u8>(8, 8, 8, 8, &[200u8; 64]).unwrap();
        let layout = BufferLayout::packed(2, 2, PixelType::U8);
        let mut buf = vec![0u8; 4];
        let mut opts = IoOpts {
            resample: ResampleAlg::Average,
            ..Default::default()
        };
        band.raster_io(
            RwFlag::Read,
            Window::full(8, 8),
            &mut buf,
            &layout,
            &mut opts,
        )
        .unwrap();
        assert_eq!(buf, [200, 200, 200, 200]);
    }

    struct ConstWarper(f64);

    impl Warper for ConstWarper {
        fn chunk_and_warp(
            &self,
            _src: &RasterBand,
            dst: &mut MemRaster,
            req: &WarpRequest,
            mut progress: Option<&mut dyn FnMut(f64) -> bool>,
        ) -> crate::Result<()> {
            for y in req.dst_y_off..req.dst_y_off + req.dst_height {
                for x in req.dst_x_off..req.dst_x_off + req.dst_width {
                    dst.set_real(x, y, self.0);
                }
            }
            if let Some(p) = progress.as_mut() {
                if !p(1.0) {
                    return Err(GridioError::Interrupted);
                }
            }
            Ok(())
        }
    }

    #[test]
    fn complex_band_delegates_to_warper() {
        let band = RasterBand::in_memory(8, 8, 8, 8, PixelType::CF32)
            .unwrap()
            .with_warper(Arc::new(ConstWarper(7.0)));
        let layout = BufferLayout::packed(4, 4, PixelType::CF32);
        let mut buf = vec![0u8; 16 * 8];
        let mut calls = 0usize;
        let mut progress = |_c: f64| {
            calls += 1;
            true
        };
        let mut opts = IoOpts {
            resample: ResampleAlg::Bilinear,
            progress: Some(&mut progress),
            ..Default::default()
        };
        band.raster_io(
            RwFlag::Read,
            Window::full(8, 8),
            &mut buf,
            &layout,
            &mut opts,
        )
        .unwrap();
        drop(opts);
        for n in 0..16 {
            let re = f32::from_ne_bytes(buf[n * 8..n * 8 + 4].try_into().unwrap());
            assert_eq!(re, 7.0);
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn complex_band_without_warper_is_unsupported() {
        let band = RasterBand::in_memory(8, 8, 8, 8, PixelType::CF32).unwrap();
        let layout = BufferLayout::packed(2, 2, PixelType::CF32);
        let mut buf = vec![0u8; 4 * 8];
        let mut opts = IoOpts {
            resample: ResampleAlg::Bilinear,
            ..Default::default()
        };
        let err = band
            .raster_io(
                RwFlag::Read,
                Window::full(8, 8),
                &mut buf,
                &layout,
                &mut opts,
            )
            .unwrap_err();
        assert!(matches!(err, GridioError::Unsupported(_)));
    }

    #[test_log::test]
    fn paletted_band_falls_back_to_nearest() {
        let pixels: Vec<u8> = (0..16).map(|v| v as u8).collect();
        let band = RasterBand::from_pixels::<u8>(4, 4, 4, 4, &pixels)
            .unwrap()
            .with_paletted(true);
        let layout = BufferLayout::packed(2, 2, PixelType::U8);
        let mut buf = vec![0u8; 4];
        let mut opts = IoOpts {
            resample: ResampleAlg::Bilinear,
            ..Default::default()
        };
        band.raster_io(
            RwFlag::Read,
            Window::full(4, 4),
            &mut buf,
            &layout,
            &mut opts,
        )
        .unwrap();
        assert_eq!(buf, [pixels[5], pixels[7], pixels[13], pixels[15]]);
    }

    #[test]
    fn write_rejects_out_of_bounds_window() {
        let band = RasterBand::in_memory(4, 4, 4, 4, PixelType::U8).unwrap();
        let layout = BufferLayout::packed(4, 4, PixelType::U8);
        let mut buf = vec![0u8; 16];
        let err = band
            .raster_io(
                RwFlag::Write,
                Window::new(2, 2, 4, 4),
                &mut buf,
                &layout,
                &mut IoOpts::default(),
            )
            .unwrap_err();
        assert!(matches!(err, GridioError::WindowOutOfBounds { .. }));
    }

    #[test]
    fn scaled_write_fills_window() {
        let band = RasterBand::in_memory(4, 4, 2, 2, PixelType::U8).unwrap();
        let layout = BufferLayout::packed(2, 2, PixelType::U8);
        let mut buf = vec![0u8; 4];
        buf.copy_from_slice(&[10, 20, 30, 40]);
        band.raster_io(
            RwFlag::Write,
            Window::full(4, 4),
            &mut buf,
            &layout,
            &mut IoOpts::default(),
        )
        .unwrap();
        let got = read_u8(&band, Window::full(4, 4), 4, 4);
        assert_eq!(
            got,
            [10, 10, 20, 20, 10, 10, 20, 20, 30, 30, 40, 40, 30, 30, 40, 40]
        );
    }
}
