use std::sync::Mutex;

use crate::{
    components::{
        block::{alloc_zeroed, BlockStore},
        pixel::{Pixel, PixelType},
        words,
    },
    errors::Result,
};

/// In-memory block storage. Backs test rasters and any band whose pixels
/// live entirely in RAM; edge blocks read back zero outside the raster.
pub struct MemStore {
    width: usize,
    height: usize,
    block_width: usize,
    block_height: usize,
    word_bytes: usize,
    data: Mutex<Box<[u8]>>,
}

impl MemStore {
    pub fn zeroed(
        width: usize,
        height: usize,
        block_width: usize,
        block_height: usize,
        pixel_type: PixelType,
    ) -> Result<Self> {
        let word_bytes = pixel_type.size_bytes();
        Ok(Self {
            width,
            height,
            block_width,
            block_height,
            word_bytes,
            data: Mutex::new(alloc_zeroed(width * height * word_bytes)?),
        })
    }

    /// Build a store from a packed row-major pixel slice.
    pub fn from_pixels<T: Pixel>(
        width: usize,
        height: usize,
        block_width: usize,
        block_height: usize,
        pixels: &[T],
    ) -> Result<Self> {
        assert_eq!(pixels.len(), width * height);
        let store = Self::zeroed(width, height, block_width, block_height, T::TYPE)?;
        {
            let mut data = store.data.lock().unwrap_or_else(|e| e.into_inner());
            let bytes = unsafe {
                std::slice::from_raw_parts(pixels.as_ptr().cast::<u8>(), std::mem::size_of_val(pixels))
            };
            data.copy_from_slice(bytes);
        }
        Ok(store)
    }

    /// Snapshot of the raster as packed bytes.
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).to_vec()
    }
}

impl BlockStore for MemStore {
    fn read_block(&self, col: usize, row: usize, buf: &mut [u8]) -> Result<()> {
        let data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        buf.fill(0);
        let x0 = col * self.block_width;
        let y0 = row * self.block_height;
        let cols = self.block_width.min(self.width.saturating_sub(x0));
        for by in 0..self.block_height.min(self.height.saturating_sub(y0)) {
            let src = ((y0 + by) * self.width + x0) * self.word_bytes;
            let dst = by * self.block_width * self.word_bytes;
            buf[dst..dst + cols * self.word_bytes]
                .copy_from_slice(&data[src..src + cols * self.word_bytes]);
        }
        Ok(())
    }

    fn write_block(&self, col: usize, row: usize, buf: &[u8]) -> Result<()> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        let x0 = col * self.block_width;
        let y0 = row * self.block_height;
        let cols = self.block_width.min(self.width.saturating_sub(x0));
        for by in 0..self.block_height.min(self.height.saturating_sub(y0)) {
            let dst = ((y0 + by) * self.width + x0) * self.word_bytes;
            let src = by * self.block_width * self.word_bytes;
            data[dst..dst + cols * self.word_bytes]
                .copy_from_slice(&buf[src..src + cols * self.word_bytes]);
        }
        Ok(())
    }
}

/// Packed row-major raster owned by the engine; the destination the
/// filtered resampling path (and the warp delegate) writes through before
/// the result is converted into the caller's buffer.
///
/// The raster may sit at a virtual origin: accessors take absolute
/// coordinates and subtract the origin, so only `width * height` pixels
/// are ever stored.
pub struct MemRaster {
    width: usize,
    height: usize,
    pixel_type: PixelType,
    x_origin: usize,
    y_origin: usize,
    data: Box<[u8]>,
}

impl MemRaster {
    pub fn new(width: usize, height: usize, pixel_type: PixelType) -> Result<Self> {
        Ok(Self {
            width,
            height,
            pixel_type,
            x_origin: 0,
            y_origin: 0,
            data: alloc_zeroed(width * height * pixel_type.size_bytes())?,
        })
    }

    pub fn with_origin(mut self, x: usize, y: usize) -> Self {
        self.x_origin = x;
        self.y_origin = y;
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    /// Packed bytes of one row.
    pub fn row(&self, y: usize) -> &[u8] {
        let y = y - self.y_origin;
        let stride = self.width * self.pixel_type.size_bytes();
        &self.data[y * stride..(y + 1) * stride]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let y = y - self.y_origin;
        let stride = self.width * self.pixel_type.size_bytes();
        &mut self.data[y * stride..(y + 1) * stride]
    }

    /// Store a real working value at (`x`, `y`), clipping to the raster's
    /// pixel type.
    pub fn set_real(&mut self, x: usize, y: usize, v: f64) {
        let size = self.pixel_type.size_bytes();
        let off = ((y - self.y_origin) * self.width + (x - self.x_origin)) * size;
        words::store_f64(self.pixel_type, &mut self.data[off..off + size], v);
    }

    pub fn get_real(&self, x: usize, y: usize) -> f64 {
        let size = self.pixel_type.size_bytes();
        let off = ((y - self.y_origin) * self.width + (x - self.x_origin)) * size;
        words::load_f64(self.pixel_type, &self.data[off..off + size])
    }
}
