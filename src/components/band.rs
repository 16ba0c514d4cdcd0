use std::{
    ops::{Deref, DerefMut},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use log::warn;

use crate::{
    components::{
        block::{BlockCache, BlockStore},
        mem::MemStore,
        pixel::{Pixel, PixelType},
        warp::Warper,
        window::Window,
    },
    errors::{GridioError, Result},
};

/// Default per-band cache budget when the caller supplies none.
pub const DEFAULT_CACHE_BUDGET: usize = 64 * 1024 * 1024;

/// A reduced-resolution companion of a band, together with the tag of
/// the algorithm that produced it.
pub struct Overview {
    pub band: RasterBand,
    pub resampling: Option<String>,
}

/// Single band of a raster, addressed through a cache of fixed-size
/// blocks backed by a [`BlockStore`].
pub struct RasterBand {
    width: usize,
    height: usize,
    block_width: usize,
    block_height: usize,
    pixel_type: PixelType,
    nodata: Option<f64>,
    paletted: bool,
    compression: Option<String>,
    store: Arc<dyn BlockStore>,
    cache: BlockCache,
    overviews: Vec<Overview>,
    mask: Option<Box<RasterBand>>,
    warper: Option<Arc<dyn Warper>>,
    coverage: Option<Box<dyn Fn(Window) -> bool + Send + Sync>>,
    flush_err: Mutex<Option<String>>,
    interrupted: AtomicBool,
}

impl RasterBand {
    pub fn new(
        width: usize,
        height: usize,
        block_width: usize,
        block_height: usize,
        pixel_type: PixelType,
        store: Arc<dyn BlockStore>,
    ) -> Result<Self> {
        if block_width == 0 || block_height == 0 {
            return Err(GridioError::InvalidBlockSize);
        }
        let block_bytes = block_width * block_height * pixel_type.size_bytes();
        Ok(Self {
            width,
            height,
            block_width,
            block_height,
            pixel_type,
            nodata: None,
            paletted: false,
            compression: None,
            store,
            cache: BlockCache::new(block_bytes, DEFAULT_CACHE_BUDGET),
            overviews: Vec::new(),
            mask: None,
            warper: None,
            coverage: None,
            flush_err: Mutex::new(None),
            interrupted: AtomicBool::new(false),
        })
    }

    /// Band over a freshly zeroed in-memory store.
    pub fn in_memory(
        width: usize,
        height: usize,
        block_width: usize,
        block_height: usize,
        pixel_type: PixelType,
    ) -> Result<Self> {
        let store = MemStore::zeroed(width, height, block_width, block_height, pixel_type)?;
        Self::new(width, height, block_width, block_height, pixel_type, Arc::new(store))
    }

    /// Band over an in-memory store seeded with `pixels` in row-major order.
    pub fn from_pixels<T: Pixel>(
        width: usize,
        height: usize,
        block_width: usize,
        block_height: usize,
        pixels: &[T],
    ) -> Result<Self> {
        let store = MemStore::from_pixels(width, height, block_width, block_height, pixels)?;
        Self::new(width, height, block_width, block_height, T::TYPE, Arc::new(store))
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn with_paletted(mut self, paletted: bool) -> Self {
        self.paletted = paletted;
        self
    }

    pub fn with_compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    pub fn with_cache_budget(mut self, budget_bytes: usize) -> Self {
        let block_bytes = self.block_width * self.block_height * self.pixel_type.size_bytes();
        self.cache = BlockCache::new(block_bytes, budget_bytes);
        self
    }

    pub fn with_overview(mut self, band: RasterBand, resampling: Option<String>) -> Self {
        self.overviews.push(Overview { band, resampling });
        self
    }

    pub fn with_mask(mut self, mask: RasterBand) -> Self {
        self.mask = Some(Box::new(mask));
        self
    }

    pub fn with_warper(mut self, warper: Arc<dyn Warper>) -> Self {
        self.warper = Some(warper);
        self
    }

    /// Callback reporting whether a window intersects any stored data.
    /// Used to skip holes during whole-raster copies.
    pub fn with_coverage(
        mut self,
        coverage: impl Fn(Window) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.coverage = Some(Box::new(coverage));
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn block_width(&self) -> usize {
        self.block_width
    }

    pub fn block_height(&self) -> usize {
        self.block_height
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn is_paletted(&self) -> bool {
        self.paletted
    }

    pub fn compression(&self) -> Option<&str> {
        self.compression.as_deref()
    }

    pub fn overviews(&self) -> &[Overview] {
        &self.overviews
    }

    pub fn mask(&self) -> Option<&RasterBand> {
        self.mask.as_deref()
    }

    pub(crate) fn warper(&self) -> Option<&Arc<dyn Warper>> {
        self.warper.as_ref()
    }

    pub fn blocks_across(&self) -> usize {
        self.width.div_ceil(self.block_width)
    }

    pub fn blocks_down(&self) -> usize {
        self.height.div_ceil(self.block_height)
    }

    pub(crate) fn pixel_bytes(&self) -> usize {
        self.pixel_type.size_bytes()
    }

    /// True when `window` may contain stored data. Bands without a
    /// coverage callback report everything as data.
    pub fn has_data(&self, window: Window) -> bool {
        match &self.coverage {
            Some(f) => f(window),
            None => true,
        }
    }

    /// Request cancellation of in-flight transfers on this band. Block
    /// acquisition refuses with [`GridioError::Interrupted`] while set.
    pub fn set_interrupted(&self, value: bool) {
        self.interrupted.store(value, Ordering::Relaxed);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Relaxed)
    }

    /// Pin the block at (`col`, `row`) for exclusive access. With
    /// `just_initialize` the block contents are zeroed instead of read,
    /// for callers about to overwrite every word of it.
    pub fn acquire_block(
        &self,
        col: usize,
        row: usize,
        just_initialize: bool,
    ) -> Result<BlockLock<'_>> {
        if self.is_interrupted() {
            return Err(GridioError::Interrupted);
        }
        let data = self
            .cache
            .check_out(self.store.as_ref(), col, row, just_initialize)?;
        Ok(BlockLock {
            band: self,
            col,
            row,
            data: Some(data),
            dirty: false,
        })
    }

    /// Error deferred from a failed dirty-block flush, if one is
    /// pending. Taking it clears the slot.
    pub fn take_flush_error(&self) -> Option<GridioError> {
        self.flush_err
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .map(GridioError::PendingFlush)
    }

    fn record_flush_error(&self, err: GridioError) {
        warn!("deferred block flush failure: {err}");
        let mut slot = self.flush_err.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(err.to_string());
        }
    }
}

impl std::fmt::Debug for RasterBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterBand")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("block_width", &self.block_width)
            .field("block_height", &self.block_height)
            .field("pixel_type", &self.pixel_type)
            .field("nodata", &self.nodata)
            .field("overviews", &self.overviews.len())
            .finish()
    }
}

/// Scoped pin on one cached block. The block is checked back in when
/// the lock drops, on every exit path; a dirty block is written through
/// to the store first, and a failed write is recorded on the band to be
/// surfaced by the next I/O call.
pub struct BlockLock<'a> {
    band: &'a RasterBand,
    col: usize,
    row: usize,
    data: Option<Box<[u8]>>,
    dirty: bool,
}

impl BlockLock<'_> {
    pub fn col(&self) -> usize {
        self.col
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

impl Deref for BlockLock<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data.as_ref().expect("block lock holds its buffer")
    }
}

impl DerefMut for BlockLock<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.data.as_mut().expect("block lock holds its buffer")
    }
}

impl Drop for BlockLock<'_> {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            if let Err(err) = self.band.cache.check_in(
                self.band.store.as_ref(),
                self.col,
                self.row,
                data,
                self.dirty,
            ) {
                self.band.record_flush_error(err);
            }
        }
    }
}
