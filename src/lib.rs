mod components;
mod errors;

pub use components::{
    compute_swath_size, copy_band_whole_raster, copy_whole_raster, copy_words, replicate_word,
    value_range, BlockLock, BlockStore, BufferLayout, CopyOptions, Dataset, FloatWindow,
    Interleave, IoOpts,
    MemRaster, MemStore, Overview, Pixel, PixelType, RasterBand, ResampleAlg, RwFlag,
    WarpRequest, WarpTransform, Warper, Window,
};
pub use errors::{GridioError, Result};
