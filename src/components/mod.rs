pub mod band;
pub mod block;
pub mod copy;
pub mod dataset;
pub mod io;
pub(crate) mod kernels;
pub mod mem;
pub mod overview;
pub mod pixel;
pub(crate) mod resample;
pub mod warp;
pub mod window;
pub mod words;

pub use band::{BlockLock, Overview, RasterBand};
pub use block::BlockStore;
pub use copy::{compute_swath_size, copy_band_whole_raster, copy_whole_raster, CopyOptions};
pub use dataset::{Dataset, Interleave};
pub use io::IoOpts;
pub use mem::{MemRaster, MemStore};
pub use pixel::{value_range, Pixel, PixelType};
pub use warp::{WarpRequest, WarpTransform, Warper};
pub use window::{BufferLayout, FloatWindow, Window};
pub use words::{copy_words, replicate_word};

/// Direction of a transfer between a band and a caller buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RwFlag {
    #[default]
    Read,
    Write,
}

/// Algorithm applied when a read request is scaled.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize,
)]
pub enum ResampleAlg {
    #[default]
    NearestNeighbour,
    Bilinear,
    Cubic,
    CubicSpline,
    Lanczos,
    Average,
    Mode,
    Gauss,
}
