use crate::{
    components::{band::RasterBand, mem::MemRaster, ResampleAlg},
    errors::Result,
};

/// Affine mapping between destination buffer pixels and source band
/// pixels, as handed to the warp delegate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarpTransform {
    pub x_off: f64,
    pub y_off: f64,
    pub x_ratio_dst_to_src: f64,
    pub y_ratio_dst_to_src: f64,
}

impl WarpTransform {
    pub fn dst_to_src(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x * self.x_ratio_dst_to_src + self.x_off,
            y * self.y_ratio_dst_to_src + self.y_off,
        )
    }

    pub fn src_to_dst(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.x_off) / self.x_ratio_dst_to_src,
            (y - self.y_off) / self.y_ratio_dst_to_src,
        )
    }
}

/// One chunk-and-warp invocation against a memory-backed destination.
#[derive(Debug, Clone, Copy)]
pub struct WarpRequest {
    pub dst_x_off: usize,
    pub dst_y_off: usize,
    pub dst_width: usize,
    pub dst_height: usize,
    pub transform: WarpTransform,
    pub resample: ResampleAlg,
    pub nodata: Option<f64>,
}

/// External warp engine contract. The filtered resampling path delegates
/// complex-typed bands here; the engine itself never interprets complex
/// sample geometry.
pub trait Warper: Send + Sync {
    fn chunk_and_warp(
        &self,
        src: &RasterBand,
        dst: &mut MemRaster,
        req: &WarpRequest,
        progress: Option<&mut dyn FnMut(f64) -> bool>,
    ) -> Result<()>;
}
