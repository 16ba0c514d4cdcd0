use itertools::Itertools;

use crate::{
    components::{
        band::RasterBand,
        io::IoOpts,
        window::{BufferLayout, Window},
        RwFlag,
    },
    errors::{GridioError, Result},
};

/// Storage ordering hint of a dataset, as drivers report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum Interleave {
    #[default]
    Band,
    Pixel,
}

/// A stack of equally sized bands.
#[derive(Debug)]
pub struct Dataset {
    width: usize,
    height: usize,
    bands: Vec<RasterBand>,
    interleave: Interleave,
}

impl Dataset {
    pub fn new(bands: Vec<RasterBand>) -> Result<Self> {
        let Some(first) = bands.first() else {
            return Err(GridioError::SizeMismatch);
        };
        let (width, height) = (first.width(), first.height());
        if bands.iter().any(|b| b.width() != width || b.height() != height) {
            return Err(GridioError::SizeMismatch);
        }
        Ok(Self {
            width,
            height,
            bands,
            interleave: Interleave::Band,
        })
    }

    pub fn with_interleave(mut self, interleave: Interleave) -> Self {
        self.interleave = interleave;
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn band(&self, index: usize) -> &RasterBand {
        &self.bands[index]
    }

    pub fn bands(&self) -> &[RasterBand] {
        &self.bands
    }

    pub fn interleave(&self) -> Interleave {
        self.interleave
    }

    /// Multi-band transfer. `band_map` selects and orders the bands
    /// (all of them, in order, when `None`); each band's pixels land
    /// `band_stride` bytes apart in the buffer, defaulting to
    /// band-sequential placement.
    pub fn raster_io(
        &self,
        rw: RwFlag,
        window: Window,
        buf: &mut [u8],
        layout: &BufferLayout,
        band_map: Option<&[usize]>,
        band_stride: Option<usize>,
        opts: &mut IoOpts,
    ) -> Result<()> {
        let all: Vec<usize>;
        let map = match band_map {
            Some(map) => map,
            None => {
                all = (0..self.bands.len()).collect_vec();
                &all
            }
        };
        if map.iter().any(|&b| b >= self.bands.len()) {
            return Err(GridioError::SizeMismatch);
        }
        let band_stride = band_stride.unwrap_or(layout.line_stride * layout.height);

        let resample = opts.resample;
        let float_window = opts.float_window;
        let allow_approx_overview = opts.allow_approx_overview;
        let total = map.len() as f64;

        for (idx, &b) in map.iter().enumerate() {
            let done = idx as f64;
            let mut scaled = |c: f64| match opts.progress.as_mut() {
                Some(p) => p((done + c) / total),
                None => true,
            };
            let mut band_opts = IoOpts {
                resample,
                float_window,
                progress: Some(&mut scaled),
                allow_approx_overview,
            };
            self.bands[b].raster_io(
                rw,
                window,
                &mut buf[idx * band_stride..],
                layout,
                &mut band_opts,
            )?;
        }
        Ok(())
    }
}
