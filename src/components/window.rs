use crate::{
    components::pixel::PixelType,
    errors::{GridioError, Result},
};

/// Integer source window of an I/O request, in pixels of the addressed
/// band. Offsets are relative to the raster's top-left pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Window {
    pub x_off: usize,
    pub y_off: usize,
    pub x_size: usize,
    pub y_size: usize,
}

impl Window {
    pub fn new(x_off: usize, y_off: usize, x_size: usize, y_size: usize) -> Self {
        Self {
            x_off,
            y_off,
            x_size,
            y_size,
        }
    }

    /// Full-extent window of a `width`x`height` raster.
    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    pub(crate) fn check_within(&self, width: usize, height: usize) -> Result<()> {
        if self.x_size == 0
            || self.y_size == 0
            || self.x_off + self.x_size > width
            || self.y_off + self.y_size > height
        {
            return Err(GridioError::WindowOutOfBounds {
                x_off: self.x_off,
                y_off: self.y_off,
                x_size: self.x_size,
                y_size: self.y_size,
                width,
                height,
            });
        }
        Ok(())
    }
}

/// Sub-pixel window override used by resampled requests. When present and
/// different from the integer window, the request coordinates are treated
/// as fractional.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FloatWindow {
    pub x_off: f64,
    pub y_off: f64,
    pub x_size: f64,
    pub y_size: f64,
}

impl FloatWindow {
    pub(crate) fn matches(&self, w: &Window) -> bool {
        self.x_off == w.x_off as f64
            && self.y_off == w.y_off as f64
            && self.x_size == w.x_size as f64
            && self.y_size == w.y_size as f64
    }
}

impl From<Window> for FloatWindow {
    fn from(w: Window) -> Self {
        Self {
            x_off: w.x_off as f64,
            y_off: w.y_off as f64,
            x_size: w.x_size as f64,
            y_size: w.y_size as f64,
        }
    }
}

/// Shape and byte strides of a caller-owned pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    pub width: usize,
    pub height: usize,
    pub pixel_type: PixelType,
    /// Bytes from one pixel to the next within a line.
    pub pixel_stride: usize,
    /// Bytes from one line to the next.
    pub line_stride: usize,
}

impl BufferLayout {
    /// Contiguous row-major layout with no padding.
    pub fn packed(width: usize, height: usize, pixel_type: PixelType) -> Self {
        let pixel_stride = pixel_type.size_bytes();
        Self {
            width,
            height,
            pixel_type,
            pixel_stride,
            line_stride: pixel_stride * width,
        }
    }

    pub(crate) fn is_pixel_packed(&self) -> bool {
        self.pixel_stride == self.pixel_type.size_bytes()
    }

    pub(crate) fn is_packed(&self) -> bool {
        self.is_pixel_packed() && self.line_stride == self.pixel_stride * self.width
    }

    /// Number of buffer bytes the layout can touch.
    pub(crate) fn span_bytes(&self) -> usize {
        if self.width == 0 || self.height == 0 {
            return 0;
        }
        (self.height - 1) * self.line_stride
            + (self.width - 1) * self.pixel_stride
            + self.pixel_type.size_bytes()
    }

    pub(crate) fn check_buffer(&self, len: usize) -> Result<()> {
        let needed = self.span_bytes();
        if len < needed {
            return Err(GridioError::BufferTooSmall { got: len, needed });
        }
        if self.width == 0 || self.height == 0 {
            return Err(GridioError::SizeMismatch);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_bounds() {
        assert!(Window::new(0, 0, 10, 10).check_within(10, 10).is_ok());
        assert!(Window::new(5, 5, 6, 1).check_within(10, 10).is_err());
        assert!(Window::new(0, 0, 0, 1).check_within(10, 10).is_err());
    }

    #[test]
    fn packed_layout_span() {
        let layout = BufferLayout::packed(10, 4, PixelType::U16);
        assert_eq!(layout.span_bytes(), 10 * 4 * 2);
        assert!(layout.check_buffer(80).is_ok());
        assert!(layout.check_buffer(79).is_err());
    }

    #[test]
    fn float_window_match() {
        let w = Window::new(1, 2, 3, 4);
        assert!(FloatWindow::from(w).matches(&w));
        let fw = FloatWindow {
            x_off: 1.5,
            ..FloatWindow::from(w)
        };
        assert!(!fw.matches(&w));
    }
}
