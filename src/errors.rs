pub type Result<T> = std::result::Result<T, GridioError>;

#[derive(thiserror::Error, Debug)]
pub enum GridioError {
    #[error("Request interrupted by caller")]
    Interrupted,
    #[error("Could not acquire block at column {col}, row {row}")]
    BlockAcquire { col: usize, row: usize },
    #[error("Buffer allocation of {0} bytes failed")]
    Allocation(usize),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    #[error("A dirty block failed to flush during a previous request: {0}")]
    PendingFlush(String),
    #[error("Window ({x_off},{y_off}) {x_size}x{y_size} exceeds raster extent {width}x{height}")]
    WindowOutOfBounds {
        x_off: usize,
        y_off: usize,
        x_size: usize,
        y_size: usize,
        width: usize,
        height: usize,
    },
    #[error("Source and destination sizes or band counts do not match")]
    SizeMismatch,
    #[error("Invalid block size")]
    InvalidBlockSize,
    #[error("Buffer of {got} bytes too small for layout needing {needed}")]
    BufferTooSmall { got: usize, needed: usize },
    #[error("Storage error: {0}")]
    Storage(String),
}

impl GridioError {
    /// Caller-driven cancellation, as opposed to a resource failure.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, GridioError::Interrupted)
    }
}
