use log::warn;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use crate::errors::{GridioError, Result};

/// Storage driver contract: moves whole blocks between the cache and the
/// backing store. Implementations decide what "storage" means (a file, a
/// remote range request, plain memory).
pub trait BlockStore: Send + Sync {
    /// Fill `buf` (one block worth of pixel words) with block
    /// (`col`, `row`). Pixels past the raster edge are driver-defined.
    fn read_block(&self, col: usize, row: usize, buf: &mut [u8]) -> Result<()>;

    /// Persist block (`col`, `row`) from `buf`.
    fn write_block(&self, col: usize, row: usize, buf: &[u8]) -> Result<()>;
}

/// Fallible zeroed allocation; I/O paths must fail cleanly rather than
/// abort when a chunk or swath buffer cannot be provided.
pub(crate) fn alloc_zeroed(len: usize) -> Result<Box<[u8]>> {
    let mut v: Vec<u8> = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| GridioError::Allocation(len))?;
    v.resize(len, 0);
    Ok(v.into_boxed_slice())
}

struct CacheState {
    cached: HashMap<(usize, usize), Box<[u8]>>,
    lru: VecDeque<(usize, usize)>,
    checked_out: HashSet<(usize, usize)>,
}

/// Per-band block cache. Blocks are checked out with exclusive ownership
/// of their buffer and checked back in when the holder is done; dirty
/// blocks are written through to the store on check-in, so eviction only
/// ever discards clean copies.
pub struct BlockCache {
    block_bytes: usize,
    max_blocks: usize,
    state: Mutex<CacheState>,
}

impl BlockCache {
    /// `budget_bytes` bounds the memory kept for clean block copies; at
    /// least one block is always retained.
    pub fn new(block_bytes: usize, budget_bytes: usize) -> Self {
        Self {
            block_bytes,
            max_blocks: (budget_bytes / block_bytes.max(1)).max(1),
            state: Mutex::new(CacheState {
                cached: HashMap::new(),
                lru: VecDeque::new(),
                checked_out: HashSet::new(),
            }),
        }
    }

    pub fn block_bytes(&self) -> usize {
        self.block_bytes
    }

    /// Check out block (`col`, `row`) for exclusive use. A missing block
    /// is populated from `store`, or zero-initialized when
    /// `just_initialize` is set (the caller promises to overwrite the
    /// whole span it covers).
    pub fn check_out(
        &self,
        store: &dyn BlockStore,
        col: usize,
        row: usize,
        just_initialize: bool,
    ) -> Result<Box<[u8]>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.checked_out.contains(&(col, row)) {
            return Err(GridioError::Storage(format!(
                "block ({col},{row}) is already locked"
            )));
        }
        if let Some(data) = state.cached.remove(&(col, row)) {
            state.lru.retain(|k| *k != (col, row));
            state.checked_out.insert((col, row));
            return Ok(data);
        }
        drop(state);

        let mut data = alloc_zeroed(self.block_bytes)?;
        if !just_initialize {
            if let Err(e) = store.read_block(col, row, &mut data) {
                warn!("reading block ({col},{row}) failed: {e}");
                return Err(GridioError::BlockAcquire { col, row });
            }
        }
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .checked_out
            .insert((col, row));
        Ok(data)
    }

    /// Return a checked-out block. Dirty blocks are flushed to `store`
    /// before the buffer goes back on the clean list; a flush failure is
    /// returned so the band can defer it to its next request.
    pub fn check_in(
        &self,
        store: &dyn BlockStore,
        col: usize,
        row: usize,
        data: Box<[u8]>,
        dirty: bool,
    ) -> Result<()> {
        let flushed = if dirty {
            store.write_block(col, row, &data)
        } else {
            Ok(())
        };
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.checked_out.remove(&(col, row));
        // A copy the store refused is dropped, not kept as clean.
        flushed?;
        state.cached.insert((col, row), data);
        state.lru.push_back((col, row));
        while state.cached.len() > self.max_blocks {
            match state.lru.pop_front() {
                Some(k) => {
                    state.cached.remove(&k);
                }
                None => break,
            }
        }
        Ok(())
    }
}
