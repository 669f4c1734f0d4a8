//! Chunked sparse grid: values are stored only for occupied cells, grouped in
//! fixed-size hyper-cubic chunks with per-slot occupancy masks.

mod grid;
mod iterator;
mod key;

pub use grid::{ChunkHeader, MASK_OCCUPIED, MAX_CHUNK_SLOTS, SparseGrid, SparseGridError};
pub use iterator::{ChunkView, SparseGridIterator, SparseGridSubIterator};
pub use key::{GridBox, GridKey, SparseKey};
