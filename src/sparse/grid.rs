use super::iterator::{ChunkView, SparseGridIterator, SparseGridSubIterator};
use super::key::{GridBox, GridKey, SparseKey};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Largest chunk capacity; slot indices must fit in a `u16`.
pub const MAX_CHUNK_SLOTS: usize = 1 << 16;

/// Mask bit marking a slot as occupied. Bits 1..7 belong to the caller.
pub const MASK_OCCUPIED: u8 = 1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SparseGridError {
    #[error("Chunk extent {extent:?} holds {product} slots, expected {capacity}")]
    ExtentMismatch {
        extent: Vec<usize>,
        product: usize,
        capacity: usize,
    },
    #[error("Chunk capacity {0} must be within 1..=65536")]
    InvalidCapacity(usize),
}

/// Origin and occupied-slot count of one chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkHeader<const D: usize> {
    pub pos: GridKey<D>,
    pub nele: usize,
}

/// Grid storing values only for occupied cells, in hyper-cubic chunks of `N`
/// slots.
///
/// Chunk headers, masks and data live in three index-aligned sequences. Chunk
/// 0 is reserved and never holds data, so iteration starts at chunk 1.
#[derive(Clone, Debug)]
pub struct SparseGrid<T, const D: usize, const N: usize> {
    extent: [usize; D],
    lin_id_pos: Vec<[i64; D]>,
    header_inf: Vec<ChunkHeader<D>>,
    header_mask: Vec<[u8; N]>,
    data: Vec<[T; N]>,
    index: HashMap<GridKey<D>, usize>,
}

impl<T: Copy + Default, const D: usize, const N: usize> SparseGrid<T, D, N> {
    pub fn new(extent: [usize; D]) -> Result<Self, SparseGridError> {
        if N == 0 || N > MAX_CHUNK_SLOTS {
            return Err(SparseGridError::InvalidCapacity(N));
        }
        let product: usize = extent.iter().product();
        if product != N {
            return Err(SparseGridError::ExtentMismatch {
                extent: extent.to_vec(),
                product,
                capacity: N,
            });
        }

        let lin_id_pos = (0..N)
            .map(|slot| {
                let mut rest = slot;
                let mut offset = [0i64; D];
                for (o, &e) in offset.iter_mut().zip(&extent) {
                    *o = (rest % e) as i64;
                    rest /= e;
                }
                offset
            })
            .collect();

        let mut grid = Self {
            extent,
            lin_id_pos,
            header_inf: Vec::new(),
            header_mask: Vec::new(),
            data: Vec::new(),
            index: HashMap::new(),
        };
        grid.push_reserved();
        Ok(grid)
    }

    fn push_reserved(&mut self) {
        self.header_inf.push(ChunkHeader {
            pos: GridKey([i64::MIN; D]),
            nele: 0,
        });
        self.header_mask.push([0; N]);
        self.data.push([T::default(); N]);
    }

    /// Chunk origin and slot holding `key`.
    fn locate(&self, key: &GridKey<D>) -> (GridKey<D>, usize) {
        let mut origin = [0i64; D];
        let mut slot = 0usize;
        for axis in (0..D).rev() {
            let e = self.extent[axis] as i64;
            origin[axis] = key[axis].div_euclid(e) * e;
            slot = slot * self.extent[axis] + key[axis].rem_euclid(e) as usize;
        }
        (GridKey(origin), slot)
    }

    fn find(&self, key: &GridKey<D>) -> Option<(usize, usize)> {
        let (origin, slot) = self.locate(key);
        let chunk = *self.index.get(&origin)?;
        (self.header_mask[chunk][slot] & MASK_OCCUPIED != 0).then_some((chunk, slot))
    }

    /// Stores `value` at `key`, returning the previous value if the cell was
    /// already occupied.
    pub fn insert(&mut self, key: GridKey<D>, value: T) -> Option<T> {
        let (origin, slot) = self.locate(&key);
        let chunk = match self.index.get(&origin) {
            Some(&chunk) => chunk,
            None => {
                let chunk = self.header_inf.len();
                self.header_inf.push(ChunkHeader {
                    pos: origin,
                    nele: 0,
                });
                self.header_mask.push([0; N]);
                self.data.push([T::default(); N]);
                self.index.insert(origin, chunk);
                chunk
            }
        };

        let mask = &mut self.header_mask[chunk][slot];
        let previous = if *mask & MASK_OCCUPIED != 0 {
            Some(self.data[chunk][slot])
        } else {
            *mask |= MASK_OCCUPIED;
            self.header_inf[chunk].nele += 1;
            None
        };
        self.data[chunk][slot] = value;
        previous
    }

    pub fn get(&self, key: &GridKey<D>) -> Option<&T> {
        self.find(key).map(|(chunk, slot)| &self.data[chunk][slot])
    }

    pub fn get_mut(&mut self, key: &GridKey<D>) -> Option<&mut T> {
        self.find(key)
            .map(|(chunk, slot)| &mut self.data[chunk][slot])
    }

    pub fn contains(&self, key: &GridKey<D>) -> bool {
        self.find(key).is_some()
    }

    /// Value behind a key handed out by an iterator over this grid.
    pub fn get_by_key(&self, key: SparseKey) -> &T {
        &self.data[key.chunk][key.slot]
    }

    pub fn get_by_key_mut(&mut self, key: SparseKey) -> &mut T {
        &mut self.data[key.chunk][key.slot]
    }

    /// Absolute coordinate of an iterator key.
    pub fn key_coord(&self, key: SparseKey) -> GridKey<D> {
        self.header_inf[key.chunk]
            .pos
            .shifted(&self.lin_id_pos[key.slot])
    }

    /// Empties the cell at `key`. A chunk whose last cell goes away is
    /// swap-removed from all three sequences.
    pub fn remove(&mut self, key: &GridKey<D>) -> Option<T> {
        let (chunk, slot) = self.find(key)?;
        let value = self.data[chunk][slot];
        self.header_mask[chunk][slot] = 0;
        self.data[chunk][slot] = T::default();
        self.header_inf[chunk].nele -= 1;

        if self.header_inf[chunk].nele == 0 {
            let removed = self.header_inf.swap_remove(chunk);
            self.header_mask.swap_remove(chunk);
            self.data.swap_remove(chunk);
            self.index.remove(&removed.pos);
            if let Some(moved) = self.header_inf.get(chunk) {
                self.index.insert(moved.pos, chunk);
            }
            debug!(chunk, "dropped empty chunk");
        }
        Some(value)
    }

    /// Caller bits 1..7 of the mask at `key`, `None` for an empty cell.
    pub fn mask_flags(&self, key: &GridKey<D>) -> Option<u8> {
        self.find(key)
            .map(|(chunk, slot)| self.header_mask[chunk][slot] & !MASK_OCCUPIED)
    }

    /// Sets caller bits 1..7 on an occupied cell. Returns false when the cell is
    /// empty. Bit 0 of `flags` is ignored.
    pub fn set_mask_flags(&mut self, key: &GridKey<D>, flags: u8) -> bool {
        match self.find(key) {
            Some((chunk, slot)) => {
                self.header_mask[chunk][slot] = (flags & !MASK_OCCUPIED) | MASK_OCCUPIED;
                true
            }
            None => false,
        }
    }

    /// Number of chunks holding data (the reserved chunk is not counted).
    pub fn n_chunks(&self) -> usize {
        self.header_inf.len() - 1
    }

    /// Number of occupied cells.
    pub fn size(&self) -> usize {
        self.header_inf.iter().map(|h| h.nele).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.n_chunks() == 0
    }

    pub fn extent(&self) -> &[usize; D] {
        &self.extent
    }

    /// Offset of `slot` inside any chunk.
    pub fn lin_id_pos(&self, slot: usize) -> &[i64; D] {
        &self.lin_id_pos[slot]
    }

    pub fn headers(&self) -> &[ChunkHeader<D>] {
        &self.header_inf
    }

    pub fn masks(&self) -> &[[u8; N]] {
        &self.header_mask
    }

    fn view(&self) -> ChunkView<'_, D, N> {
        ChunkView {
            headers: &self.header_inf,
            masks: &self.header_mask,
            lin_id_pos: &self.lin_id_pos,
            extent: self.extent,
        }
    }

    /// Every occupied cell.
    pub fn iter(&self) -> SparseGridIterator<'_, D, N> {
        SparseGridIterator::new(self.view())
    }

    /// Occupied cells inside the inclusive box `[start, stop]`.
    pub fn iter_sub(&self, start: GridKey<D>, stop: GridKey<D>) -> SparseGridSubIterator<'_, D, N> {
        SparseGridSubIterator::new(self.view(), GridBox::new(start.0, stop.0))
    }

    pub fn clear(&mut self) {
        self.header_inf.clear();
        self.header_mask.clear();
        self.data.clear();
        self.index.clear();
        self.push_reserved();
    }
}
