//! Lazy iteration over the occupied cells of a [`SparseGrid`](super::SparseGrid).
//!
//! Both iterators walk the chunk headers from chunk 1 onwards. On entering a
//! chunk they scan its mask once and keep the matching slots in a fixed
//! `[u16; N]` buffer; chunks without matches are skipped.

use super::grid::{ChunkHeader, MASK_OCCUPIED};
use super::key::{GridBox, GridKey, SparseKey};
use tracing::trace;

/// Borrowed header/mask pair of a grid plus the slot offset table.
#[derive(Clone, Copy, Debug)]
pub struct ChunkView<'a, const D: usize, const N: usize> {
    pub(crate) headers: &'a [ChunkHeader<D>],
    pub(crate) masks: &'a [[u8; N]],
    pub(crate) lin_id_pos: &'a [[i64; D]],
    pub(crate) extent: [usize; D],
}

impl<const D: usize, const N: usize> ChunkView<'_, D, N> {
    fn chunk_box(&self, chunk: usize) -> GridBox<D> {
        let pos = self.headers[chunk].pos;
        let mut high = pos.0;
        for (h, &e) in high.iter_mut().zip(&self.extent) {
            *h += e as i64 - 1;
        }
        GridBox::new(pos.0, high)
    }
}

/// Position inside the chunk sequence shared by both iterators.
#[derive(Clone, Debug)]
struct ChunkCursor<const N: usize> {
    chunk_id: usize,
    matches: [u16; N],
    n_matches: usize,
    pos: usize,
}

impl<const N: usize> ChunkCursor<N> {
    fn start() -> Self {
        Self {
            chunk_id: 1,
            matches: [0; N],
            n_matches: 0,
            pos: 0,
        }
    }

    /// From the current chunk on, stops at the first chunk where `collect`
    /// finds matches.
    fn seek(&mut self, n_chunks: usize, mut collect: impl FnMut(usize, &mut [u16; N]) -> usize) {
        self.pos = 0;
        while self.chunk_id < n_chunks {
            self.n_matches = collect(self.chunk_id, &mut self.matches);
            if self.n_matches > 0 {
                return;
            }
            self.chunk_id += 1;
        }
        self.n_matches = 0;
    }

    fn slot(&self) -> usize {
        self.matches[self.pos] as usize
    }

    /// Moves within the chunk; true when the chunk is used up.
    fn step(&mut self) -> bool {
        self.pos += 1;
        if self.pos >= self.n_matches {
            self.chunk_id += 1;
            true
        } else {
            false
        }
    }
}

fn collect_occupied<const N: usize>(mask: &[u8; N], matches: &mut [u16; N]) -> usize {
    let mut n = 0;
    for (slot, &m) in mask.iter().enumerate() {
        if m & MASK_OCCUPIED != 0 {
            matches[n] = slot as u16;
            n += 1;
        }
    }
    n
}

/// Visits every occupied cell exactly once.
#[derive(Clone, Debug)]
pub struct SparseGridIterator<'a, const D: usize, const N: usize> {
    view: ChunkView<'a, D, N>,
    cursor: ChunkCursor<N>,
}

impl<'a, const D: usize, const N: usize> SparseGridIterator<'a, D, N> {
    pub(crate) fn new(view: ChunkView<'a, D, N>) -> Self {
        let mut it = Self {
            view,
            cursor: ChunkCursor::start(),
        };
        it.select_valid();
        it
    }

    fn select_valid(&mut self) {
        let masks = self.view.masks;
        self.cursor
            .seek(self.view.headers.len(), |chunk, matches| {
                collect_occupied(&masks[chunk], matches)
            });
    }

    /// False once every chunk has been visited.
    pub fn is_next(&self) -> bool {
        self.cursor.chunk_id < self.view.headers.len()
    }

    /// Moves to the next occupied cell. Must not be called once exhausted.
    pub fn advance(&mut self) -> &mut Self {
        debug_assert!(self.is_next());
        if self.cursor.step() {
            self.select_valid();
        }
        self
    }

    /// Absolute coordinate of the current cell.
    pub fn get(&self) -> GridKey<D> {
        let slot = self.cursor.slot();
        self.view.headers[self.cursor.chunk_id]
            .pos
            .shifted(&self.view.lin_id_pos[slot])
    }

    pub fn get_key_f(&self) -> SparseKey {
        SparseKey {
            chunk: self.cursor.chunk_id,
            slot: self.cursor.slot(),
        }
    }

    /// Takes over the full state of `other`.
    pub fn reinitialize(&mut self, other: &Self) {
        self.clone_from(other);
    }

    /// Adopts the grid `other` walks and restarts from the first chunk.
    pub fn reinitialize_from_sub(&mut self, other: &SparseGridSubIterator<'a, D, N>) {
        self.view = other.view;
        self.cursor = ChunkCursor::start();
        self.select_valid();
    }
}

impl<const D: usize, const N: usize> Iterator for SparseGridIterator<'_, D, N> {
    type Item = GridKey<D>;

    fn next(&mut self) -> Option<GridKey<D>> {
        if !self.is_next() {
            return None;
        }
        let key = self.get();
        self.advance();
        Some(key)
    }
}

/// Visits the occupied cells inside an inclusive window `[start, stop]`.
#[derive(Clone, Debug)]
pub struct SparseGridSubIterator<'a, const D: usize, const N: usize> {
    view: ChunkView<'a, D, N>,
    cursor: ChunkCursor<N>,
    window: GridBox<D>,
}

impl<'a, const D: usize, const N: usize> SparseGridSubIterator<'a, D, N> {
    pub(crate) fn new(view: ChunkView<'a, D, N>, window: GridBox<D>) -> Self {
        let mut it = Self {
            view,
            cursor: ChunkCursor::start(),
            window,
        };
        it.select_valid();
        it
    }

    fn select_valid(&mut self) {
        let view = self.view;
        let window = self.window;
        self.cursor.seek(view.headers.len(), |chunk, matches| {
            let Some(overlap) = view.chunk_box(chunk).intersect(&window) else {
                return 0;
            };
            let local = overlap.relative_to(&view.headers[chunk].pos);
            let mut n = 0;
            for (slot, &m) in view.masks[chunk].iter().enumerate() {
                if m & MASK_OCCUPIED != 0 && local.contains(&view.lin_id_pos[slot]) {
                    matches[n] = slot as u16;
                    n += 1;
                }
            }
            trace!(chunk, n, "window overlaps chunk");
            n
        });
    }

    pub fn is_next(&self) -> bool {
        self.cursor.chunk_id < self.view.headers.len()
    }

    pub fn advance(&mut self) -> &mut Self {
        debug_assert!(self.is_next());
        if self.cursor.step() {
            self.select_valid();
        }
        self
    }

    pub fn get(&self) -> GridKey<D> {
        let slot = self.cursor.slot();
        self.view.headers[self.cursor.chunk_id]
            .pos
            .shifted(&self.view.lin_id_pos[slot])
    }

    pub fn get_key_f(&self) -> SparseKey {
        SparseKey {
            chunk: self.cursor.chunk_id,
            slot: self.cursor.slot(),
        }
    }

    pub fn start(&self) -> GridKey<D> {
        self.window.low()
    }

    pub fn stop(&self) -> GridKey<D> {
        self.window.high()
    }

    pub fn reinitialize(&mut self, other: &Self) {
        self.clone_from(other);
    }
}

impl<const D: usize, const N: usize> Iterator for SparseGridSubIterator<'_, D, N> {
    type Item = GridKey<D>;

    fn next(&mut self) -> Option<GridKey<D>> {
        if !self.is_next() {
            return None;
        }
        let key = self.get();
        self.advance();
        Some(key)
    }
}
