//! Balanced bucket storage for cell lists.
//!
//! Every cell owns its own growable vector of elements. Memory is roughly
//! `M * size_of::<Vec<E>>() + N * size_of::<E>()` for `M` cells and `N`
//! elements: cheap for sparse occupancy, wasteful for extremely fine lattices.

use std::ops::Deref;

/// Position inside one bucket, returned by [`MemBalanced::start_id`] and
/// [`MemBalanced::stop_id`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BucketCursor {
    cell: usize,
    index: usize,
}

impl BucketCursor {
    /// Returned for empty buckets.
    pub const INVALID: BucketCursor = BucketCursor {
        cell: usize::MAX,
        index: usize::MAX,
    };

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    pub fn cell(&self) -> usize {
        self.cell
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// Zero-copy view over one bucket: the backing sequence, a start index and a
/// length. Holding it borrows the store, so the bucket cannot change under it.
#[derive(Clone, Copy, Debug)]
pub struct BucketRange<'a, E> {
    seq: &'a [E],
    start: usize,
    len: usize,
}

impl<'a, E> BucketRange<'a, E> {
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &'a [E] {
        &self.seq[self.start..self.start + self.len]
    }
}

impl<E> Deref for BucketRange<'_, E> {
    type Target = [E];
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<'a, E> IntoIterator for BucketRange<'a, E> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;
    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

/// Balanced cell-list memory: cell id → list of element ids.
///
/// Cell ids are not bounds-checked beyond slice indexing; callers validate them.
#[derive(Clone, Debug, Default)]
pub struct MemBalanced<E = usize> {
    cl_base: Vec<Vec<E>>,
}

impl<E: Copy + PartialEq> MemBalanced<E> {
    /// `slot` is accepted for interface parity with fixed-slot layouts and ignored.
    pub fn new(_slot: usize) -> Self {
        Self {
            cl_base: Vec::new(),
        }
    }

    pub fn set_slot(&mut self, _slot: usize) {}

    /// Resizes to `tot_n_cell` buckets. Existing buckets below that count keep
    /// their content; call [`clear`](Self::clear) first for a fresh start.
    pub fn init_to_zero(&mut self, _slot: usize, tot_n_cell: usize) {
        self.cl_base.resize_with(tot_n_cell, Vec::new);
    }

    pub fn n_cells(&self) -> usize {
        self.cl_base.len()
    }

    pub fn add(&mut self, cell_id: usize, ele: E) {
        self.cl_base[cell_id].push(ele);
    }

    /// Removes the first occurrence of `ele`. Returns whether something was removed.
    pub fn remove(&mut self, cell_id: usize, ele: E) -> bool {
        let bucket = &mut self.cl_base[cell_id];
        match bucket.iter().position(|&e| e == ele) {
            Some(idx) => {
                bucket.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Removes the element at position `idx`, keeping the order of the rest.
    pub fn remove_at(&mut self, cell_id: usize, idx: usize) -> E {
        self.cl_base[cell_id].remove(idx)
    }

    pub fn n_elements(&self, cell_id: usize) -> usize {
        self.cl_base[cell_id].len()
    }

    pub fn get(&self, cell_id: usize, idx: usize) -> E {
        self.cl_base[cell_id][idx]
    }

    pub fn get_mut(&mut self, cell_id: usize, idx: usize) -> &mut E {
        &mut self.cl_base[cell_id][idx]
    }

    pub fn start_id(&self, cell_id: usize) -> BucketCursor {
        if self.cl_base[cell_id].is_empty() {
            return BucketCursor::INVALID;
        }
        BucketCursor {
            cell: cell_id,
            index: 0,
        }
    }

    /// One past the last element of the bucket.
    pub fn stop_id(&self, cell_id: usize) -> BucketCursor {
        let bucket = &self.cl_base[cell_id];
        if bucket.is_empty() {
            return BucketCursor::INVALID;
        }
        BucketCursor {
            cell: cell_id,
            index: bucket.len(),
        }
    }

    /// Element a valid, in-range cursor points at.
    pub fn get_lin(&self, cursor: BucketCursor) -> E {
        self.cl_base[cursor.cell][cursor.index]
    }

    pub fn range(&self, cell_id: usize) -> BucketRange<'_, E> {
        let seq = self.cl_base[cell_id].as_slice();
        BucketRange {
            seq,
            start: 0,
            len: seq.len(),
        }
    }

    /// Empties every bucket; the bucket count is kept.
    pub fn clear(&mut self) {
        for bucket in &mut self.cl_base {
            bucket.clear();
        }
    }

    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(&mut self.cl_base, &mut other.cl_base);
    }
}
