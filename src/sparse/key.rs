use std::ops::Index;

/// Absolute integer coordinate on a sparse grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridKey<const D: usize>(pub [i64; D]);

impl<const D: usize> GridKey<D> {
    pub fn new(coords: [i64; D]) -> Self {
        Self(coords)
    }

    pub fn coords(&self) -> &[i64; D] {
        &self.0
    }

    /// `self + offset`, component-wise.
    pub fn shifted(&self, offset: &[i64; D]) -> Self {
        let mut out = self.0;
        for (c, o) in out.iter_mut().zip(offset) {
            *c += o;
        }
        Self(out)
    }
}

impl<const D: usize> From<[i64; D]> for GridKey<D> {
    fn from(coords: [i64; D]) -> Self {
        Self(coords)
    }
}

impl<const D: usize> Index<usize> for GridKey<D> {
    type Output = i64;

    fn index(&self, axis: usize) -> &i64 {
        &self.0[axis]
    }
}

/// Inclusive integer box `[low, high]`. Empty when `low > high` on any axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridBox<const D: usize> {
    low: [i64; D],
    high: [i64; D],
}

impl<const D: usize> GridBox<D> {
    pub fn new(low: [i64; D], high: [i64; D]) -> Self {
        Self { low, high }
    }

    pub fn low(&self) -> GridKey<D> {
        GridKey(self.low)
    }

    pub fn high(&self) -> GridKey<D> {
        GridKey(self.high)
    }

    pub fn is_empty(&self) -> bool {
        self.low.iter().zip(&self.high).any(|(l, h)| l > h)
    }

    /// Overlap of two boxes, `None` when they do not touch.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let mut out = *self;
        for axis in 0..D {
            out.low[axis] = self.low[axis].max(other.low[axis]);
            out.high[axis] = self.high[axis].min(other.high[axis]);
        }
        (!out.is_empty()).then_some(out)
    }

    pub fn contains(&self, p: &[i64; D]) -> bool {
        (0..D).all(|axis| self.low[axis] <= p[axis] && p[axis] <= self.high[axis])
    }

    /// The same box expressed relative to `origin`.
    pub fn relative_to(&self, origin: &GridKey<D>) -> Self {
        let mut out = *self;
        for axis in 0..D {
            out.low[axis] -= origin[axis];
            out.high[axis] -= origin[axis];
        }
        out
    }
}

/// Opaque handle to one slot of one chunk, as handed out by the iterators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SparseKey {
    pub(crate) chunk: usize,
    pub(crate) slot: usize,
}

impl SparseKey {
    pub fn chunk(&self) -> usize {
        self.chunk
    }

    pub fn slot(&self) -> usize {
        self.slot
    }
}
