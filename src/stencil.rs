//! Neighbor-cell stencils: which cells to visit around a query cell.

/// How a Verlet list walks the cells around each query particle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum NeighborMode {
    /// Full stencil; every pair lands in both particles' lists.
    #[default]
    NonSymmetric,
    /// Half stencil; every unordered pair is stored once.
    Symmetric,
    /// Half stencil driven by caller-supplied domain / anomalous cell sets.
    CrossSymmetric,
}

impl NeighborMode {
    /// Whether the center cell only accepts candidates ordered after the query.
    pub fn is_half(&self) -> bool {
        !matches!(self, NeighborMode::NonSymmetric)
    }
}

/// Relative cell offsets visited around a query cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stencil<const D: usize> {
    offsets: Vec<[i64; D]>,
}

impl<const D: usize> Stencil<D> {
    pub fn from_offsets(offsets: Vec<[i64; D]>) -> Self {
        Self { offsets }
    }

    /// Every offset in `[-extent, extent]` per axis, center first.
    pub fn full(extent: [i64; D]) -> Self {
        let mut offsets = vec![[0; D]];
        for_each_offset(&extent, |o| {
            if o != [0; D] {
                offsets.push(o);
            }
        });
        Self { offsets }
    }

    /// Center plus every offset whose first non-zero component is positive.
    ///
    /// For each pair of distinct cells `(a, b)` within range exactly one of
    /// `b - a` and `a - b` is part of the stencil.
    pub fn half(extent: [i64; D]) -> Self {
        let mut offsets = vec![[0; D]];
        for_each_offset(&extent, |o| {
            if o.iter().find(|&&c| c != 0).is_some_and(|&c| c > 0) {
                offsets.push(o);
            }
        });
        Self { offsets }
    }

    /// Stencil for `mode` covering `extent` cells along each axis.
    pub fn for_mode(mode: NeighborMode, extent: [i64; D]) -> Self {
        match mode {
            NeighborMode::NonSymmetric => Self::full(extent),
            NeighborMode::Symmetric | NeighborMode::CrossSymmetric => Self::half(extent),
        }
    }

    pub fn offsets(&self) -> &[[i64; D]] {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

fn for_each_offset<const D: usize>(extent: &[i64; D], mut f: impl FnMut([i64; D])) {
    if D == 0 {
        return;
    }
    let mut o = [0i64; D];
    for axis in 0..D {
        o[axis] = -extent[axis];
    }
    loop {
        f(o);
        let mut axis = 0;
        loop {
            o[axis] += 1;
            if o[axis] <= extent[axis] {
                break;
            }
            o[axis] = -extent[axis];
            axis += 1;
            if axis == D {
                return;
            }
        }
    }
}

/// A cell whose neighborhood differs from the regular half stencil, usually
/// because it sits on a sub-domain boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnomalousCell<const D: usize> {
    pub cell: usize,
    pub neighbors: Stencil<D>,
}

/// Cell partitions for cross-domain symmetric construction.
///
/// Particles are queried only from the listed cells: `dom` cells use the
/// regular half stencil, `anom` cells their own neighbor offsets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CrsDomain<const D: usize> {
    pub dom: Vec<usize>,
    pub anom: Vec<AnomalousCell<D>>,
}

impl<const D: usize> CrsDomain<D> {
    pub fn new(dom: Vec<usize>, anom: Vec<AnomalousCell<D>>) -> Self {
        Self { dom, anom }
    }

    pub fn is_empty(&self) -> bool {
        self.dom.is_empty() && self.anom.is_empty()
    }
}
