use nalgebra::SVector;
use thiserror::Error;

/// A position in `D`-dimensional space.
pub type Point<const D: usize> = SVector<f64, D>;

/// Squared Euclidean distance.
#[inline]
pub fn distance2<const D: usize>(a: &Point<D>, b: &Point<D>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpaceError {
    #[error("Domain box is degenerate along axis {axis} (low {low}, high {high})")]
    DegenerateBox { axis: usize, low: f64, high: f64 },
    #[error("Cell division along axis {axis} must be at least 1")]
    ZeroDivision { axis: usize },
}

/// Axis-aligned box in real coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct SpaceBox<const D: usize> {
    low: Point<D>,
    high: Point<D>,
}

impl<const D: usize> SpaceBox<D> {
    pub fn new(low: [f64; D], high: [f64; D]) -> Result<Self, SpaceError> {
        for axis in 0..D {
            if !(high[axis] > low[axis]) || !low[axis].is_finite() || !high[axis].is_finite() {
                return Err(SpaceError::DegenerateBox {
                    axis,
                    low: low[axis],
                    high: high[axis],
                });
            }
        }
        Ok(Self {
            low: Point::from(low),
            high: Point::from(high),
        })
    }

    /// Smallest box holding every position, grown by `margin` on each side.
    pub fn bounding(positions: &[Point<D>], margin: f64) -> Result<Self, SpaceError> {
        let mut low = [f64::INFINITY; D];
        let mut high = [f64::NEG_INFINITY; D];
        for p in positions {
            for axis in 0..D {
                low[axis] = low[axis].min(p[axis]);
                high[axis] = high[axis].max(p[axis]);
            }
        }
        for axis in 0..D {
            low[axis] -= margin;
            high[axis] += margin;
        }
        Self::new(low, high)
    }

    pub fn low(&self) -> &Point<D> {
        &self.low
    }

    pub fn high(&self) -> &Point<D> {
        &self.high
    }

    pub fn extent(&self, axis: usize) -> f64 {
        self.high[axis] - self.low[axis]
    }
}

/// Splits a [`SpaceBox`] into a regular lattice of cells, optionally padded with
/// `padding` extra cell layers on every side.
///
/// Cell ids are linearized with the first axis running fastest. Points outside
/// the padded lattice are clamped into the outermost layer.
#[derive(Clone, Debug)]
pub struct CellDecomposer<const D: usize> {
    domain: SpaceBox<D>,
    div: [usize; D],
    padding: usize,
    cell_size: Point<D>,
    inv_cell_size: Point<D>,
    n_cells: [usize; D],
    total: usize,
}

impl<const D: usize> CellDecomposer<D> {
    pub fn new(domain: SpaceBox<D>, div: [usize; D], padding: usize) -> Result<Self, SpaceError> {
        let mut cell_size = Point::zeros();
        let mut inv_cell_size = Point::zeros();
        let mut n_cells = [0; D];
        for axis in 0..D {
            if div[axis] == 0 {
                return Err(SpaceError::ZeroDivision { axis });
            }
            cell_size[axis] = domain.extent(axis) / div[axis] as f64;
            inv_cell_size[axis] = div[axis] as f64 / domain.extent(axis);
            n_cells[axis] = div[axis] + 2 * padding;
        }
        let total = n_cells.iter().product();
        Ok(Self {
            domain,
            div,
            padding,
            cell_size,
            inv_cell_size,
            n_cells,
            total,
        })
    }

    /// Picks the number of divisions so that every cell is at least
    /// `min_cell_size` wide.
    pub fn with_min_cell_size(
        domain: SpaceBox<D>,
        min_cell_size: f64,
        padding: usize,
    ) -> Result<Self, SpaceError> {
        let mut div = [1; D];
        for (axis, d) in div.iter_mut().enumerate() {
            let extent = domain.extent(axis);
            *d = ((extent / min_cell_size).floor() as usize).max(1);
            // Rounding in extent / div can land just below the minimum
            while *d > 1 && extent / (*d as f64) < min_cell_size {
                *d -= 1;
            }
        }
        Self::new(domain, div, padding)
    }

    pub fn domain(&self) -> &SpaceBox<D> {
        &self.domain
    }

    pub fn div(&self) -> &[usize; D] {
        &self.div
    }

    pub fn padding(&self) -> usize {
        self.padding
    }

    /// Size of one cell along every axis.
    pub fn cell_box(&self) -> &Point<D> {
        &self.cell_size
    }

    /// Number of cells along every axis, padding included.
    pub fn n_cells(&self) -> &[usize; D] {
        &self.n_cells
    }

    pub fn total_cells(&self) -> usize {
        self.total
    }

    /// Lattice coordinate of `p`, padding included. Points outside the padded
    /// lattice are clamped into its outermost layer.
    pub fn cell_coord(&self, p: &Point<D>) -> [usize; D] {
        let mut coord = [0; D];
        for axis in 0..D {
            let c = (((p[axis] - self.domain.low[axis]) * self.inv_cell_size[axis]).floor() as i64)
                .saturating_add(self.padding as i64);
            coord[axis] = c.clamp(0, self.n_cells[axis] as i64 - 1) as usize;
        }
        coord
    }

    /// Linear id of the cell holding `p`.
    pub fn cell_of(&self, p: &Point<D>) -> usize {
        self.linearize(&self.cell_coord(p))
    }

    pub fn linearize(&self, coord: &[usize; D]) -> usize {
        let mut id = 0;
        for axis in (0..D).rev() {
            id = id * self.n_cells[axis] + coord[axis];
        }
        id
    }

    pub fn delinearize(&self, mut id: usize) -> [usize; D] {
        let mut coord = [0; D];
        for axis in 0..D {
            coord[axis] = id % self.n_cells[axis];
            id /= self.n_cells[axis];
        }
        coord
    }

    /// Linear id of the cell at `coord + offset`, or `None` when it falls off
    /// the lattice.
    pub fn offset_cell(&self, coord: &[usize; D], offset: &[i64; D]) -> Option<usize> {
        let mut shifted = [0; D];
        for axis in 0..D {
            let c = coord[axis] as i64 + offset[axis];
            if c < 0 || c >= self.n_cells[axis] as i64 {
                return None;
            }
            shifted[axis] = c as usize;
        }
        Some(self.linearize(&shifted))
    }

    /// True when `r_cut` fits inside one cell along every axis.
    pub fn cutoff_fits_cell(&self, r_cut: f64) -> bool {
        self.cell_size.iter().all(|&s| r_cut <= s)
    }
}
