use crate::mem_balanced::{BucketRange, MemBalanced};
use crate::phase::{PhaseCodec, PhaseCodecError};
use crate::space::{CellDecomposer, Point};
use tracing::info_span;

/// Cell list over a regular lattice, storing packed `(phase, id)` entries in
/// balanced buckets.
#[derive(Clone, Debug)]
pub struct CellList<const D: usize> {
    decomposer: CellDecomposer<D>,
    mem: MemBalanced<u64>,
    codec: PhaseCodec,
    // One past the largest id stored per phase
    extents: Vec<usize>,
}

impl<const D: usize> CellList<D> {
    pub fn new(decomposer: CellDecomposer<D>, codec: PhaseCodec) -> Self {
        let mut mem = MemBalanced::new(0);
        mem.init_to_zero(0, decomposer.total_cells());
        Self {
            decomposer,
            mem,
            codec,
            extents: Vec::new(),
        }
    }

    /// Builds a cell list holding every particle of every phase.
    pub fn build(
        decomposer: CellDecomposer<D>,
        codec: PhaseCodec,
        phases: &[&[Point<D>]],
    ) -> Result<Self, PhaseCodecError> {
        let mut cl = Self::new(decomposer, codec);
        cl.fill(phases)?;
        Ok(cl)
    }

    /// Clears the list and re-populates it from `phases`.
    pub fn fill(&mut self, phases: &[&[Point<D>]]) -> Result<(), PhaseCodecError> {
        let _span = info_span!("CellList::fill", n_phases = phases.len()).entered();
        self.clear();
        for (phase, positions) in phases.iter().enumerate() {
            for (id, p) in positions.iter().enumerate() {
                self.add_phase(p, phase, id)?;
            }
        }
        Ok(())
    }

    /// Adds particle `id` of phase 0.
    pub fn add(&mut self, p: &Point<D>, id: usize) -> Result<(), PhaseCodecError> {
        self.add_phase(p, 0, id)
    }

    pub fn add_phase(
        &mut self,
        p: &Point<D>,
        phase: usize,
        id: usize,
    ) -> Result<(), PhaseCodecError> {
        let packed = self.codec.try_encode(phase, id)?;
        let cell = self.decomposer.cell_of(p);
        self.mem.add(cell, packed);
        if self.extents.len() <= phase {
            self.extents.resize(phase + 1, 0);
        }
        self.extents[phase] = self.extents[phase].max(id + 1);
        Ok(())
    }

    /// Removes particle `id` of `phase` from the cell holding `p`.
    pub fn remove_phase(&mut self, p: &Point<D>, phase: usize, id: usize) -> bool {
        let cell = self.decomposer.cell_of(p);
        self.mem.remove(cell, self.codec.encode(phase, id))
    }

    pub fn cell_of(&self, p: &Point<D>) -> usize {
        self.decomposer.cell_of(p)
    }

    pub fn n_elements(&self, cell: usize) -> usize {
        self.mem.n_elements(cell)
    }

    /// Packed entries stored in `cell`.
    pub fn bucket(&self, cell: usize) -> BucketRange<'_, u64> {
        self.mem.range(cell)
    }

    pub fn decomposer(&self) -> &CellDecomposer<D> {
        &self.decomposer
    }

    pub fn codec(&self) -> &PhaseCodec {
        &self.codec
    }

    /// Per phase, one past the largest particle id ever added since the last
    /// fill. Removals do not shrink it.
    pub fn phase_extents(&self) -> &[usize] {
        &self.extents
    }

    pub fn mem(&self) -> &MemBalanced<u64> {
        &self.mem
    }

    pub fn clear(&mut self) {
        self.mem.clear();
        self.extents.clear();
    }
}
