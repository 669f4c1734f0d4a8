//! Verlet (neighbor) lists built on top of a [`CellList`].

use crate::cell_list::CellList;
use crate::config;
use crate::phase::{PhaseCodec, PhaseCodecError};
use crate::space::{Point, SpaceError, distance2};
use crate::stencil::{CrsDomain, NeighborMode, Stencil};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, error, info_span};

const PARALLEL_TASKS_PER_THREAD: usize = 64;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerletError {
    #[error(
        "Cutoff radius {r_cut} exceeds the cell size {cell_size} along axis {axis}; only symmetric construction supports it"
    )]
    CutoffExceedsCellSize {
        r_cut: f64,
        cell_size: f64,
        axis: usize,
    },
    #[error("Cutoff radius must be positive and finite, got {0}")]
    InvalidCutoff(f64),
    #[error(transparent)]
    Codec(#[from] PhaseCodecError),
    #[error(transparent)]
    Space(#[from] SpaceError),
    #[error("Verlet list packs phases in {list} bits but the cell list uses {cell_list}")]
    CodecMismatch { list: u32, cell_list: u32 },
    #[error("Query phase {phase} out of range ({n_phases} phases)")]
    QueryPhaseOutOfRange { phase: usize, n_phases: usize },
    #[error("g_m = {g_m} exceeds the {len} particles of the query phase")]
    DomainRangeTooLarge { g_m: usize, len: usize },
    #[error("Cell list holds ids up to {stored} in phase {phase} but only {given} positions were given")]
    PhaseLengthMismatch {
        phase: usize,
        stored: usize,
        given: usize,
    },
    #[error("Cross-domain symmetric construction needs domain and anomalous cell sets")]
    MissingCrsDomain,
}

/// Flat per-particle neighbor storage.
///
/// Particle `i` owns `cl_base[i * slot .. i * slot + cl_n[i]]`. When a particle
/// outgrows its run the slot doubles and every run is moved.
#[derive(Clone, Debug)]
pub struct VerletList {
    slot: usize,
    cl_n: Vec<usize>,
    cl_base: Vec<u64>,
}

impl Default for VerletList {
    fn default() -> Self {
        Self::new(config::get_verlet_slot())
    }
}

impl VerletList {
    pub fn new(slot: usize) -> Self {
        Self {
            slot: slot.max(1),
            cl_n: Vec::new(),
            cl_base: Vec::new(),
        }
    }

    /// Drops every list and prepares `n_part` empty ones.
    pub fn reset(&mut self, n_part: usize) {
        self.cl_n.clear();
        self.cl_n.resize(n_part, 0);
        self.cl_base.clear();
        self.cl_base.resize(n_part * self.slot, 0);
    }

    pub fn add_part(&mut self, part: usize, ele: u64) {
        if self.cl_n[part] >= self.slot {
            self.grow();
        }
        let n = self.cl_n[part];
        self.cl_base[part * self.slot + n] = ele;
        self.cl_n[part] = n + 1;
    }

    fn grow(&mut self) {
        let new_slot = self.slot * 2;
        debug!(old = self.slot, new = new_slot, "growing Verlet slot");
        let mut base = vec![0u64; self.cl_n.len() * new_slot];
        for (part, &n) in self.cl_n.iter().enumerate() {
            let src = part * self.slot;
            let dst = part * new_slot;
            base[dst..dst + n].copy_from_slice(&self.cl_base[src..src + n]);
        }
        self.cl_base = base;
        self.slot = new_slot;
    }

    /// Number of particles owning a list.
    pub fn size(&self) -> usize {
        self.cl_n.len()
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn n_neighbors(&self, part: usize) -> usize {
        self.cl_n[part]
    }

    pub fn get(&self, part: usize, ele: usize) -> u64 {
        debug_assert!(ele < self.cl_n[part]);
        self.cl_base[part * self.slot + ele]
    }

    pub fn neighbors(&self, part: usize) -> &[u64] {
        let start = part * self.slot;
        &self.cl_base[start..start + self.cl_n[part]]
    }

    /// Total number of stored entries.
    pub fn total_neighbors(&self) -> usize {
        self.cl_n.iter().sum()
    }

    pub fn clear(&mut self) {
        self.reset(0);
    }
}

/// One particle to build a list for, with the cell and stencil to search.
struct Query<'s, const D: usize> {
    part: usize,
    cell: usize,
    stencil: &'s Stencil<D>,
}

/// Everything the candidate filter reads; shared by all workers.
struct Filter<'a, const D: usize> {
    cl: &'a CellList<D>,
    phases: &'a [&'a [Point<D>]],
    query_phase: usize,
    codec: PhaseCodec,
    r_cut2: f64,
    half: bool,
}

impl<const D: usize> Filter<'_, D> {
    fn for_each_neighbor(&self, q: &Query<'_, D>, mut emit: impl FnMut(u64)) {
        let xp = &self.phases[self.query_phase][q.part];
        let me = self.codec.encode(self.query_phase, q.part);
        let decomposer = self.cl.decomposer();
        let coord = decomposer.delinearize(q.cell);

        for offset in q.stencil.offsets() {
            let Some(cell) = decomposer.offset_cell(&coord, offset) else {
                continue;
            };
            let center = offset.iter().all(|&c| c == 0);
            for &packed in self.cl.bucket(cell).iter() {
                if center && (packed == me || (self.half && packed < me)) {
                    continue;
                }
                let (v, id) = self.codec.decode(packed);
                if distance2(xp, &self.phases[v][id]) < self.r_cut2 {
                    emit(packed);
                }
            }
        }
    }
}

/// Multi-phase Verlet list.
///
/// Neighbor entries are packed `(phase, id)` words (see [`PhaseCodec`]). Lists
/// are built for particles `0..g_m` of one query phase; candidates may come
/// from any phase stored in the cell list. A particle is never its own
/// neighbor.
#[derive(Clone, Debug)]
pub struct VerletListM<const D: usize> {
    list: VerletList,
    codec: PhaseCodec,
    parallel: bool,
}

impl<const D: usize> VerletListM<D> {
    /// `sh_byte` is the width of the phase field in bits.
    pub fn new(sh_byte: u32) -> Result<Self, VerletError> {
        Self::with_slot(sh_byte, config::get_verlet_slot())
    }

    pub fn with_slot(sh_byte: u32, slot: usize) -> Result<Self, VerletError> {
        let codec = PhaseCodec::new(sh_byte)?;
        Ok(Self {
            list: VerletList::new(slot),
            codec,
            parallel: true,
        })
    }

    pub(crate) fn from_list(list: VerletList, codec: PhaseCodec) -> Self {
        Self {
            list,
            codec,
            parallel: true,
        }
    }

    /// Allow or forbid rayon during construction. Large builds (at least
    /// [`config::get_parallel_threshold`] queries) go parallel when allowed.
    pub fn set_parallel(&mut self, parallel: bool) {
        self.parallel = parallel;
    }

    pub fn codec(&self) -> &PhaseCodec {
        &self.codec
    }

    /// Builds lists for particles `0..g_m` of `phases[query_phase]`.
    ///
    /// Outside symmetric mode `r_cut` must not exceed the cell size on any axis.
    /// On error the list is left empty.
    pub fn initialize(
        &mut self,
        cl: &CellList<D>,
        r_cut: f64,
        query_phase: usize,
        phases: &[&[Point<D>]],
        g_m: usize,
        mode: NeighborMode,
    ) -> Result<(), VerletError> {
        if mode == NeighborMode::CrossSymmetric {
            return self.fail(VerletError::MissingCrsDomain);
        }
        let request = Request {
            cl,
            r_cut,
            query_phase,
            phases,
            g_m,
            mode,
            crs: None,
        };
        let result = self.create(&request);
        self.finish(result)
    }

    /// Cross-domain symmetric construction: only particles (of the query phase,
    /// below `g_m`) sitting in the cells of `crs` receive lists.
    pub fn initialize_crs(
        &mut self,
        cl: &CellList<D>,
        r_cut: f64,
        query_phase: usize,
        phases: &[&[Point<D>]],
        g_m: usize,
        crs: &CrsDomain<D>,
    ) -> Result<(), VerletError> {
        let request = Request {
            cl,
            r_cut,
            query_phase,
            phases,
            g_m,
            mode: NeighborMode::CrossSymmetric,
            crs: Some(crs),
        };
        let result = self.create(&request);
        self.finish(result)
    }

    fn fail(&mut self, err: VerletError) -> Result<(), VerletError> {
        self.finish(Err(err))
    }

    fn finish(&mut self, result: Result<(), VerletError>) -> Result<(), VerletError> {
        result.inspect_err(|err| {
            error!(%err, "Verlet list construction failed");
            self.list.clear();
        })
    }

    fn validate(&self, req: &Request<'_, D>) -> Result<(), VerletError> {
        if !req.r_cut.is_finite() || req.r_cut <= 0.0 {
            return Err(VerletError::InvalidCutoff(req.r_cut));
        }
        if *req.cl.codec() != self.codec {
            return Err(VerletError::CodecMismatch {
                list: self.codec.sh_byte(),
                cell_list: req.cl.codec().sh_byte(),
            });
        }
        let n_phases = req.phases.len();
        if req.query_phase >= n_phases {
            return Err(VerletError::QueryPhaseOutOfRange {
                phase: req.query_phase,
                n_phases,
            });
        }
        let len = req.phases[req.query_phase].len();
        if req.g_m > len {
            return Err(VerletError::DomainRangeTooLarge { g_m: req.g_m, len });
        }
        self.codec.check(n_phases - 1, 0)?;
        for (phase, &stored) in req.cl.phase_extents().iter().enumerate() {
            let given = req.phases.get(phase).map_or(0, |p| p.len());
            if stored > given {
                return Err(VerletError::PhaseLengthMismatch {
                    phase,
                    stored,
                    given,
                });
            }
        }
        for positions in req.phases {
            if let Some(last) = positions.len().checked_sub(1) {
                self.codec.check(0, last)?;
            }
        }
        if req.mode != NeighborMode::Symmetric {
            let cell_box = req.cl.decomposer().cell_box();
            if let Some(axis) = (0..D).find(|&a| req.r_cut > cell_box[a]) {
                return Err(VerletError::CutoffExceedsCellSize {
                    r_cut: req.r_cut,
                    cell_size: cell_box[axis],
                    axis,
                });
            }
        }
        if req.mode == NeighborMode::CrossSymmetric && req.crs.is_none() {
            return Err(VerletError::MissingCrsDomain);
        }
        Ok(())
    }

    fn create(&mut self, req: &Request<'_, D>) -> Result<(), VerletError> {
        let _span = info_span!("VerletListM::create", g_m = req.g_m, mode = ?req.mode).entered();
        self.validate(req)?;

        let cell_box = req.cl.decomposer().cell_box();
        let mut extent = [1i64; D];
        if req.mode == NeighborMode::Symmetric {
            for (axis, e) in extent.iter_mut().enumerate() {
                *e = ((req.r_cut / cell_box[axis]).ceil() as i64).max(1);
            }
        }
        let stencil = Stencil::for_mode(req.mode, extent);

        let queries = {
            let _s = info_span!("plan_queries").entered();
            plan_queries(req, &stencil)
        };

        let filter = Filter {
            cl: req.cl,
            phases: req.phases,
            query_phase: req.query_phase,
            codec: self.codec,
            r_cut2: req.r_cut * req.r_cut,
            half: req.mode.is_half(),
        };

        self.list.reset(req.g_m);
        if self.parallel && queries.len() >= config::get_parallel_threshold() {
            self.fill_parallel(&filter, &queries);
        } else {
            let _s = info_span!("fill_serial", n_queries = queries.len()).entered();
            for q in &queries {
                let list = &mut self.list;
                filter.for_each_neighbor(q, |e| list.add_part(q.part, e));
            }
        }
        Ok(())
    }

    fn fill_parallel(&mut self, filter: &Filter<'_, D>, queries: &[Query<'_, D>]) {
        let _s = info_span!("fill_parallel", n_queries = queries.len()).entered();
        let num_threads = rayon::current_num_threads();
        let min_len = (queries.len() / (num_threads * PARALLEL_TASKS_PER_THREAD)).max(1);

        let found: Vec<Vec<u64>> = queries
            .par_iter()
            .with_min_len(min_len)
            .map(|q| {
                let mut local = Vec::new();
                filter.for_each_neighbor(q, |e| local.push(e));
                local
            })
            .collect();

        // Same insertion order as the serial path, so the layout matches too
        for (q, entries) in queries.iter().zip(found) {
            for e in entries {
                self.list.add_part(q.part, e);
            }
        }
    }

    /// Number of particles owning a list (`g_m` after a successful build).
    pub fn size(&self) -> usize {
        self.list.size()
    }

    pub fn n_neighbors(&self, part: usize) -> usize {
        self.list.n_neighbors(part)
    }

    /// Particle id of neighbor `ele` of `part`.
    pub fn get_id(&self, part: usize, ele: usize) -> usize {
        self.codec.id(self.list.get(part, ele))
    }

    /// Phase of neighbor `ele` of `part`.
    pub fn get_phase(&self, part: usize, ele: usize) -> usize {
        self.codec.phase(self.list.get(part, ele))
    }

    /// Decoded `(phase, id)` neighbors of `part`.
    pub fn neighbors(&self, part: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        let codec = self.codec;
        self.list
            .neighbors(part)
            .iter()
            .map(move |&e| codec.decode(e))
    }

    pub fn list(&self) -> &VerletList {
        &self.list
    }

    pub fn into_list(self) -> VerletList {
        self.list
    }
}

struct Request<'a, const D: usize> {
    cl: &'a CellList<D>,
    r_cut: f64,
    query_phase: usize,
    phases: &'a [&'a [Point<D>]],
    g_m: usize,
    mode: NeighborMode,
    crs: Option<&'a CrsDomain<D>>,
}

fn plan_queries<'s, const D: usize>(
    req: &'s Request<'_, D>,
    stencil: &'s Stencil<D>,
) -> Vec<Query<'s, D>> {
    let query_pos = req.phases[req.query_phase];
    match req.crs {
        None => (0..req.g_m)
            .map(|part| Query {
                part,
                cell: req.cl.cell_of(&query_pos[part]),
                stencil,
            })
            .collect(),
        Some(crs) => {
            let codec = req.cl.codec();
            let cells = crs
                .dom
                .iter()
                .map(|&cell| (cell, stencil))
                .chain(crs.anom.iter().map(|a| (a.cell, &a.neighbors)));
            let mut queries = Vec::new();
            for (cell, cell_stencil) in cells {
                for &packed in req.cl.bucket(cell).iter() {
                    let (v, part) = codec.decode(packed);
                    if v == req.query_phase && part < req.g_m {
                        queries.push(Query {
                            part,
                            cell,
                            stencil: cell_stencil,
                        });
                    }
                }
            }
            queries
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::brute_force_neighbors;
    use crate::space::{CellDecomposer, SpaceBox};
    use crate::stencil::AnomalousCell;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn grid(low: f64, high: f64, div: usize) -> CellDecomposer<2> {
        let domain = SpaceBox::new([low, low], [high, high]).unwrap();
        CellDecomposer::new(domain, [div, div], 0).unwrap()
    }

    fn pairs_of(vl: &VerletListM<2>) -> BTreeSet<(usize, usize)> {
        let mut pairs = BTreeSet::new();
        for i in 0..vl.size() {
            for (_, j) in vl.neighbors(i) {
                pairs.insert((i, j));
            }
        }
        pairs
    }

    fn single_phase(
        positions: &[Point<2>],
        decomposer: CellDecomposer<2>,
        r_cut: f64,
        mode: NeighborMode,
    ) -> Result<VerletListM<2>, VerletError> {
        let codec = PhaseCodec::new(1).unwrap();
        let cl = CellList::build(decomposer, codec, &[positions]).unwrap();
        let mut vl = VerletListM::new(1)?;
        vl.set_parallel(false);
        vl.initialize(&cl, r_cut, 0, &[positions], positions.len(), mode)?;
        Ok(vl)
    }

    #[test]
    fn test_three_particle_scenario() {
        let positions = vec![
            Point::from([0.0, 0.0]),
            Point::from([0.5, 0.0]),
            Point::from([5.0, 5.0]),
        ];
        let vl = single_phase(&positions, grid(-1.0, 7.0, 8), 1.0, NeighborMode::NonSymmetric)
            .unwrap();

        assert_eq!(vl.size(), 3);
        assert_eq!(vl.neighbors(0).collect::<Vec<_>>(), vec![(0, 1)]);
        assert_eq!(vl.neighbors(1).collect::<Vec<_>>(), vec![(0, 0)]);
        assert_eq!(vl.n_neighbors(2), 0);
        assert_eq!(vl.get_id(0, 0), 1);
        assert_eq!(vl.get_phase(0, 0), 0);
    }

    #[test]
    fn test_symmetric_stores_each_pair_once() {
        let positions = vec![
            Point::from([0.0, 0.0]),
            Point::from([0.5, 0.0]),
            Point::from([0.5, 0.6]),
            Point::from([5.0, 5.0]),
        ];
        let full = single_phase(&positions, grid(-1.0, 7.0, 8), 1.0, NeighborMode::NonSymmetric)
            .unwrap();
        let half =
            single_phase(&positions, grid(-1.0, 7.0, 8), 1.0, NeighborMode::Symmetric).unwrap();

        let full_pairs = pairs_of(&full);
        let half_pairs = pairs_of(&half);
        for &(i, j) in &full_pairs {
            assert!(full_pairs.contains(&(j, i)));
            assert!(half_pairs.contains(&(i, j)) ^ half_pairs.contains(&(j, i)));
        }
        assert_eq!(half_pairs.len() * 2, full_pairs.len());
    }

    #[test]
    fn test_cutoff_larger_than_cell_is_rejected_outside_symmetric() {
        let positions = vec![Point::from([0.0, 0.0]), Point::from([1.5, 0.0])];
        let err = single_phase(&positions, grid(0.0, 4.0, 4), 2.0, NeighborMode::NonSymmetric)
            .unwrap_err();
        assert_eq!(
            err,
            VerletError::CutoffExceedsCellSize {
                r_cut: 2.0,
                cell_size: 1.0,
                axis: 0
            }
        );

        // The symmetric stencil widens with the radius instead
        let vl = single_phase(&positions, grid(0.0, 4.0, 4), 2.0, NeighborMode::Symmetric).unwrap();
        assert_eq!(pairs_of(&vl), BTreeSet::from([(0, 1)]));
    }

    #[test]
    fn test_failed_build_leaves_empty_list() {
        let positions = vec![Point::from([0.5, 0.5]), Point::from([0.6, 0.5])];
        let codec = PhaseCodec::new(1).unwrap();
        let cl = CellList::build(grid(0.0, 4.0, 4), codec, &[positions.as_slice()]).unwrap();
        let mut vl = VerletListM::<2>::new(1).unwrap();
        vl.initialize(&cl, 0.5, 0, &[positions.as_slice()], 2, NeighborMode::NonSymmetric)
            .unwrap();
        assert_eq!(vl.size(), 2);

        let err = vl
            .initialize(&cl, 0.5, 0, &[positions.as_slice()], 3, NeighborMode::NonSymmetric)
            .unwrap_err();
        assert_eq!(err, VerletError::DomainRangeTooLarge { g_m: 3, len: 2 });
        assert_eq!(vl.size(), 0);
    }

    #[test]
    fn test_validation_errors() {
        let positions = vec![Point::from([0.5, 0.5])];
        let codec = PhaseCodec::new(1).unwrap();
        let cl = CellList::build(grid(0.0, 4.0, 4), codec, &[positions.as_slice()]).unwrap();
        let phases = [positions.as_slice()];

        let mut vl = VerletListM::<2>::new(1).unwrap();
        assert_eq!(
            vl.initialize(&cl, -1.0, 0, &phases, 1, NeighborMode::NonSymmetric),
            Err(VerletError::InvalidCutoff(-1.0))
        );
        assert_eq!(
            vl.initialize(&cl, 0.5, 1, &phases, 1, NeighborMode::NonSymmetric),
            Err(VerletError::QueryPhaseOutOfRange {
                phase: 1,
                n_phases: 1
            })
        );
        assert_eq!(
            vl.initialize(&cl, 0.5, 0, &phases, 1, NeighborMode::CrossSymmetric),
            Err(VerletError::MissingCrsDomain)
        );

        let mut other = VerletListM::<2>::new(4).unwrap();
        assert_eq!(
            other.initialize(&cl, 0.5, 0, &phases, 1, NeighborMode::NonSymmetric),
            Err(VerletError::CodecMismatch {
                list: 4,
                cell_list: 1
            })
        );

        assert_eq!(
            VerletListM::<2>::new(64).unwrap_err(),
            VerletError::Codec(PhaseCodecError::InvalidWidth(64))
        );
    }

    #[test]
    fn test_too_many_phases_for_width() {
        let a = vec![Point::from([0.5, 0.5])];
        let codec = PhaseCodec::new(1).unwrap();
        let cl = CellList::build(grid(0.0, 4.0, 4), codec, &[a.as_slice()]).unwrap();
        let mut vl = VerletListM::<2>::new(1).unwrap();
        let err = vl
            .initialize(
                &cl,
                0.5,
                0,
                &[a.as_slice(), a.as_slice(), a.as_slice()],
                1,
                NeighborMode::NonSymmetric,
            )
            .unwrap_err();
        assert_eq!(
            err,
            VerletError::Codec(PhaseCodecError::PhaseOverflow { phase: 2, bits: 1 })
        );
    }

    #[test]
    fn test_multi_phase_neighbors() {
        let fluid = vec![Point::from([1.0, 1.0]), Point::from([3.0, 3.0])];
        let wall = vec![
            Point::from([1.2, 1.0]),
            Point::from([3.0, 3.3]),
            Point::from([0.0, 3.9]),
        ];
        let codec = PhaseCodec::new(2).unwrap();
        let phases = [fluid.as_slice(), wall.as_slice()];
        let cl = CellList::build(grid(0.0, 4.0, 4), codec, &phases).unwrap();

        let mut vl = VerletListM::<2>::new(2).unwrap();
        vl.initialize(&cl, 0.5, 0, &phases, 2, NeighborMode::NonSymmetric)
            .unwrap();

        assert_eq!(vl.neighbors(0).collect::<Vec<_>>(), vec![(1, 0)]);
        assert_eq!(vl.neighbors(1).collect::<Vec<_>>(), vec![(1, 1)]);
        assert_eq!(vl.get_phase(1, 0), 1);
        assert_eq!(vl.get_id(1, 0), 1);
    }

    #[test]
    fn test_symmetric_two_phases_store_each_pair_once() {
        let scatter = |n: usize, a: f64, b: f64| -> Vec<Point<2>> {
            (0..n)
                .map(|k| Point::from([(k as f64 * a).fract() * 4.0, (k as f64 * b + 0.13).fract() * 4.0]))
                .collect()
        };
        let mut fluid = scatter(14, 0.731, 0.419);
        let mut wall = scatter(11, 0.277, 0.853);
        // One cross pair inside a cell, one across a cell face
        fluid.push(Point::from([2.0, 2.0]));
        wall.push(Point::from([2.1, 2.05]));
        wall.push(Point::from([1.8, 1.9]));

        let codec = PhaseCodec::new(1).unwrap();
        let phases = [fluid.as_slice(), wall.as_slice()];
        let cl = CellList::build(grid(0.0, 4.0, 4), codec, &phases).unwrap();
        let r_cut = 0.9;

        let mut expected = BTreeSet::new();
        let all: Vec<(usize, usize)> = (0..2)
            .flat_map(|v| (0..phases[v].len()).map(move |i| (v, i)))
            .collect();
        for (a, &(va, ia)) in all.iter().enumerate() {
            for &(vb, ib) in &all[a + 1..] {
                if distance2(&phases[va][ia], &phases[vb][ib]) < r_cut * r_cut {
                    expected.insert(((va, ia), (vb, ib)));
                }
            }
        }
        let n_cross = expected.iter().filter(|(p, q)| p.0 != q.0).count();
        assert!(n_cross >= 2);

        let mut found = BTreeSet::new();
        for query_phase in 0..2 {
            let mut vl = VerletListM::<2>::new(1).unwrap();
            vl.set_parallel(false);
            vl.initialize(
                &cl,
                r_cut,
                query_phase,
                &phases,
                phases[query_phase].len(),
                NeighborMode::Symmetric,
            )
            .unwrap();
            for i in 0..vl.size() {
                for (v, j) in vl.neighbors(i) {
                    let (p, q) = ((query_phase, i), (v, j));
                    assert!(found.insert((p.min(q), p.max(q))), "{p:?}-{q:?} stored twice");
                }
            }
        }
        assert_eq!(found, expected);
    }

    #[test]
    fn test_phases_shorter_than_cell_list_rejected() {
        let a = vec![Point::from([0.5, 0.5]), Point::from([0.7, 0.5]), Point::from([0.9, 0.5])];
        let b = vec![Point::from([0.6, 0.6])];
        let codec = PhaseCodec::new(1).unwrap();
        let cl = CellList::build(grid(0.0, 4.0, 4), codec, &[a.as_slice(), b.as_slice()]).unwrap();
        let mut vl = VerletListM::<2>::new(1).unwrap();

        assert_eq!(
            vl.initialize(&cl, 0.5, 0, &[a.as_slice()], 3, NeighborMode::NonSymmetric),
            Err(VerletError::PhaseLengthMismatch {
                phase: 1,
                stored: 1,
                given: 0
            })
        );
        assert_eq!(
            vl.initialize(&cl, 0.5, 0, &[&a[..2], b.as_slice()], 2, NeighborMode::Symmetric),
            Err(VerletError::PhaseLengthMismatch {
                phase: 0,
                stored: 3,
                given: 2
            })
        );
        assert_eq!(vl.size(), 0);

        vl.initialize(&cl, 0.5, 0, &[a.as_slice(), b.as_slice()], 3, NeighborMode::NonSymmetric)
            .unwrap();
        assert_eq!(vl.n_neighbors(0), 3);
    }

    #[test]
    fn test_ghost_particles_get_no_list() {
        let positions = vec![
            Point::from([1.0, 1.0]),
            Point::from([1.3, 1.0]),
            Point::from([1.6, 1.0]),
        ];
        let codec = PhaseCodec::new(1).unwrap();
        let cl = CellList::build(grid(0.0, 4.0, 4), codec, &[positions.as_slice()]).unwrap();
        let mut vl = VerletListM::<2>::new(1).unwrap();
        vl.initialize(&cl, 0.5, 0, &[positions.as_slice()], 1, NeighborMode::NonSymmetric)
            .unwrap();
        assert_eq!(vl.size(), 1);
        // Ghost particle 1 is still a candidate
        assert_eq!(vl.neighbors(0).collect::<Vec<_>>(), vec![(0, 1)]);
    }

    #[test]
    fn test_slot_growth_keeps_lists() {
        let mut positions = Vec::new();
        for i in 0..6 {
            positions.push(Point::from([0.1 + 0.1 * i as f64, 0.5]));
        }
        let codec = PhaseCodec::new(1).unwrap();
        let cl = CellList::build(grid(0.0, 4.0, 4), codec, &[positions.as_slice()]).unwrap();
        let mut vl = VerletListM::<2>::with_slot(1, 2).unwrap();
        vl.set_parallel(false);
        vl.initialize(&cl, 1.0, 0, &[positions.as_slice()], 6, NeighborMode::NonSymmetric)
            .unwrap();

        assert_eq!(vl.list().slot(), 8);
        for i in 0..6 {
            let mut got: Vec<usize> = vl.neighbors(i).map(|(_, j)| j).collect();
            got.sort();
            let expected: Vec<usize> = (0..6).filter(|&j| j != i).collect();
            assert_eq!(got, expected);
        }
        assert_eq!(vl.list().total_neighbors(), 30);
    }

    #[test]
    fn test_crs_domain_and_anomalous_cells() {
        // 4x4 cells of size 1; particles 0 and 1 share cell (1,1),
        // particle 2 sits in cell (2,1), particle 3 in (3,3)
        let positions = vec![
            Point::from([1.2, 1.5]),
            Point::from([1.8, 1.5]),
            Point::from([2.1, 1.5]),
            Point::from([3.5, 3.5]),
        ];
        let decomposer = grid(0.0, 4.0, 4);
        let codec = PhaseCodec::new(1).unwrap();
        let cl = CellList::build(decomposer, codec, &[positions.as_slice()]).unwrap();
        let c11 = cl.decomposer().linearize(&[1, 1]);
        let c21 = cl.decomposer().linearize(&[2, 1]);

        let crs = CrsDomain::new(
            vec![c11],
            vec![AnomalousCell {
                cell: c21,
                // Looks back at (1,1) as well
                neighbors: Stencil::from_offsets(vec![[0, 0], [-1, 0]]),
            }],
        );
        let mut vl = VerletListM::<2>::new(1).unwrap();
        vl.initialize_crs(&cl, 1.0, 0, &[positions.as_slice()], 4, &crs)
            .unwrap();

        assert_eq!(vl.size(), 4);
        assert_eq!(vl.neighbors(0).collect::<Vec<_>>(), vec![(0, 1), (0, 2)]);
        assert_eq!(vl.neighbors(1).collect::<Vec<_>>(), vec![(0, 2)]);
        let mut from_anom: Vec<usize> = vl.neighbors(2).map(|(_, j)| j).collect();
        from_anom.sort();
        assert_eq!(from_anom, vec![0, 1]);
        // Not listed in any partition
        assert_eq!(vl.n_neighbors(3), 0);
    }

    #[test]
    fn test_parallel_matches_serial() {
        let mut positions = Vec::new();
        for i in 0..20 {
            for j in 0..20 {
                positions.push(Point::from([i as f64 * 0.37, j as f64 * 0.41]));
            }
        }
        let decomposer = CellDecomposer::with_min_cell_size(
            SpaceBox::bounding(&positions, 0.1).unwrap(),
            1.0,
            0,
        )
        .unwrap();
        let codec = PhaseCodec::new(1).unwrap();
        let cl = CellList::build(decomposer, codec, &[positions.as_slice()]).unwrap();
        let phases = [positions.as_slice()];
        let request = Request {
            cl: &cl,
            r_cut: 1.0,
            query_phase: 0,
            phases: &phases,
            g_m: positions.len(),
            mode: NeighborMode::NonSymmetric,
            crs: None,
        };

        let mut serial = VerletListM::<2>::with_slot(1, 4).unwrap();
        serial.set_parallel(false);
        serial.create(&request).unwrap();

        // Drive the parallel path directly, independent of the global threshold
        let mut parallel = VerletListM::<2>::with_slot(1, 4).unwrap();
        let stencil = Stencil::full([1, 1]);
        let queries = plan_queries(&request, &stencil);
        let filter = Filter {
            cl: &cl,
            phases: &phases,
            query_phase: 0,
            codec,
            r_cut2: 1.0,
            half: false,
        };
        parallel.list.reset(positions.len());
        parallel.fill_parallel(&filter, &queries);

        assert_eq!(serial.list().slot(), parallel.list().slot());
        for i in 0..positions.len() {
            assert_eq!(serial.list().neighbors(i), parallel.list().neighbors(i));
        }
    }

    proptest! {
        #[test]
        fn test_matches_brute_force(
            r_cut in 0.3..1.5f64,
            data in prop::collection::vec((0.0..10.0f64, 0.0..10.0f64), 2..60)
        ) {
            let positions: Vec<Point<2>> = data.iter().map(|&(x, y)| Point::from([x, y])).collect();
            let decomposer = CellDecomposer::with_min_cell_size(
                SpaceBox::new([0.0, 0.0], [10.0, 10.0]).unwrap(),
                r_cut,
                0,
            ).unwrap();

            let expected: BTreeSet<(usize, usize)> = brute_force_neighbors(&positions, r_cut)
                .into_iter()
                .enumerate()
                .flat_map(|(i, list)| list.into_iter().map(move |j| (i, j)))
                .collect();

            let full = single_phase(&positions, decomposer.clone(), r_cut, NeighborMode::NonSymmetric).unwrap();
            prop_assert_eq!(&pairs_of(&full), &expected);

            let half = single_phase(&positions, decomposer, r_cut, NeighborMode::Symmetric).unwrap();
            let half_pairs = pairs_of(&half);
            for &(i, j) in &expected {
                prop_assert!(half_pairs.contains(&(i, j)) ^ half_pairs.contains(&(j, i)));
            }
            prop_assert_eq!(half_pairs.len() * 2, expected.len());
        }
    }
}
