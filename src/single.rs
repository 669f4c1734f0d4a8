use crate::cell_list::CellList;
use crate::config;
use crate::phase::PhaseCodec;
use crate::search;
use crate::space::{CellDecomposer, Point, SpaceBox};
use crate::stencil::NeighborMode;
use crate::verlet::{VerletError, VerletList, VerletListM};
use std::borrow::Cow;
use tracing::{error, info_span};

pub const AUTO_BOX_MARGIN: f64 = 1.0;

/// Views raw coordinate rows as points, copying only when the cast is not
/// possible.
pub fn as_points<const D: usize>(positions: &[[f64; D]]) -> Cow<'_, [Point<D>]> {
    match bytemuck::try_cast_slice::<[f64; D], Point<D>>(positions) {
        Ok(points) => Cow::Borrowed(points),
        Err(_) => Cow::Owned(positions.iter().map(|&p| Point::from(p)).collect()),
    }
}

/// Single-phase Verlet list over an automatically sized, non-periodic domain.
///
/// Systems below [`config::get_brute_force_threshold`] particles skip the cell
/// list entirely. Every particle gets a list.
pub fn build_neighborlists<const D: usize>(
    positions: &[[f64; D]],
    cutoff: f64,
    mode: NeighborMode,
    parallel: bool,
) -> Result<VerletListM<D>, VerletError> {
    let _span = info_span!("build_neighborlists", n = positions.len(), ?mode).entered();
    check_request(cutoff, mode)
        .inspect_err(|err| error!(%err, "rejected neighbor list request"))?;

    let points = as_points(positions);
    let codec = PhaseCodec::new(1)?;
    if points.is_empty() {
        return Ok(VerletListM::from_list(VerletList::default(), codec));
    }

    if points.len() < config::get_brute_force_threshold() {
        Ok(build_brute_force(&points, cutoff, mode, codec))
    } else {
        build_cell_list(&points, cutoff, mode, codec, parallel)
    }
}

fn check_request(cutoff: f64, mode: NeighborMode) -> Result<(), VerletError> {
    if !cutoff.is_finite() || cutoff <= 0.0 {
        return Err(VerletError::InvalidCutoff(cutoff));
    }
    if mode == NeighborMode::CrossSymmetric {
        return Err(VerletError::MissingCrsDomain);
    }
    Ok(())
}

fn build_brute_force<const D: usize>(
    points: &[Point<D>],
    cutoff: f64,
    mode: NeighborMode,
    codec: PhaseCodec,
) -> VerletListM<D> {
    let _s = info_span!("brute_force").entered();
    let mut list = VerletList::default();
    list.reset(points.len());
    let half = mode.is_half();
    search::for_each_pair(points, cutoff, |i, j| {
        list.add_part(i, codec.encode(0, j));
        if !half {
            list.add_part(j, codec.encode(0, i));
        }
    });
    VerletListM::from_list(list, codec)
}

fn build_cell_list<const D: usize>(
    points: &[Point<D>],
    cutoff: f64,
    mode: NeighborMode,
    codec: PhaseCodec,
    parallel: bool,
) -> Result<VerletListM<D>, VerletError> {
    let domain = SpaceBox::bounding(points, cutoff + AUTO_BOX_MARGIN)?;
    let decomposer = CellDecomposer::with_min_cell_size(domain, cutoff, 0)?;
    let phases = [points];
    let cl = CellList::build(decomposer, codec, &phases)?;

    let mut vl = VerletListM::new(codec.sh_byte())?;
    vl.set_parallel(parallel);
    vl.initialize(&cl, cutoff, 0, &phases, points.len(), mode)?;
    Ok(vl)
}
