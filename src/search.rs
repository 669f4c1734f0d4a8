//! All-pairs reference search, vectorized over four candidates at a time.

use crate::space::{Point, distance2};
use wide::{CmpLt, f64x4};

const LANES: usize = 4;

/// Calls `f(i, j)` for every pair `i < j` closer than `cutoff`, in
/// lexicographic order.
pub fn for_each_pair<const D: usize>(
    positions: &[Point<D>],
    cutoff: f64,
    mut f: impl FnMut(usize, usize),
) {
    let n = positions.len();
    let cutoff_sq = cutoff * cutoff;
    let cutoff_sq_v = f64x4::splat(cutoff_sq);

    // One contiguous coordinate column per axis
    let columns: Vec<Vec<f64>> = (0..D)
        .map(|axis| positions.iter().map(|p| p[axis]).collect())
        .collect();

    for i in 0..n {
        let mut j = i + 1;
        while j + LANES <= n {
            let mut d2 = f64x4::splat(0.0);
            for column in &columns {
                let d = f64x4::from(&column[j..j + LANES]) - f64x4::splat(column[i]);
                d2 += d * d;
            }
            let mask = d2.cmp_lt(cutoff_sq_v).move_mask();
            if mask != 0 {
                for lane in 0..LANES {
                    if mask & (1 << lane) != 0 {
                        f(i, j + lane);
                    }
                }
            }
            j += LANES;
        }
        for j in j..n {
            if distance2(&positions[i], &positions[j]) < cutoff_sq {
                f(i, j);
            }
        }
    }
}

/// Unordered pairs `(i, j)`, `i < j`, closer than `cutoff`.
pub fn brute_force_pairs<const D: usize>(positions: &[Point<D>], cutoff: f64) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for_each_pair(positions, cutoff, |i, j| pairs.push((i, j)));
    pairs
}

/// Full neighbor lists (both directions, self excluded), each sorted ascending.
pub fn brute_force_neighbors<const D: usize>(positions: &[Point<D>], cutoff: f64) -> Vec<Vec<usize>> {
    let mut lists = vec![Vec::new(); positions.len()];
    for_each_pair(positions, cutoff, |i, j| {
        lists[i].push(j);
        lists[j].push(i);
    });
    lists
}
