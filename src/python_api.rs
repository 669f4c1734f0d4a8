use crate::config;
use crate::single;
use crate::stencil::NeighborMode;
use crate::verlet::VerletListM;
use numpy::{PyArrayMethods, PyReadonlyArray2, PyUntypedArrayMethods};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::borrow::Cow;

fn get_positions<'a, const D: usize>(
    positions: &'a PyReadonlyArray2<'a, f64>,
) -> PyResult<Cow<'a, [[f64; D]]>> {
    if positions.shape()[1] != D {
        return Err(pyo3::exceptions::PyValueError::new_err(format!(
            "Positions must be (N, {D})"
        )));
    }

    if let Ok(slice) = positions.as_slice()
        && let Ok(rows) = bytemuck::try_cast_slice(slice)
    {
        return Ok(Cow::Borrowed(rows));
    }

    // Fallback: Copy
    let view = positions.as_array();
    let mut rows = Vec::with_capacity(view.shape()[0]);
    for row in view.rows() {
        let mut p = [0.0; D];
        for (dst, src) in p.iter_mut().zip(row.iter()) {
            *dst = *src;
        }
        rows.push(p);
    }
    Ok(Cow::Owned(rows))
}

fn edge_lists<const D: usize>(vl: &VerletListM<D>) -> (Vec<i64>, Vec<i64>) {
    let n_edges = vl.list().total_neighbors();
    let mut edge_i = Vec::with_capacity(n_edges);
    let mut edge_j = Vec::with_capacity(n_edges);
    for i in 0..vl.size() {
        for (_, j) in vl.neighbors(i) {
            edge_i.push(i as i64);
            edge_j.push(j as i64);
        }
    }
    (edge_i, edge_j)
}

fn build_dim<const D: usize>(
    positions: &PyReadonlyArray2<'_, f64>,
    cutoff: f64,
    mode: NeighborMode,
    parallel: bool,
) -> PyResult<(Vec<i64>, Vec<i64>)> {
    let rows = get_positions::<D>(positions)?;
    let vl = single::build_neighborlists(&rows, cutoff, mode, parallel)
        .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))?;
    Ok(edge_lists(&vl))
}

#[pyfunction]
#[pyo3(signature = (positions, cutoff, symmetric=false, parallel=true))]
fn build_neighborlists<'py>(
    py: Python<'py>,
    positions: PyReadonlyArray2<'_, f64>,
    cutoff: f64,
    symmetric: bool,
    parallel: bool,
) -> PyResult<Bound<'py, PyDict>> {
    let mode = if symmetric {
        NeighborMode::Symmetric
    } else {
        NeighborMode::NonSymmetric
    };
    let (mut edge_i, edge_j) = match positions.shape()[1] {
        2 => build_dim::<2>(&positions, cutoff, mode, parallel)?,
        3 => build_dim::<3>(&positions, cutoff, mode, parallel)?,
        d => {
            return Err(pyo3::exceptions::PyValueError::new_err(format!(
                "Positions must be (N, 2) or (N, 3), got (N, {d})"
            )));
        }
    };

    let dict = PyDict::new(py);
    let n_edges = edge_i.len();
    edge_i.extend(edge_j);
    let edge_index = numpy::PyArray1::from_vec(py, edge_i).reshape((2, n_edges))?;
    dict.set_item("edge_index", edge_index)?;
    Ok(dict)
}

#[pyfunction]
fn get_num_threads() -> usize {
    rayon::current_num_threads()
}

#[pyfunction]
fn set_num_threads(n: usize) -> PyResult<()> {
    // build_global only succeeds once; later calls keep the existing pool
    let _ = rayon::ThreadPoolBuilder::new()
        .num_threads(n)
        .build_global();
    Ok(())
}

#[pyfunction]
fn get_brute_force_threshold() -> usize {
    config::get_brute_force_threshold()
}

#[pyfunction]
fn set_brute_force_threshold(val: usize) {
    config::set_brute_force_threshold(val);
}

#[pyfunction]
fn get_parallel_threshold() -> usize {
    config::get_parallel_threshold()
}

#[pyfunction]
fn set_parallel_threshold(val: usize) {
    config::set_parallel_threshold(val);
}

#[pyfunction]
fn get_verlet_slot() -> usize {
    config::get_verlet_slot()
}

#[pyfunction]
fn set_verlet_slot(val: usize) {
    config::set_verlet_slot(val);
}

#[pyfunction]
#[pyo3(signature = (level=None))]
fn init_logging(level: Option<String>) {
    config::init_logging(level.as_deref());
}

#[pymodule]
fn cellnn_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(build_neighborlists, m)?)?;
    m.add_function(wrap_pyfunction!(get_num_threads, m)?)?;
    m.add_function(wrap_pyfunction!(set_num_threads, m)?)?;
    m.add_function(wrap_pyfunction!(init_logging, m)?)?;
    m.add_function(wrap_pyfunction!(get_brute_force_threshold, m)?)?;
    m.add_function(wrap_pyfunction!(set_brute_force_threshold, m)?)?;
    m.add_function(wrap_pyfunction!(get_parallel_threshold, m)?)?;
    m.add_function(wrap_pyfunction!(set_parallel_threshold, m)?)?;
    m.add_function(wrap_pyfunction!(get_verlet_slot, m)?)?;
    m.add_function(wrap_pyfunction!(set_verlet_slot, m)?)?;
    Ok(())
}
