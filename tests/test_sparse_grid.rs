use cellnn_rs::{GridKey, SparseGrid};
use std::collections::BTreeSet;

#[test]
fn test_sparse_sphere_shell() {
    let mut grid = SparseGrid::<f64, 3, 64>::new([4, 4, 4]).unwrap();
    let mut expected = BTreeSet::new();
    for x in -10i64..=10 {
        for y in -10i64..=10 {
            for z in -10i64..=10 {
                let r2 = x * x + y * y + z * z;
                if (64..=100).contains(&r2) {
                    grid.insert(GridKey::new([x, y, z]), r2 as f64);
                    expected.insert(GridKey::new([x, y, z]));
                }
            }
        }
    }
    assert_eq!(grid.size(), expected.len());

    let visited: Vec<GridKey<3>> = grid.iter().collect();
    assert_eq!(visited.len(), expected.len());
    assert_eq!(visited.into_iter().collect::<BTreeSet<_>>(), expected);

    // Upper octant only
    let octant: BTreeSet<GridKey<3>> = grid
        .iter_sub(GridKey::new([0, 0, 0]), GridKey::new([10, 10, 10]))
        .collect();
    let expected_octant: BTreeSet<GridKey<3>> = expected
        .iter()
        .copied()
        .filter(|k| k.coords().iter().all(|&c| c >= 0))
        .collect();
    assert_eq!(octant, expected_octant);

    // Keys from the iterator address the stored values
    let mut it = grid.iter();
    while it.is_next() {
        let key = it.get_key_f();
        let p = it.get();
        let r2: i64 = p.coords().iter().map(|c| c * c).sum();
        assert_eq!(*grid.get_by_key(key), r2 as f64);
        assert_eq!(grid.key_coord(key), p);
        it.advance();
    }
}

#[test]
fn test_remove_everything() {
    let mut grid = SparseGrid::<u16, 2, 16>::new([4, 4]).unwrap();
    let keys: Vec<GridKey<2>> = (0..40).map(|i| GridKey::new([i * 3 - 50, i % 7])).collect();
    for (n, k) in keys.iter().enumerate() {
        grid.insert(*k, n as u16);
    }
    for (n, k) in keys.iter().enumerate().rev() {
        assert_eq!(grid.remove(k), Some(n as u16));
        assert_eq!(grid.size(), n);
        // Everything not yet removed is still reachable
        for (m, other) in keys.iter().enumerate().take(n) {
            assert_eq!(grid.get(other), Some(&(m as u16)));
        }
    }
    assert!(grid.is_empty());
    assert_eq!(grid.iter().count(), 0);
}
