use nalgebra::Vector3;
use std::env;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use wide::{CmpLt, f64x4};

fn main() {
    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("tuned_constants.rs");
    let mut f = File::create(&dest_path).unwrap();

    let mut brute_force_threshold = 256;
    let mut parallel_threshold = 4096;

    // Calibration: time an all-pairs cutoff filter on a fixed lattice
    let n_test = 512;
    let mut pos = Vec::with_capacity(n_test);
    for i in 0..8 {
        for j in 0..8 {
            for k in 0..8 {
                pos.push(Vector3::new(i as f64, j as f64, k as f64));
            }
        }
    }
    let cutoff = 1.5;

    let start = Instant::now();
    for _ in 0..5 {
        let _ = dummy_pair_filter_simd(&pos, cutoff);
    }
    let duration = start.elapsed() / 5;
    let micros = duration.as_micros();

    if micros < 200 {
        brute_force_threshold = 512;
        parallel_threshold = 2048;
    } else if micros > 2000 {
        brute_force_threshold = 128;
        parallel_threshold = 8192;
    }

    writeln!(
        f,
        "pub const TUNED_BRUTE_FORCE_THRESHOLD: usize = {};",
        brute_force_threshold
    )
    .unwrap();
    writeln!(
        f,
        "pub const TUNED_PARALLEL_THRESHOLD: usize = {};",
        parallel_threshold
    )
    .unwrap();

    println!(
        "cargo:warning=Auto-tuning: BRUTE_FORCE_THRESHOLD={}, PARALLEL_THRESHOLD={}",
        brute_force_threshold, parallel_threshold
    );
    println!("cargo:rerun-if-changed=build.rs");
}

fn dummy_pair_filter_simd(positions: &[Vector3<f64>], cutoff: f64) -> usize {
    let n = positions.len();
    let cutoff_sq_v = f64x4::from(cutoff * cutoff);
    let mut count = 0;

    let px: Vec<f64> = positions.iter().map(|p| p.x).collect();
    let py: Vec<f64> = positions.iter().map(|p| p.y).collect();
    let pz: Vec<f64> = positions.iter().map(|p| p.z).collect();

    for i in 0..n {
        let pix = f64x4::from(px[i]);
        let piy = f64x4::from(py[i]);
        let piz = f64x4::from(pz[i]);
        let mut j = 0;
        while j + 4 <= n {
            let dx = f64x4::from(&px[j..j + 4]) - pix;
            let dy = f64x4::from(&py[j..j + 4]) - piy;
            let dz = f64x4::from(&pz[j..j + 4]) - piz;
            let d2 = dx * dx + dy * dy + dz * dz;
            if d2.cmp_lt(cutoff_sq_v).any() {
                count += 1;
            }
            j += 4;
        }
    }
    count
}
