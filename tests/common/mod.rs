//! Common test utilities
#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tilr::prelude::*;

/// Engine with two host threads and `devices` emulated accelerators
pub fn create_engine(devices: usize) -> Engine {
    Engine::new(
        EngineConfig::new()
            .with_host_threads(2)
            .with_num_devices(devices),
    )
    .unwrap()
}

/// Seeded generator so failures reproduce
pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// `len` values uniform in `[-1, 1)`
pub fn random_values(rng: &mut StdRng, len: usize) -> Vec<f64> {
    (0..len).map(|_| rng.random::<f64>() * 2.0 - 1.0).collect()
}

/// Column-major `m × n` matrix from `data`
pub fn matrix_from(
    engine: &Engine,
    data: &[f64],
    m: usize,
    n: usize,
    mb: usize,
    nb: usize,
) -> Matrix<f64> {
    let dist = Distribution::new(m, n, mb, nb).unwrap();
    Matrix::from_fn(engine, dist, |i, j| data[i + j * m]).unwrap()
}

/// Column-major symmetric `n × n` copy of `data` with the lower triangle
/// mirrored into the upper one
pub fn symmetrize(data: &[f64], n: usize) -> Vec<f64> {
    let mut out = data.to_vec();
    for j in 0..n {
        for i in 0..j {
            out[i + j * n] = data[j + i * n];
        }
    }
    out
}

/// Dense `alpha A Bᵀ + alpha B Aᵀ + beta C`, with `A` and `B` column-major `n × k`
pub fn reference_syr2k(
    alpha: f64,
    a: &[f64],
    b: &[f64],
    beta: f64,
    c: &[f64],
    n: usize,
    k: usize,
) -> Vec<f64> {
    let mut out = vec![0.0; n * n];
    for j in 0..n {
        for i in 0..n {
            let mut sum = 0.0;
            for l in 0..k {
                sum += a[i + l * n] * b[j + l * n] + b[i + l * n] * a[j + l * n];
            }
            out[i + j * n] = alpha * sum + beta * c[i + j * n];
        }
    }
    out
}

/// Lower triangle of a column-major `n × n` matrix, column by column
pub fn lower(data: &[f64], n: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(n * (n + 1) / 2);
    for j in 0..n {
        for i in j..n {
            out.push(data[i + j * n]);
        }
    }
    out
}

/// Largest absolute value
pub fn max_abs(data: &[f64]) -> f64 {
    data.iter().fold(0.0, |m, x| m.max(x.abs()))
}

/// Assert two f64 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose_f64(a: &[f64], b: &[f64], rtol: f64, atol: f64, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}
