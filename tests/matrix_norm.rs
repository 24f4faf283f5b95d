//! Integration tests for norms of symmetric matrices

mod common;

use common::{create_engine, random_values, rng, symmetrize};
use tilr::ops;
use tilr::prelude::*;

fn dense_norm(norm: Norm, data: &[f64], n: usize) -> f64 {
    match norm {
        Norm::Max => data.iter().fold(0.0, |m, x| m.max(x.abs())),
        Norm::One | Norm::Inf => (0..n)
            .map(|j| (0..n).map(|i| data[i + j * n].abs()).sum::<f64>())
            .fold(0.0, f64::max),
        Norm::Fro => data.iter().map(|x| x * x).sum::<f64>().sqrt(),
    }
}

#[test]
fn test_norms_match_dense_for_both_triangles() {
    let engine = create_engine(2);
    let n = 10;
    let data = symmetrize(&random_values(&mut rng(21), n * n), n);

    for uplo in [Uplo::Lower, Uplo::Upper] {
        let dist = Distribution::new(n, n, 4, 4).unwrap();
        let a = SymmetricMatrix::from_fn(&engine, uplo, dist, |i, j| data[i + j * n]).unwrap();
        for norm in [Norm::Max, Norm::One, Norm::Inf, Norm::Fro] {
            let expected = dense_norm(norm, &data, n);
            for target in [Target::HostTask, Target::Devices] {
                let got = ops::norm(norm, &a, &Options::new(target)).unwrap();
                assert!(
                    (got - expected).abs() <= 1e-14 * expected.max(1.0) * n as f64,
                    "{:?} {:?} {}: {} vs {}",
                    norm,
                    uplo,
                    target,
                    got,
                    expected
                );
            }
        }
    }
}

#[test]
fn test_norm_after_update() {
    let engine = create_engine(1);
    let n = 6;
    let dist = Distribution::new(n, 1, 3, 1).unwrap();
    let a = Matrix::from_fn(&engine, dist, |i, _| i as f64).unwrap();
    let cdist = Distribution::new(n, n, 3, 3).unwrap();
    let c = SymmetricMatrix::<f64>::zeros(&engine, Uplo::Lower, cdist).unwrap();
    ops::syr2k(0.5, &a, &a, 0.0, &c, &Options::new(Target::Devices)).unwrap();

    // C = a aᵀ with a = (0, 1, ..., 5): max entry 25, Frobenius |a|² = 55
    let opts = Options::default();
    assert_eq!(ops::norm(Norm::Max, &c, &opts).unwrap(), 25.0);
    assert!((ops::norm(Norm::Fro, &c, &opts).unwrap() - 55.0).abs() < 1e-12);
    // column sums: a_j * sum(a) = 15 a_j, largest for j = 5
    assert_eq!(ops::norm(Norm::One, &c, &opts).unwrap(), 75.0);
}

#[test]
fn test_nan_reaches_the_matrix_norm() {
    let engine = create_engine(1);
    let n = 5;
    let dist = Distribution::new(n, n, 2, 2).unwrap();
    let a = SymmetricMatrix::from_fn(&engine, Uplo::Lower, dist, |i, j| {
        if (i, j) == (3, 1) { f64::NAN } else { 1.0 }
    })
    .unwrap();
    for target in [Target::HostTask, Target::Devices] {
        for norm in [Norm::Max, Norm::One, Norm::Fro] {
            let got = ops::norm(norm, &a, &Options::new(target)).unwrap();
            assert!(got.is_nan(), "{:?} {}", norm, target);
        }
    }
}
