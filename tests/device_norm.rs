//! Integration tests for batched device norms of symmetric tiles
//!
//! Tests verify correctness across:
//! - Max, One/Inf and Frobenius norms, lower and upper storage
//! - Work-groups narrower than the tile
//! - NaN propagation and scaling near overflow
//! - Output stride rules, quick returns, device faults

use tilr::device;
use tilr::prelude::*;
use tilr::tile::TilePtr;

fn engine(block_size: usize) -> Engine {
    Engine::new(
        EngineConfig::new()
            .with_host_threads(1)
            .with_num_devices(1)
            .with_device_block_size(block_size),
    )
    .unwrap()
}

/// Symmetric `n × n` tile with stride `lda`; the triangle opposite to
/// `uplo` holds `junk`
fn tile(n: usize, lda: usize, uplo: Uplo, junk: f64, f: impl Fn(usize, usize) -> f64) -> Vec<f64> {
    let mut data = vec![junk; lda * n];
    for j in 0..n {
        for i in 0..n {
            if uplo.contains(i, j) {
                data[i + j * lda] = f(i.max(j), i.min(j));
            }
        }
    }
    data
}

fn value(i: usize, j: usize) -> f64 {
    // i >= j
    ((i * 5 + j * 3) % 11) as f64 - 5.0
}

#[allow(clippy::too_many_arguments)]
fn run(
    engine: &Engine,
    norm: Norm,
    uplo: Uplo,
    n: usize,
    tiles: &[Vec<f64>],
    lda: usize,
    values: &mut [f64],
    ldv: usize,
) -> (usize, usize) {
    let ptrs: Vec<TilePtr<'_, f64>> = tiles.iter().map(|t| TilePtr::new(t)).collect();
    let client = engine.device(0).unwrap();
    let mut queue = client.queue(0);
    device::henorm(norm, uplo, n, &ptrs, lda, values, ldv, tiles.len(), &mut queue).unwrap();
    let counts = (queue.launch_count(), queue.memset_count());
    queue.sync();
    counts
}

fn dense_column_sums(n: usize) -> Vec<f64> {
    (0..n)
        .map(|j| (0..n).map(|i| value(i.max(j), i.min(j)).abs()).sum())
        .collect()
}

// ============================================================================
// Norm kinds
// ============================================================================

#[test]
fn test_max_over_a_batch() {
    let engine = engine(4);
    let n = 6;
    let tiles = vec![
        tile(n, n, Uplo::Lower, 100.0, value),
        tile(n, n, Uplo::Lower, 100.0, |i, j| value(i, j) * 2.0),
    ];
    let mut values = vec![-1.0; 2];
    let (launches, memsets) = run(&engine, Norm::Max, Uplo::Lower, n, &tiles, n, &mut values, 1);
    assert_eq!((launches, memsets), (1, 0));
    let expected = (0..n)
        .flat_map(|j| (j..n).map(move |i| value(i, j).abs()))
        .fold(0.0, f64::max);
    assert_eq!(values, vec![expected, 2.0 * expected]);
}

#[test]
fn test_one_and_inf_are_column_sums() {
    let n = 5;
    let lda = 7;
    let expected = dense_column_sums(n);
    for uplo in [Uplo::Lower, Uplo::Upper] {
        for block_size in [1, 2, 512] {
            let engine = engine(block_size);
            let tiles = vec![tile(n, lda, uplo, 1.0e9, value)];
            for norm in [Norm::One, Norm::Inf] {
                let ldv = n + 1;
                let mut values = vec![0.0; ldv];
                run(&engine, norm, uplo, n, &tiles, lda, &mut values, ldv);
                assert_eq!(&values[..n], &expected[..], "{:?} {:?} block {}", norm, uplo, block_size);
            }
        }
    }
}

#[test]
fn test_fro_matches_dense() {
    let n = 7;
    let dense: f64 = (0..n)
        .flat_map(|j| (0..n).map(move |i| value(i.max(j), i.min(j)).powi(2)))
        .sum::<f64>()
        .sqrt();
    for block_size in [3, 512] {
        let engine = engine(block_size);
        let tiles = vec![tile(n, n, Uplo::Upper, f64::NAN, value)];
        let mut values = vec![0.0; 2];
        run(&engine, Norm::Fro, Uplo::Upper, n, &tiles, n, &mut values, 2);
        let fro = values[0] * values[1].sqrt();
        assert!((fro - dense).abs() <= 1e-13 * dense, "{} vs {}", fro, dense);
    }
}

#[test]
fn test_zero_tiles() {
    let engine = engine(8);
    let n = 4;
    let tiles = vec![vec![0.0; n * n]; 3];

    let mut max = vec![1.0; 3];
    run(&engine, Norm::Max, Uplo::Lower, n, &tiles, n, &mut max, 1);
    assert_eq!(max, vec![0.0; 3]);

    let mut fro = vec![1.0; 6];
    run(&engine, Norm::Fro, Uplo::Lower, n, &tiles, n, &mut fro, 2);
    for k in 0..3 {
        assert_eq!(fro[2 * k] * fro[2 * k + 1].sqrt(), 0.0);
    }
}

// ============================================================================
// Special values
// ============================================================================

#[test]
fn test_nan_in_stored_triangle_propagates() {
    let engine = engine(2);
    let n = 4;
    let mut t = tile(n, n, Uplo::Lower, 0.0, value);
    t[3] = f64::NAN; // element (3, 0)
    let tiles = vec![t];
    for norm in [Norm::Max, Norm::One] {
        let ldv = if norm == Norm::Max { 1 } else { n };
        let mut values = vec![0.0; ldv];
        run(&engine, norm, Uplo::Lower, n, &tiles, n, &mut values, ldv);
        assert!(values.iter().any(|v| v.is_nan()), "{:?}", norm);
    }
    let mut values = vec![0.0; 2];
    run(&engine, Norm::Fro, Uplo::Lower, n, &tiles, n, &mut values, 2);
    assert!((values[0] * values[1].sqrt()).is_nan());
}

#[test]
fn test_nan_outside_stored_triangle_ignored() {
    let engine = engine(2);
    let n = 4;
    let tiles = vec![tile(n, n, Uplo::Lower, f64::NAN, value)];
    let mut values = vec![0.0; 1];
    run(&engine, Norm::Max, Uplo::Lower, n, &tiles, n, &mut values, 1);
    assert!(!values[0].is_nan());
}

#[test]
fn test_fro_near_overflow() {
    let engine = engine(2);
    let n = 4;
    let big = f64::MAX / 8.0;
    let tiles = vec![tile(n, n, Uplo::Lower, 0.0, |_, _| big)];
    let mut values = vec![0.0; 2];
    run(&engine, Norm::Fro, Uplo::Lower, n, &tiles, n, &mut values, 2);
    // every one of the n² entries is `big`: the norm is n * big
    let expected_ratio = (n * n) as f64;
    assert!(values[0].is_finite() && values[1].is_finite());
    assert!((values[0] / big - 1.0).abs() < 1e-15);
    assert!((values[1] - expected_ratio).abs() < 1e-12 * expected_ratio);
}

// ============================================================================
// Argument rules and quick returns
// ============================================================================

#[test]
fn test_empty_tiles_are_memset() {
    let engine = engine(4);
    let tiles = vec![Vec::new(); 3];

    let mut max = vec![9.0; 3];
    let counts = run(&engine, Norm::Max, Uplo::Lower, 0, &tiles, 1, &mut max, 1);
    assert_eq!(counts, (0, 1));
    assert_eq!(max, vec![0.0; 3]);

    let mut fro = vec![9.0; 6];
    let counts = run(&engine, Norm::Fro, Uplo::Lower, 0, &tiles, 1, &mut fro, 2);
    assert_eq!(counts, (0, 1));
    assert_eq!(fro, vec![0.0; 6]);
}

#[test]
fn test_empty_batch_enqueues_nothing() {
    let engine = engine(4);
    let mut values = vec![5.0; 2];
    let counts = run(&engine, Norm::Fro, Uplo::Lower, 3, &[], 3, &mut values, 2);
    assert_eq!(counts, (0, 0));
    assert_eq!(values, vec![5.0; 2]);
}

#[test]
fn test_output_stride_rules() {
    let engine = engine(4);
    let n = 3;
    let data = tile(n, n, Uplo::Lower, 0.0, value);
    let ptrs = vec![TilePtr::new(&data)];
    let client = engine.device(0).unwrap();
    for (norm, ldv) in [(Norm::Max, 2), (Norm::One, n - 1), (Norm::Inf, 1), (Norm::Fro, 3)] {
        let mut values = vec![0.0; 8];
        let mut queue = client.queue(0);
        let err = device::henorm(norm, Uplo::Lower, n, &ptrs, n, &mut values, ldv, 1, &mut queue)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { arg: "ldv", .. }), "{:?}: {}", norm, err);
        assert_eq!(queue.launch_count(), 0);
    }
}

#[test]
fn test_general_storage_rejected() {
    let engine = engine(4);
    let data = vec![0.0; 4];
    let ptrs = vec![TilePtr::new(&data)];
    let client = engine.device(0).unwrap();
    let mut values = vec![0.0; 1];
    let mut queue = client.queue(0);
    let err = device::henorm(Norm::Max, Uplo::General, 2, &ptrs, 2, &mut values, 1, 1, &mut queue)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { arg: "uplo", .. }));
}

#[test]
#[should_panic(expected = "fault in henorm_max_kernel")]
fn test_short_tile_faults_the_device() {
    let engine = engine(4);
    let n = 3;
    let tiles = vec![vec![1.0; n * n - 1]];
    let mut values = vec![0.0; 1];
    run(&engine, Norm::Max, Uplo::Lower, n, &tiles, n, &mut values, 1);
}

// ============================================================================
// Complex tiles
// ============================================================================

#[test]
fn test_hermitian_diagonal_imaginary_part_ignored() {
    let engine = engine(2);
    let n = 2;
    let data = vec![
        Complex128::new(3.0, 7.0),
        Complex128::new(0.0, 4.0),
        Complex128::new(99.0, 99.0),
        Complex128::new(-1.0, 9.0),
    ];
    let ptrs = vec![TilePtr::new(&data)];
    let client = engine.device(0).unwrap();
    let mut max = vec![0.0f64; 1];
    let mut one = vec![0.0f64; n];
    {
        let mut queue = client.queue(0);
        device::henorm(Norm::Max, Uplo::Lower, n, &ptrs, n, &mut max, 1, 1, &mut queue).unwrap();
        device::henorm(Norm::One, Uplo::Lower, n, &ptrs, n, &mut one, n, 1, &mut queue).unwrap();
        queue.sync();
    }
    // off-diagonal |4i| = 4, diagonals contribute |3| and |-1|
    assert_eq!(max, vec![4.0]);
    assert_eq!(one, vec![7.0, 5.0]);
}
