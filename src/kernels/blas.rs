//! Tile gemm and syr2k

use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::tile::{Op, TileLayout, TileView, TileViewMut, Uplo, check_extent, check_tile_shape};

/// `c = alpha * a * b + beta * c` on logical (op-applied) tiles.
///
/// With `beta == 0` the prior content of `c` is not read.
pub fn gemm<T: Element>(
    alpha: T,
    a: &TileView<'_, T>,
    b: &TileView<'_, T>,
    beta: T,
    c: &mut TileViewMut<'_, T>,
) -> Result<()> {
    let (m, k) = (a.rows(), a.cols());
    let n = b.cols();
    check_tile_shape("b", b.rows(), b.cols(), (k, n))?;
    check_tile_shape("c", c.rows(), c.cols(), (m, n))?;

    for j in 0..n {
        for i in 0..m {
            let mut sum = T::ZERO;
            for l in 0..k {
                sum += a.at(i, l) * b.at(l, j);
            }
            let prior = if beta == T::ZERO {
                T::ZERO
            } else {
                beta * c.at(i, j)
            };
            c.set(i, j, alpha * sum + prior);
        }
    }
    Ok(())
}

/// Symmetric rank-2k update of one tile:
/// `c = alpha * a * bᵀ + alpha * b * aᵀ + beta * c`,
/// touching only the `uplo` triangle of the logical `c`.
pub fn syr2k<T: Element>(
    uplo: Uplo,
    alpha: T,
    a: &TileView<'_, T>,
    b: &TileView<'_, T>,
    beta: T,
    c: &mut TileViewMut<'_, T>,
) -> Result<()> {
    let (n, k) = (a.rows(), a.cols());
    check_tile_shape("b", b.rows(), b.cols(), (n, k))?;
    check_tile_shape("c", c.rows(), c.cols(), (n, n))?;

    for j in 0..n {
        for i in 0..n {
            if !uplo.contains(i, j) {
                continue;
            }
            let mut sum = T::ZERO;
            for l in 0..k {
                sum += a.at(i, l) * b.at(j, l) + b.at(i, l) * a.at(j, l);
            }
            let prior = if beta == T::ZERO {
                T::ZERO
            } else {
                beta * c.at(i, j)
            };
            c.set(i, j, alpha * sum + prior);
        }
    }
    Ok(())
}

// ============================================================================
// Raw variants for batched calls
// ============================================================================

fn check_operand(
    arg: &'static str,
    layout: TileLayout,
    rows: usize,
    cols: usize,
    ld: usize,
    len: usize,
) -> Result<()> {
    check_extent(layout, rows, cols, ld, len).map_err(|e| Error::invalid_argument(arg, e.to_string()))
}

/// Stored extent of `op(X)` when `op(X)` is `rows x cols`
#[inline]
fn stored_dims(op: Op, rows: usize, cols: usize) -> (usize, usize) {
    if op.is_trans() { (cols, rows) } else { (rows, cols) }
}

/// Element `(i, j)` of `op(X)`
#[inline(always)]
fn load<T: Element>(data: &[T], layout: TileLayout, op: Op, ld: usize, i: usize, j: usize) -> T {
    let (r, c) = if op.is_trans() { (j, i) } else { (i, j) };
    let v = data[layout.offset(r, c, ld)];
    if op == Op::ConjTrans { v.conj() } else { v }
}

/// `C = alpha * op_a(A) * op_b(B) + beta * C` for an `m x n` stored `C`
#[allow(clippy::too_many_arguments)]
pub fn gemm_raw<T: Element>(
    layout: TileLayout,
    op_a: Op,
    op_b: Op,
    m: usize,
    n: usize,
    k: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    b: &[T],
    ldb: usize,
    beta: T,
    c: &mut [T],
    ldc: usize,
) -> Result<()> {
    let (ar, ac) = stored_dims(op_a, m, k);
    let (br, bc) = stored_dims(op_b, k, n);
    check_operand("a", layout, ar, ac, lda, a.len())?;
    check_operand("b", layout, br, bc, ldb, b.len())?;
    check_operand("c", layout, m, n, ldc, c.len())?;

    for j in 0..n {
        for i in 0..m {
            let mut sum = T::ZERO;
            for l in 0..k {
                sum += load(a, layout, op_a, lda, i, l) * load(b, layout, op_b, ldb, l, j);
            }
            let off = layout.offset(i, j, ldc);
            let prior = if beta == T::ZERO {
                T::ZERO
            } else {
                beta * c[off]
            };
            c[off] = alpha * sum + prior;
        }
    }
    Ok(())
}

/// Symmetric rank-2k update of an `n x n` stored `C`, `uplo` triangle only.
///
/// `op == NoTrans`: `C = alpha * (A * Bᵀ + B * Aᵀ) + beta * C`, A and B `n x k`.
/// `op == Trans`: `C = alpha * (Aᵀ * B + Bᵀ * A) + beta * C`, A and B `k x n`.
#[allow(clippy::too_many_arguments)]
pub fn syr2k_raw<T: Element>(
    layout: TileLayout,
    uplo: Uplo,
    op: Op,
    n: usize,
    k: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    b: &[T],
    ldb: usize,
    beta: T,
    c: &mut [T],
    ldc: usize,
) -> Result<()> {
    if op == Op::ConjTrans && T::IS_COMPLEX {
        return Err(Error::invalid_argument(
            "op",
            "symmetric rank-2k update of a complex tile cannot use ConjTrans",
        ));
    }
    let (ar, ac) = stored_dims(op, n, k);
    check_operand("a", layout, ar, ac, lda, a.len())?;
    check_operand("b", layout, ar, ac, ldb, b.len())?;
    check_operand("c", layout, n, n, ldc, c.len())?;

    for j in 0..n {
        for i in 0..n {
            if !uplo.contains(i, j) {
                continue;
            }
            let mut sum = T::ZERO;
            for l in 0..k {
                sum += load(a, layout, op, lda, i, l) * load(b, layout, op, ldb, j, l)
                    + load(b, layout, op, ldb, i, l) * load(a, layout, op, lda, j, l);
            }
            let off = layout.offset(i, j, ldc);
            let prior = if beta == T::ZERO {
                T::ZERO
            } else {
                beta * c[off]
            };
            c[off] = alpha * sum + prior;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::Tile;

    fn tile(mb: usize, nb: usize, f: impl FnMut(usize, usize) -> f64) -> Tile<f64> {
        Tile::from_fn(mb, nb, TileLayout::ColMajor, f)
    }

    #[test]
    fn test_gemm_with_transposed_operand() {
        // a: 2x3, b stored 2x3 and used as bᵀ (3x2)
        let a = tile(2, 3, |r, c| (r * 3 + c) as f64);
        let b = tile(2, 3, |r, c| if r == c { 1.0 } else { 0.0 });
        let mut c = tile(2, 2, |_, _| 1.0);
        gemm(
            2.0,
            &a.view(),
            &b.view().with_op(Op::Trans),
            1.0,
            &mut c.view_mut(),
        )
        .unwrap();
        // a * bᵀ = first two columns of a
        assert_eq!(c.get(0, 0), 1.0);
        assert_eq!(c.get(0, 1), 3.0);
        assert_eq!(c.get(1, 0), 7.0);
        assert_eq!(c.get(1, 1), 9.0);
    }

    #[test]
    fn test_gemm_beta_zero_ignores_nan() {
        let a = tile(1, 1, |_, _| 2.0);
        let b = tile(1, 1, |_, _| 3.0);
        let mut c = tile(1, 1, |_, _| f64::NAN);
        gemm(1.0, &a.view(), &b.view(), 0.0, &mut c.view_mut()).unwrap();
        assert_eq!(c.get(0, 0), 6.0);
    }

    #[test]
    fn test_gemm_shape_mismatch() {
        let a = tile(2, 3, |_, _| 0.0);
        let b = tile(2, 2, |_, _| 0.0);
        let mut c = tile(2, 2, |_, _| 0.0);
        assert!(gemm(1.0, &a.view(), &b.view(), 0.0, &mut c.view_mut()).is_err());
    }

    #[test]
    fn test_syr2k_touches_one_triangle() {
        let a = tile(3, 2, |r, c| (r + c) as f64);
        let b = tile(3, 2, |r, _| r as f64 + 1.0);
        let mut c = tile(3, 3, |_, _| -1.0);
        syr2k(Uplo::Lower, 1.0, &a.view(), &b.view(), 0.0, &mut c.view_mut()).unwrap();
        for j in 0..3 {
            for i in 0..3 {
                if i < j {
                    assert_eq!(c.get(i, j), -1.0);
                } else {
                    let expect: f64 = (0..2)
                        .map(|l| a.get(i, l) * b.get(j, l) + b.get(i, l) * a.get(j, l))
                        .sum();
                    assert_eq!(c.get(i, j), expect);
                }
            }
        }
    }

    #[test]
    fn test_raw_matches_views() {
        let a = tile(2, 3, |r, c| (r as f64) - (c as f64) * 0.5);
        let b = tile(2, 3, |r, c| (r * c) as f64 + 1.0);
        let mut expect = tile(2, 2, |r, c| (r + c) as f64);
        let mut got = expect.clone();
        gemm(1.5, &a.view(), &b.view().with_op(Op::Trans), 0.5, &mut expect.view_mut()).unwrap();
        let ldc = got.stride();
        let mut data = got.data().to_vec();
        gemm_raw(
            TileLayout::ColMajor,
            Op::NoTrans,
            Op::Trans,
            2,
            2,
            3,
            1.5,
            a.data(),
            2,
            b.data(),
            2,
            0.5,
            &mut data,
            ldc,
        )
        .unwrap();
        got = Tile::from_parts(data, 2, 2, ldc, TileLayout::ColMajor).unwrap();
        assert_eq!(got, expect);
    }

    #[test]
    fn test_raw_rejects_short_buffer() {
        let a = vec![0.0f64; 3];
        let mut c = vec![0.0f64; 4];
        let err = syr2k_raw(
            TileLayout::ColMajor,
            Uplo::Lower,
            Op::NoTrans,
            2,
            2,
            1.0,
            &a,
            2,
            &a,
            2,
            0.0,
            &mut c,
            2,
        );
        assert!(err.is_err());
    }
}
