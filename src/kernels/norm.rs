//! Tile norms and the reductions they are built from

use crate::dtype::{Element, RealElement};
use crate::error::{Error, Result};
use crate::tile::{TileView, Uplo};
use num_traits::Float;

/// Matrix norm kind
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Norm {
    /// Largest absolute value
    Max,
    /// Largest column sum of absolute values
    One,
    /// Largest row sum of absolute values
    Inf,
    /// Frobenius norm
    Fro,
}

// ============================================================================
// Reductions
// ============================================================================

/// Maximum where NaN dominates: any NaN operand yields NaN
#[inline]
pub fn max_nan<R: Float>(x: R, y: R) -> R {
    if y.is_nan() || x < y { y } else { x }
}

/// Fold `absx` into the scaled sum of squares `(scale, sumsq)`,
/// where the represented value is `scale² · sumsq`
#[inline]
pub fn add_sumsq<R: Float>(scale: &mut R, sumsq: &mut R, absx: R) {
    if absx.is_nan() || *scale < absx {
        let ratio = *scale / absx;
        *sumsq = R::one() + *sumsq * (ratio * ratio);
        *scale = absx;
    } else if *scale != R::zero() {
        let ratio = absx / *scale;
        *sumsq = *sumsq + ratio * ratio;
    }
}

/// Combine `(scale2, sumsq2)` into `(scale1, sumsq1)`, rebasing onto the
/// larger scale
#[inline]
pub fn combine_sumsq<R: Float>(scale1: &mut R, sumsq1: &mut R, scale2: R, sumsq2: R) {
    if *scale1 > scale2 {
        let ratio = scale2 / *scale1;
        *sumsq1 = *sumsq1 + sumsq2 * (ratio * ratio);
    } else if scale2 != R::zero() {
        let ratio = *scale1 / scale2;
        *sumsq1 = *sumsq1 * (ratio * ratio) + sumsq2;
        *scale1 = scale2;
    }
}

/// Tree reduction of `values` into `values[0]` with [`max_nan`]
pub fn max_nan_reduce<R: Float>(values: &mut [R]) {
    let mut len = values.len();
    while len > 1 {
        let half = len.div_ceil(2);
        for i in 0..len - half {
            values[i] = max_nan(values[i], values[i + half]);
        }
        len = half;
    }
}

fn abs_re<T: Element>(x: T) -> T::Real {
    x.re().abs()
}

fn check_values(norm: Norm, needed: usize, len: usize) -> Result<()> {
    if len < needed {
        return Err(Error::invalid_argument(
            "values",
            format!("{:?} norm writes {} values, output holds {}", norm, needed, len),
        ));
    }
    Ok(())
}

// ============================================================================
// Tile norms
// ============================================================================

/// Norm of one symmetric (Hermitian) tile whose `uplo` triangle is stored.
///
/// Only the stored triangle is read; the other one is inferred. Diagonal
/// entries contribute their real part.
///
/// - `Max`: `values[0]` = largest absolute value
/// - `One` / `Inf`: `values[j]` = sum of column `j` (equal to row `j`)
/// - `Fro`: `values[0..2]` = `(scale, sumsq)`
pub fn henorm_tile<T: Element>(
    norm: Norm,
    uplo: Uplo,
    tile: &TileView<'_, T>,
    values: &mut [T::Real],
) -> Result<()> {
    let n = tile.mb();
    if tile.nb() != n {
        return Err(Error::shape_mismatch("tile", (n, n), (tile.mb(), tile.nb())));
    }
    if uplo == Uplo::General {
        return Err(Error::invalid_argument("uplo", "symmetric tile needs Lower or Upper"));
    }
    let zero = <T::Real as Element>::ZERO;
    let stored = |i: usize, j: usize| tile.stored(i, j);
    // strictly stored entries of row `i`
    let off_diag = |i: usize| -> Box<dyn Iterator<Item = usize>> {
        match uplo {
            Uplo::Lower => Box::new(0..i),
            _ => Box::new(i + 1..n),
        }
    };

    match norm {
        Norm::Max => {
            check_values(norm, 1, values.len())?;
            let mut max = zero;
            for i in 0..n {
                for j in off_diag(i) {
                    max = max_nan(max, stored(i, j).magnitude());
                }
                max = max_nan(max, abs_re(stored(i, i)));
            }
            values[0] = max;
        }
        Norm::One | Norm::Inf => {
            check_values(norm, n, values.len())?;
            for k in 0..n {
                let mut sum = zero;
                for j in off_diag(k) {
                    sum += stored(k, j).magnitude();
                }
                sum += abs_re(stored(k, k));
                let mirrored: Box<dyn Iterator<Item = usize>> = match uplo {
                    Uplo::Lower => Box::new(k + 1..n),
                    _ => Box::new(0..k),
                };
                for i in mirrored {
                    sum += stored(i, k).magnitude();
                }
                values[k] = sum;
            }
        }
        Norm::Fro => {
            check_values(norm, 2, values.len())?;
            let one = <T::Real as Element>::ONE;
            let (mut scale, mut sumsq) = (zero, one);
            for i in 0..n {
                let (mut row_scale, mut row_sumsq) = (zero, one);
                for j in off_diag(i) {
                    add_sumsq(&mut row_scale, &mut row_sumsq, stored(i, j).magnitude());
                }
                row_sumsq = row_sumsq + row_sumsq;
                add_sumsq(&mut row_scale, &mut row_sumsq, abs_re(stored(i, i)));
                combine_sumsq(&mut scale, &mut sumsq, row_scale, row_sumsq);
            }
            values[0] = scale;
            values[1] = sumsq;
        }
    }
    Ok(())
}

/// Norm of one general tile.
///
/// - `Max`: `values[0]`
/// - `One`: `values[j]` = sum of column `j`, `j < nb`
/// - `Inf`: `values[i]` = sum of row `i`, `i < mb`
/// - `Fro`: `values[0..2]` = `(scale, sumsq)`
pub fn genorm_tile<T: Element>(
    norm: Norm,
    tile: &TileView<'_, T>,
    values: &mut [T::Real],
) -> Result<()> {
    let (mb, nb) = (tile.mb(), tile.nb());
    let zero = <T::Real as Element>::ZERO;
    match norm {
        Norm::Max => {
            check_values(norm, 1, values.len())?;
            let mut max = zero;
            for j in 0..nb {
                for i in 0..mb {
                    max = max_nan(max, tile.stored(i, j).magnitude());
                }
            }
            values[0] = max;
        }
        Norm::One => {
            check_values(norm, nb, values.len())?;
            for (j, value) in values.iter_mut().enumerate().take(nb) {
                let mut sum = zero;
                for i in 0..mb {
                    sum += tile.stored(i, j).magnitude();
                }
                *value = sum;
            }
        }
        Norm::Inf => {
            check_values(norm, mb, values.len())?;
            for value in values.iter_mut().take(mb) {
                *value = zero;
            }
            for j in 0..nb {
                for (i, value) in values.iter_mut().enumerate().take(mb) {
                    *value += tile.stored(i, j).magnitude();
                }
            }
        }
        Norm::Fro => {
            check_values(norm, 2, values.len())?;
            let (mut scale, mut sumsq) = (zero, <T::Real as Element>::ONE);
            for j in 0..nb {
                for i in 0..mb {
                    add_sumsq(&mut scale, &mut sumsq, tile.stored(i, j).magnitude());
                }
            }
            values[0] = scale;
            values[1] = sumsq;
        }
    }
    Ok(())
}

/// `scale · √sumsq`, the value a scaled sum of squares stands for
pub fn sumsq_to_norm<R: RealElement>(scale: R, sumsq: R) -> R {
    scale * sumsq.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::{Tile, TileLayout};

    #[test]
    fn test_max_nan_dominates() {
        assert!(max_nan(1.0f64, f64::NAN).is_nan());
        assert!(max_nan(f64::NAN, 1.0f64).is_nan());
        assert_eq!(max_nan(1.0f64, 2.0), 2.0);
        let mut v = vec![1.0f32, 5.0, 3.0, f32::NAN, 2.0];
        max_nan_reduce(&mut v);
        assert!(v[0].is_nan());
        let mut v = vec![1.0f32, 5.0, 3.0, 4.0, 2.0];
        max_nan_reduce(&mut v);
        assert_eq!(v[0], 5.0);
    }

    #[test]
    fn test_sumsq_survives_near_overflow() {
        let big = f64::MAX / 4.0;
        let (mut scale, mut sumsq) = (0.0f64, 1.0f64);
        for _ in 0..8 {
            add_sumsq(&mut scale, &mut sumsq, big);
        }
        assert_eq!(scale, big);
        assert!((sumsq - 8.0).abs() < 1e-12);

        let (mut s2, mut q2) = (0.0f64, 1.0f64);
        add_sumsq(&mut s2, &mut q2, big / 2.0);
        combine_sumsq(&mut scale, &mut sumsq, s2, q2);
        assert!((sumsq - 8.25).abs() < 1e-12);
    }

    #[test]
    fn test_add_sumsq_propagates_nan() {
        let (mut scale, mut sumsq) = (0.0f64, 1.0f64);
        add_sumsq(&mut scale, &mut sumsq, f64::NAN);
        add_sumsq(&mut scale, &mut sumsq, 3.0);
        assert!((scale * scale * sumsq).is_nan());
    }

    #[test]
    fn test_henorm_tile_lower() {
        // symmetric [[1, 2], [2, -3]], lower stored; upper holds garbage
        let tile = Tile::from_parts(vec![1.0f64, 2.0, f64::NAN, -3.0], 2, 2, 2, TileLayout::ColMajor)
            .unwrap();
        let mut v = [0.0f64; 2];
        henorm_tile(Norm::Max, Uplo::Lower, &tile.view(), &mut v).unwrap();
        assert_eq!(v[0], 3.0);
        henorm_tile(Norm::One, Uplo::Lower, &tile.view(), &mut v).unwrap();
        assert_eq!(v, [3.0, 5.0]);
        henorm_tile(Norm::Fro, Uplo::Lower, &tile.view(), &mut v).unwrap();
        assert!((v[0] * v[0] * v[1] - 18.0).abs() < 1e-12);
    }

    #[test]
    fn test_genorm_tile() {
        let tile = Tile::from_fn(2, 3, TileLayout::ColMajor, |r, c| (r as f64 + 1.0) * (c as f64 - 1.0));
        // [[-1, 0, 1], [-2, 0, 2]]
        let mut v = [0.0f64; 3];
        genorm_tile(Norm::One, &tile.view(), &mut v).unwrap();
        assert_eq!(v, [3.0, 0.0, 3.0]);
        genorm_tile(Norm::Inf, &tile.view(), &mut v).unwrap();
        assert_eq!(&v[..2], &[2.0, 4.0]);
        genorm_tile(Norm::Max, &tile.view(), &mut v).unwrap();
        assert_eq!(v[0], 2.0);
        genorm_tile(Norm::Fro, &tile.view(), &mut v).unwrap();
        assert!((sumsq_to_norm(v[0], v[1]) - 10.0f64.sqrt()).abs() < 1e-12);
    }
}
