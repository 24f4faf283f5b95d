//! Batched norm of symmetric (Hermitian) tiles
//!
//! One work-group per tile; a work-group has `min(block_size, n)` workers
//! and worker `t` owns rows `t, t + workers, ...`. Tiles are column-major,
//! element `(i, j)` at `tile[i + j * lda]`, and only the declared triangle
//! plus the real part of the diagonal is read.

use super::DeviceFault;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::kernels::{Norm, add_sumsq, combine_sumsq, max_nan, max_nan_reduce};
use crate::runtime::DeviceQueue;
use crate::tile::{TilePtr, Uplo};
use num_traits::Float;
use rayon::prelude::*;

/// Compute a partial norm of each of `batch_count` `n × n` tiles.
///
/// - `Max`: `ldv == 1`, `values[k]` = largest absolute value of tile `k`
/// - `One` / `Inf`: `ldv >= n`, `values[k * ldv + j]` = sum of column `j`
/// - `Fro`: `ldv == 2`, `values[2k]` = scale and `values[2k + 1]` = sumsq, with
///   `scale² · sumsq` the squared Frobenius norm of tile `k`
///
/// Issues a single launch, or a single memset of the outputs when `n == 0`.
/// Nothing is enqueued when `batch_count == 0`.
#[allow(clippy::too_many_arguments)]
pub fn henorm<'a, T: Element>(
    norm: Norm,
    uplo: Uplo,
    n: usize,
    tiles: &[TilePtr<'a, T>],
    lda: usize,
    values: &'a mut [T::Real],
    ldv: usize,
    batch_count: usize,
    queue: &mut DeviceQueue<'a>,
) -> Result<()> {
    if batch_count == 0 {
        return Ok(());
    }
    if uplo == Uplo::General {
        return Err(Error::invalid_argument("uplo", "henorm needs Lower or Upper"));
    }

    if n == 0 {
        let count = match norm {
            Norm::Max => batch_count,
            Norm::One | Norm::Inf => 0,
            Norm::Fro => 2 * batch_count,
        };
        check_len("values", count, values.len())?;
        queue.memset(&mut values[..count]);
        return Ok(());
    }

    let ldv_ok = match norm {
        Norm::Max => ldv == 1,
        Norm::One | Norm::Inf => ldv >= n,
        Norm::Fro => ldv == 2,
    };
    if !ldv_ok {
        return Err(Error::invalid_argument(
            "ldv",
            format!("{:?} norm of {}x{} tiles cannot use ldv = {}", norm, n, n, ldv),
        ));
    }
    if lda < n {
        return Err(Error::invalid_argument(
            "lda",
            format!("lda = {} is smaller than n = {}", lda, n),
        ));
    }
    check_len("tiles", batch_count, tiles.len())?;
    check_len("values", batch_count * ldv, values.len())?;

    let tiles = tiles[..batch_count].to_vec();
    let out = &mut values[..batch_count * ldv];
    let workers = queue.block_size().min(n);
    let kernel = match norm {
        Norm::Max => "henorm_max_kernel",
        Norm::One | Norm::Inf => "henorm_one_kernel",
        Norm::Fro => "henorm_fro_kernel",
    };
    log::trace!(
        "device {}: {} n={} batch={} workers={}",
        queue.device_id(),
        kernel,
        n,
        batch_count,
        workers
    );

    queue.launch(kernel, move || {
        let group = WorkGroup {
            kernel,
            uplo,
            n,
            lda,
            workers,
        };
        out.par_chunks_mut(ldv)
            .zip(tiles.par_iter())
            .try_for_each(|(out, tile)| match norm {
                Norm::Max => group.max(tile, out),
                Norm::One | Norm::Inf => group.one(tile, out),
                Norm::Fro => group.fro(tile, out),
            })
    });
    Ok(())
}

fn check_len(arg: &'static str, needed: usize, len: usize) -> Result<()> {
    if len < needed {
        return Err(Error::invalid_argument(
            arg,
            format!("needs at least {} entries, got {}", needed, len),
        ));
    }
    Ok(())
}

/// Outcome of one work-group
type Launch<T = ()> = std::result::Result<T, DeviceFault>;

/// Per-tile reduction shared by all work-groups of one launch
struct WorkGroup {
    kernel: &'static str,
    uplo: Uplo,
    n: usize,
    lda: usize,
    workers: usize,
}

impl WorkGroup {
    #[inline]
    fn load<T: Element>(&self, tile: &TilePtr<'_, T>, i: usize, j: usize) -> Launch<T> {
        let offset = i + j * self.lda;
        tile.get(offset).copied().ok_or_else(|| {
            DeviceFault::new(
                self.kernel,
                format!("read at offset {} outside a tile of {} elements", offset, tile.len()),
            )
        })
    }

    /// Columns of row `i` in the strictly stored triangle
    fn stored_cols(&self, i: usize) -> std::ops::Range<usize> {
        match self.uplo {
            Uplo::Lower => 0..i,
            _ => i + 1..self.n,
        }
    }

    fn max<T: Element>(&self, tile: &TilePtr<'_, T>, out: &mut [T::Real]) -> Launch {
        let zero = <T::Real as Element>::ZERO;
        let mut row_max = vec![zero; self.workers];
        for i in 0..self.n {
            let chunk = i % self.workers;
            let mut max = zero;
            match self.uplo {
                Uplo::Lower => {
                    for j in self.stored_cols(i) {
                        max = max_nan(max, self.load(tile, i, j)?.magnitude());
                    }
                }
                _ => {
                    for j in self.stored_cols(i).rev() {
                        max = max_nan(max, self.load(tile, i, j)?.magnitude());
                    }
                }
            }
            max = max_nan(max, self.load(tile, i, i)?.re().abs());
            row_max[chunk] = max_nan(max, row_max[chunk]);
        }
        max_nan_reduce(&mut row_max);
        out[0] = row_max[0];
        Ok(())
    }

    fn one<T: Element>(&self, tile: &TilePtr<'_, T>, out: &mut [T::Real]) -> Launch {
        let n = self.n;
        for k in 0..n {
            let mut sum = <T::Real as Element>::ZERO;
            let mirrored = match self.uplo {
                Uplo::Lower => k + 1..n,
                _ => 0..k,
            };
            for j in self.stored_cols(k) {
                sum += self.load(tile, k, j)?.magnitude();
            }
            sum += self.load(tile, k, k)?.re().abs();
            for i in mirrored {
                sum += self.load(tile, i, k)?.magnitude();
            }
            out[k] = sum;
        }
        Ok(())
    }

    fn fro<T: Element>(&self, tile: &TilePtr<'_, T>, out: &mut [T::Real]) -> Launch {
        let zero = <T::Real as Element>::ZERO;
        let one = <T::Real as Element>::ONE;
        let mut chunk_scale = vec![zero; self.workers];
        let mut chunk_sumsq = vec![one; self.workers];
        for i in 0..self.n {
            let chunk = i % self.workers;
            let (mut scale, mut sumsq) = (zero, one);
            for j in self.stored_cols(i) {
                add_sumsq(&mut scale, &mut sumsq, self.load(tile, i, j)?.magnitude());
            }
            // off-diagonal entries appear twice
            sumsq = sumsq + sumsq;
            add_sumsq(&mut scale, &mut sumsq, self.load(tile, i, i)?.re().abs());
            combine_sumsq(&mut chunk_scale[chunk], &mut chunk_sumsq[chunk], scale, sumsq);
        }
        let (mut scale, mut sumsq) = (chunk_scale[0], chunk_sumsq[0]);
        for chunk in 1..self.workers {
            combine_sumsq(&mut scale, &mut sumsq, chunk_scale[chunk], chunk_sumsq[chunk]);
        }
        out[0] = scale;
        out[1] = sumsq;
        Ok(())
    }
}
