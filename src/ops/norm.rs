use crate::config::Options;
use crate::device;
use crate::dtype::{Element, RealElement};
use crate::error::Result;
use crate::internal::Target;
use crate::kernels::{Norm, combine_sumsq, genorm_tile, henorm_tile, max_nan, sumsq_to_norm};
use crate::matrix::SymmetricMatrix;
use crate::registry::TileRead;
use crate::tile::{MemorySpace, TileIndex, TileLayout, TilePtr};
use std::collections::BTreeMap;

/// Norms of the pieces of a symmetric matrix, merged as tiles are visited
struct Accumulator<R> {
    max: R,
    columns: Vec<R>,
    scale: R,
    sumsq: R,
}

impl<R: RealElement> Accumulator<R> {
    fn new(n: usize) -> Self {
        Self {
            max: R::ZERO,
            columns: vec![R::ZERO; n],
            scale: R::ZERO,
            sumsq: R::ONE,
        }
    }

    fn add_sums(&mut self, offset: usize, sums: &[R]) {
        for (col, &s) in self.columns[offset..].iter_mut().zip(sums) {
            *col = *col + s;
        }
    }

    fn add_sumsq(&mut self, scale: R, sumsq: R) {
        combine_sumsq(&mut self.scale, &mut self.sumsq, scale, sumsq);
    }

    fn finish(self, norm: Norm) -> R {
        match norm {
            Norm::Max => self.max,
            Norm::One | Norm::Inf => self.columns.into_iter().fold(R::ZERO, max_nan),
            Norm::Fro => sumsq_to_norm(self.scale, self.sumsq),
        }
    }
}

/// Norm of a symmetric (Hermitian) matrix from its stored triangle.
///
/// Covers the tiles held by this process; combining the partial results of
/// several processes is left to the caller. Diagonal tiles go through the
/// device reduction under [`Target::Devices`] and the host tile kernel
/// otherwise. A stored off-diagonal tile also stands for its mirror image.
/// Diagonal entries contribute their real part.
pub fn norm<T: Element>(norm: Norm, a: &SymmetricMatrix<T>, opts: &Options) -> Result<T::Real> {
    let nt = a.nt();
    let mut offsets = Vec::with_capacity(nt + 1);
    offsets.push(0);
    for j in 0..nt {
        offsets.push(offsets[j] + a.tile_nb(j));
    }
    let mut acc = Accumulator::<T::Real>::new(a.n());

    // work in storage block coordinates, which is where the data lies
    let stored_block = |i: usize, j: usize| if a.op().is_trans() { (j, i) } else { (i, j) };
    let mut diagonal = Vec::new();
    for j in 0..nt {
        for i in 0..a.mt() {
            if !a.tile_in_triangle(i, j) || !a.tile_is_local(i, j) {
                continue;
            }
            if i == j {
                diagonal.push(j);
            } else {
                let tile = a.tile_get_for_reading(i, j, MemorySpace::Host, opts.layout)?;
                off_diagonal(norm, &tile, stored_block(i, j), &offsets, &mut acc)?;
            }
        }
    }

    if opts.target == Target::Devices && a.num_devices() > 0 {
        diagonal_on_devices(norm, a, &diagonal, &offsets, opts, &mut acc)?;
    } else {
        let uplo = a.uplo_physical();
        for &j in &diagonal {
            let tile = a.tile_get_for_reading(j, j, MemorySpace::Host, opts.layout)?;
            let n = a.tile_nb(j);
            let mut values = vec![<T::Real as Element>::ZERO; n.max(2)];
            henorm_tile(norm, uplo, &tile.view(), &mut values)?;
            merge_diagonal(norm, &values, offsets[j], n, &mut acc);
        }
    }

    log::debug!(
        "norm {:?}: {} diagonal tiles on {}",
        norm,
        diagonal.len(),
        opts.target
    );
    Ok(acc.finish(norm))
}

fn off_diagonal<T: Element>(
    norm: Norm,
    tile: &TileRead<'_, T>,
    (si, sj): TileIndex,
    offsets: &[usize],
    acc: &mut Accumulator<T::Real>,
) -> Result<()> {
    let view = tile.view();
    let zero = <T::Real as Element>::ZERO;
    match norm {
        Norm::Max => {
            let mut value = [zero];
            genorm_tile(norm, &view, &mut value)?;
            acc.max = max_nan(acc.max, value[0]);
        }
        Norm::One | Norm::Inf => {
            // the stored tile adds its column sums to block sj and, as its
            // mirror, its row sums to block si
            let mut cols = vec![zero; view.nb()];
            genorm_tile(Norm::One, &view, &mut cols)?;
            acc.add_sums(offsets[sj], &cols);
            let mut rows = vec![zero; view.mb()];
            genorm_tile(Norm::Inf, &view, &mut rows)?;
            acc.add_sums(offsets[si], &rows);
        }
        Norm::Fro => {
            let mut value = [zero; 2];
            genorm_tile(norm, &view, &mut value)?;
            let two = <T::Real as Element>::ONE + <T::Real as Element>::ONE;
            acc.add_sumsq(value[0], two * value[1]);
        }
    }
    Ok(())
}

fn merge_diagonal<R: RealElement>(
    norm: Norm,
    values: &[R],
    offset: usize,
    n: usize,
    acc: &mut Accumulator<R>,
) {
    match norm {
        Norm::Max => acc.max = max_nan(acc.max, values[0]),
        Norm::One | Norm::Inf => acc.add_sums(offset, &values[..n]),
        Norm::Fro => acc.add_sumsq(values[0], values[1]),
    }
}

/// Diagonal tiles in one batched reduction per device and tile order
fn diagonal_on_devices<T: Element>(
    norm: Norm,
    a: &SymmetricMatrix<T>,
    diagonal: &[usize],
    offsets: &[usize],
    opts: &Options,
    acc: &mut Accumulator<T::Real>,
) -> Result<()> {
    let mut groups: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();
    for &j in diagonal {
        groups
            .entry((a.tile_device(j, j), a.tile_nb(j)))
            .or_default()
            .push(j);
    }

    for ((device, n), blocks) in groups {
        let space = MemorySpace::Device(device);
        let tiles = blocks
            .iter()
            .map(|&j| {
                a.tile_get_for_reading(j, j, space, TileLayout::ColMajor)
                    .map(TileRead::releasing)
            })
            .collect::<Result<Vec<_>>>()?;
        let lda = tiles.iter().map(|t| t.stride()).max().unwrap_or(n);
        let ptrs: Vec<TilePtr<'_, T>> = tiles.iter().map(|t| t.ptr()).collect();
        let ldv = match norm {
            Norm::Max => 1,
            Norm::One | Norm::Inf => n,
            Norm::Fro => 2,
        };
        let mut values = vec![<T::Real as Element>::ZERO; ldv * blocks.len()];

        {
            let client = a.engine().device(device)?;
            let mut queue = client.queue(opts.queue_index);
            device::henorm(
                norm,
                a.uplo_physical(),
                n,
                &ptrs,
                lda,
                &mut values,
                ldv,
                blocks.len(),
                &mut queue,
            )?;
            queue.sync();
        }

        for (k, &j) in blocks.iter().enumerate() {
            merge_diagonal(norm, &values[k * ldv..(k + 1) * ldv], offsets[j], n, acc);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::dtype::Complex128;
    use crate::matrix::Distribution;
    use crate::runtime::Engine;
    use crate::tile::Uplo;

    fn symmetric(i: usize, j: usize) -> f64 {
        let (r, c) = if i >= j { (i, j) } else { (j, i) };
        (r * 7 + c * 3) as f64 - 10.0
    }

    fn dense_norms(n: usize) -> (f64, f64, f64) {
        let mut max = 0.0f64;
        let mut one = 0.0f64;
        let mut fro = 0.0f64;
        for j in 0..n {
            let mut col = 0.0;
            for i in 0..n {
                let v = symmetric(i, j).abs();
                max = max.max(v);
                col += v;
                fro += v * v;
            }
            one = one.max(col);
        }
        (max, one, fro.sqrt())
    }

    #[test]
    fn test_host_and_device_norms_match_dense() {
        let engine = Engine::new(EngineConfig::new().with_host_threads(2).with_num_devices(2))
            .expect("engine");
        let n = 7;
        let (max, one, fro) = dense_norms(n);
        for uplo in [Uplo::Lower, Uplo::Upper] {
            let dist = Distribution::new(n, n, 3, 3).expect("dist");
            let a = SymmetricMatrix::from_fn(&engine, uplo, dist, symmetric).expect("a");
            for target in [Target::HostTask, Target::Devices] {
                let opts = Options::new(target);
                assert_eq!(norm(Norm::Max, &a, &opts).expect("max"), max);
                assert!((norm(Norm::One, &a, &opts).expect("one") - one).abs() < 1e-12);
                assert!((norm(Norm::Inf, &a, &opts).expect("inf") - one).abs() < 1e-12);
                assert!((norm(Norm::Fro, &a, &opts).expect("fro") - fro).abs() < 1e-10);
            }
            let t = a.transpose().expect("transpose");
            assert_eq!(norm(Norm::Max, &t, &Options::default()).expect("max"), max);
        }
    }

    #[test]
    fn test_hermitian_diagonal_uses_real_part() {
        let engine = Engine::host_only().expect("engine");
        let dist = Distribution::new(2, 2, 2, 2).expect("dist");
        let a = SymmetricMatrix::from_fn(&engine, Uplo::Lower, dist, |i, j| {
            if i == j {
                Complex128::new(1.0, 5.0)
            } else {
                Complex128::new(0.0, 0.0)
            }
        })
        .expect("a");
        assert_eq!(norm(Norm::Max, &a, &Options::default()).expect("max"), 1.0);
    }

    #[test]
    fn test_empty_matrix() {
        let engine = Engine::host_only().expect("engine");
        let dist = Distribution::new(0, 0, 2, 2).expect("dist");
        let a = SymmetricMatrix::<f64>::zeros(&engine, Uplo::Lower, dist).expect("a");
        assert_eq!(norm(Norm::Fro, &a, &Options::default()).expect("fro"), 0.0);
    }
}
