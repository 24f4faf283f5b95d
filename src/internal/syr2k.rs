//! Rank-2k update of a symmetric matrix by one block column

use super::Target;
use crate::batch::{
    GemmParams, OpPlan, Syr2kEntry, Syr2kParams, assemble_gemm_pair, assemble_syr2k,
};
use crate::device;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::kernels;
use crate::matrix::{Matrix, SymmetricMatrix};
use crate::registry::{Access, TileRead, TileWrite};
use crate::runtime::{Schedule, TaskGraph};
use crate::tile::{MemorySpace, Op, TileIndex, TileLayout, TileView, Uplo};
use std::collections::BTreeMap;

/// `C = alpha * A * Bᵀ + alpha * B * Aᵀ + beta * C` where `A` and `B` are a
/// single block column and `C` is logically lower.
///
/// Only the local tiles of `C` are updated, using the realization selected by
/// `target`. Argument checks run before any work is spawned; after that, the
/// first error raised by any unit is returned once every unit has finished.
///
/// Each consumer of a tile of `A` or `B` ticks it once, so a received tile
/// with life `L` is evicted once its `L` consumers are done.
#[allow(clippy::too_many_arguments)]
pub fn syr2k<T: Element>(
    target: Target,
    alpha: T,
    a: &Matrix<T>,
    b: &Matrix<T>,
    beta: T,
    c: &SymmetricMatrix<T>,
    priority: i32,
    queue_index: usize,
    layout: TileLayout,
) -> Result<()> {
    check_args(a, b, c)?;
    log::debug!(
        "internal::syr2k target={} mt={} k={} op(A)={} op(C)={}",
        target,
        c.mt(),
        a.tile_nb(0),
        a.op().as_char(),
        c.op().as_char()
    );

    let call = Call {
        alpha,
        beta,
        a,
        b,
        c,
        priority,
        queue_index,
        layout,
    };
    match target {
        Target::HostTask => call.host_tasks(Schedule::TaskPerUnit),
        Target::HostNest => call.host_tasks(Schedule::FlattenedCells),
        Target::HostBatch => call.host_batch(),
        Target::Devices => call.devices(),
    }
}

fn check_args<T: Element>(a: &Matrix<T>, b: &Matrix<T>, c: &SymmetricMatrix<T>) -> Result<()> {
    if c.uplo() != Uplo::Lower {
        return Err(Error::invalid_argument(
            "c",
            "must be logically lower, pass its transpose instead",
        ));
    }
    if a.op() != b.op() {
        return Err(Error::invalid_argument(
            "b",
            format!("op {} differs from op(A) = {}", b.op().as_char(), a.op().as_char()),
        ));
    }
    if T::IS_COMPLEX && (a.op() == Op::ConjTrans || c.op() == Op::ConjTrans) {
        return Err(Error::invalid_argument(
            "op",
            "conjugate transpose is not a symmetric update of a complex matrix",
        ));
    }
    if a.nt() != 1 || b.nt() != 1 {
        return Err(Error::invalid_argument(
            "a",
            format!("expected a single block column, got {} and {}", a.nt(), b.nt()),
        ));
    }
    if a.mt() != c.mt() {
        return Err(Error::shape_mismatch("a", (c.mt(), 1), (a.mt(), a.nt())));
    }
    if b.mt() != c.mt() {
        return Err(Error::shape_mismatch("b", (c.mt(), 1), (b.mt(), b.nt())));
    }
    for i in 0..c.mt() {
        if a.tile_mb(i) != c.tile_mb(i) || b.tile_mb(i) != c.tile_mb(i) {
            return Err(Error::invalid_argument(
                "a",
                format!(
                    "block row {} has {} and {} rows, C has {}",
                    i,
                    a.tile_mb(i),
                    b.tile_mb(i),
                    c.tile_mb(i)
                ),
            ));
        }
    }
    if a.tile_nb(0) != b.tile_nb(0) {
        return Err(Error::shape_mismatch(
            "b",
            (b.m(), a.tile_nb(0)),
            (b.m(), b.tile_nb(0)),
        ));
    }
    OpPlan::normalize(a.op(), c.op(), !T::IS_COMPLEX)?;
    Ok(())
}

/// `view` with one more transpose applied
fn transposed<T: Element>(view: TileView<'_, T>) -> Result<TileView<'_, T>> {
    let op = view
        .op()
        .compose(Op::Trans, !T::IS_COMPLEX)
        .ok_or_else(|| Error::Internal(format!("cannot transpose a tile tagged {}", view.op().as_char())))?;
    Ok(view.with_op(op))
}

fn row_tile<'g, 'r, T: Element>(
    tiles: &'g BTreeMap<usize, TileRead<'r, T>>,
    row: usize,
) -> Result<&'g TileRead<'r, T>> {
    tiles
        .get(&row)
        .ok_or_else(|| Error::Internal(format!("block row {} was not acquired", row)))
}

/// Tiles read and written by one off-diagonal product pair
struct CellTiles<'r, T: Element> {
    ai: TileRead<'r, T>,
    aj: TileRead<'r, T>,
    bi: TileRead<'r, T>,
    bj: TileRead<'r, T>,
    c: TileWrite<'r, T>,
}

#[derive(Clone, Copy)]
struct Call<'m, T: Element> {
    alpha: T,
    beta: T,
    a: &'m Matrix<T>,
    b: &'m Matrix<T>,
    c: &'m SymmetricMatrix<T>,
    priority: i32,
    queue_index: usize,
    layout: TileLayout,
}

impl<'m, T: Element> Call<'m, T> {
    /// Local tiles of the lower triangle of `C` accepted by `keep`:
    /// diagonal block indices and off-diagonal cells
    fn local_lower(&self, keep: impl Fn(usize, usize) -> bool) -> (Vec<usize>, Vec<TileIndex>) {
        let mut diag = Vec::new();
        let mut off = Vec::new();
        for j in 0..self.c.nt() {
            for i in j..self.c.mt() {
                if !self.c.tile_is_local(i, j) || !keep(i, j) {
                    continue;
                }
                if i == j {
                    diag.push(j);
                } else {
                    off.push((i, j));
                }
            }
        }
        (diag, off)
    }

    fn acquire_cell(&self, i: usize, j: usize, space: MemorySpace) -> Result<CellTiles<'m, T>> {
        let ai = self.a.tile_get_for_reading(i, 0, space, self.layout)?.consumers(1);
        let aj = self.a.tile_get_for_reading(j, 0, space, self.layout)?.consumers(1);
        let bi = self.b.tile_get_for_reading(i, 0, space, self.layout)?.consumers(1);
        let bj = self.b.tile_get_for_reading(j, 0, space, self.layout)?.consumers(1);
        let c = self
            .c
            .tile_get_for_writing(i, j, space, self.layout, Access::ReadWrite)?;
        Ok(CellTiles { ai, aj, bi, bj, c })
    }

    /// `C(j, j) = alpha A(j) B(j)ᵀ + alpha B(j) A(j)ᵀ + beta C(j, j)` on the host
    fn diagonal(&self, j: usize) -> Result<()> {
        let space = MemorySpace::Host;
        let aj = self.a.tile_get_for_reading(j, 0, space, self.layout)?.consumers(1);
        let bj = self.b.tile_get_for_reading(j, 0, space, self.layout)?.consumers(1);
        let mut cjj = self
            .c
            .tile_get_for_writing(j, j, space, self.layout, Access::ReadWrite)?;
        kernels::syr2k(
            Uplo::Lower,
            self.alpha,
            &aj.view(),
            &bj.view(),
            self.beta,
            &mut cjj.view_mut(),
        )
    }

    /// `C(i, j) = alpha A(i) B(j)ᵀ + alpha B(i) A(j)ᵀ + beta C(i, j)` on the host
    fn off_diagonal(&self, i: usize, j: usize) -> Result<()> {
        let mut tiles = self.acquire_cell(i, j, MemorySpace::Host)?;
        let bj_t = transposed(tiles.bj.view())?;
        let aj_t = transposed(tiles.aj.view())?;
        kernels::gemm(self.alpha, &tiles.ai.view(), &bj_t, self.beta, &mut tiles.c.view_mut())?;
        kernels::gemm(self.alpha, &tiles.bi.view(), &aj_t, T::ONE, &mut tiles.c.view_mut())
    }

    /// One host task per diagonal tile, spawned ahead of the off-diagonal
    /// tiles, which run under `schedule`
    fn host_tasks(self, schedule: Schedule) -> Result<()> {
        let (diag, off) = self.local_lower(|_, _| true);
        let mut graph = TaskGraph::new();
        for j in diag {
            graph.spawn(self.priority.saturating_add(1), move || self.diagonal(j));
        }
        graph.spawn_cells(self.priority, schedule, off, move |i, j| self.off_diagonal(i, j));
        graph.wait(self.c.engine().host())
    }

    #[cfg(feature = "host-batch")]
    fn host_batch(self) -> Result<()> {
        if !self.c.engine().host_batch_available() {
            return Err(Error::unsupported(
                Target::HostBatch.name(),
                "the host batched back-end is disabled in the engine configuration",
            ));
        }
        let plan = OpPlan::normalize(self.a.op(), self.c.op(), !T::IS_COMPLEX)?;
        let (diag, off) = self.local_lower(|_, _| true);
        let mut graph = TaskGraph::new();
        for j in diag {
            graph.spawn(self.priority.saturating_add(1), move || self.diagonal(j));
        }
        if !off.is_empty() {
            graph.spawn(self.priority, move || self.off_diagonal_batch(plan, &off));
        }
        graph.wait(self.c.engine().host())
    }

    #[cfg(not(feature = "host-batch"))]
    fn host_batch(self) -> Result<()> {
        Err(Error::unsupported(
            Target::HostBatch.name(),
            "built without the `host-batch` feature",
        ))
    }

    /// Every off-diagonal product pair in two batched host calls per shape
    #[cfg(feature = "host-batch")]
    fn off_diagonal_batch(&self, plan: OpPlan, cells: &[TileIndex]) -> Result<()> {
        use crate::kernels::batched;

        let mut tiles = Vec::with_capacity(cells.len());
        for &(i, j) in cells {
            tiles.push(self.acquire_cell(i, j, MemorySpace::Host)?);
        }

        let k = self.a.tile_nb(0);
        let mut entries = Vec::with_capacity(cells.len());
        for (&(i, j), t) in cells.iter().zip(tiles.iter_mut()) {
            let ldc = t.c.stride();
            entries.push((
                plan.gemm_entry(
                    self.c.tile_mb(i),
                    self.c.tile_nb(j),
                    k,
                    t.ai.ptr(),
                    t.ai.stride(),
                    t.bj.ptr(),
                    t.bj.stride(),
                    t.c.ptr_mut(),
                    ldc,
                ),
                plan.operands(t.bi.ptr(), t.bi.stride(), t.aj.ptr(), t.aj.stride()),
            ));
        }

        let first = self.gemm_params(plan, self.beta);
        let second = self.gemm_params(plan, T::ONE);
        let host = self.c.engine().host();
        for (mut batch, next) in assemble_gemm_pair(first, second, entries) {
            log::trace!(
                "host gemm_batch {}x{}x{} count={}",
                batch.m,
                batch.n,
                batch.k,
                batch.len()
            );
            batched::check_info(&batched::gemm_batch(&mut batch, host), "gemm_batch")?;
            batch.replace_operands(next)?;
            batched::check_info(&batched::gemm_batch(&mut batch, host), "gemm_batch")?;
        }
        Ok(())
    }

    fn gemm_params(&self, plan: OpPlan, beta: T) -> GemmParams<T> {
        GemmParams {
            layout: self.layout,
            op_a: plan.op_a,
            op_b: plan.op_b,
            alpha: self.alpha,
            beta,
        }
    }

    /// Stored-triangle syr2k parameters for the diagonal tiles of `C`
    fn syr2k_params(&self) -> Syr2kParams<T> {
        Syr2kParams {
            layout: self.layout,
            uplo: self.c.uplo_physical(),
            op: self.a.op(),
            alpha: self.alpha,
            beta: self.beta,
        }
    }

    fn devices(self) -> Result<()> {
        let engine = self.c.engine();
        if engine.num_devices() == 0 {
            return Err(Error::unsupported(
                Target::Devices.name(),
                "the engine has no accelerator devices",
            ));
        }
        if self.c.nt() == 1 {
            return self.single_tile_device();
        }

        let plan = OpPlan::normalize(self.a.op(), self.c.op(), !T::IS_COMPLEX)?;
        let mut graph = TaskGraph::new();
        for device in 0..engine.num_devices() {
            let (diag, off) = self.local_lower(|i, j| self.c.tile_device(i, j) == device);
            if diag.is_empty() && off.is_empty() {
                continue;
            }
            graph.spawn(self.priority, move || self.device_unit(device, plan, &diag, &off));
        }
        graph.wait(engine.host())
    }

    /// C is one tile: a single syr2k on its device
    fn single_tile_device(&self) -> Result<()> {
        if !self.c.tile_is_local(0, 0) {
            return Ok(());
        }
        let device = self.c.tile_device(0, 0);
        let space = MemorySpace::Device(device);
        let a0 = self
            .a
            .tile_get_for_reading(0, 0, space, self.layout)?
            .releasing()
            .consumers(1);
        let b0 = self
            .b
            .tile_get_for_reading(0, 0, space, self.layout)?
            .releasing()
            .consumers(1);
        let mut c00 = self
            .c
            .tile_get_for_writing(0, 0, space, self.layout, Access::ReadWrite)?;
        let ldc = c00.stride();
        let entry = Syr2kEntry {
            n: self.c.tile_nb(0),
            k: self.a.tile_nb(0),
            a: a0.ptr(),
            lda: a0.stride(),
            b: b0.ptr(),
            ldb: b0.stride(),
            c: c00.ptr_mut(),
            ldc,
        };

        let client = self.c.engine().device(device)?;
        let mut queue = client.queue(self.queue_index);
        device::syr2k(self.syr2k_params(), entry, &mut queue);
        queue.sync();
        Ok(())
    }

    /// Every local lower tile of `C` assigned to `device`, in batched launches
    /// on one of its queues
    fn device_unit(
        &self,
        device: usize,
        plan: OpPlan,
        diag: &[usize],
        off: &[TileIndex],
    ) -> Result<()> {
        let space = MemorySpace::Device(device);

        let mut uses: BTreeMap<usize, usize> = BTreeMap::new();
        for &j in diag {
            *uses.entry(j).or_default() += 1;
        }
        for &(i, j) in off {
            *uses.entry(i).or_default() += 1;
            *uses.entry(j).or_default() += 1;
        }

        let mut a_tiles = BTreeMap::new();
        let mut b_tiles = BTreeMap::new();
        for (&row, &n) in &uses {
            let ar = self.a.tile_get_for_reading(row, 0, space, self.layout)?;
            a_tiles.insert(row, ar.releasing().consumers(n));
            let br = self.b.tile_get_for_reading(row, 0, space, self.layout)?;
            b_tiles.insert(row, br.releasing().consumers(n));
        }
        let mut c_off = off
            .iter()
            .map(|&(i, j)| {
                self.c
                    .tile_get_for_writing(i, j, space, self.layout, Access::ReadWrite)
            })
            .collect::<Result<Vec<_>>>()?;
        let mut c_diag = diag
            .iter()
            .map(|&j| {
                self.c
                    .tile_get_for_writing(j, j, space, self.layout, Access::ReadWrite)
            })
            .collect::<Result<Vec<_>>>()?;

        let k = self.a.tile_nb(0);
        let mut pairs = Vec::with_capacity(off.len());
        for (&(i, j), c) in off.iter().zip(c_off.iter_mut()) {
            let (ai, aj) = (row_tile(&a_tiles, i)?, row_tile(&a_tiles, j)?);
            let (bi, bj) = (row_tile(&b_tiles, i)?, row_tile(&b_tiles, j)?);
            let ldc = c.stride();
            pairs.push((
                plan.gemm_entry(
                    self.c.tile_mb(i),
                    self.c.tile_nb(j),
                    k,
                    ai.ptr(),
                    ai.stride(),
                    bj.ptr(),
                    bj.stride(),
                    c.ptr_mut(),
                    ldc,
                ),
                plan.operands(bi.ptr(), bi.stride(), aj.ptr(), aj.stride()),
            ));
        }
        let mut diag_entries = Vec::with_capacity(diag.len());
        for (&j, c) in diag.iter().zip(c_diag.iter_mut()) {
            let (aj, bj) = (row_tile(&a_tiles, j)?, row_tile(&b_tiles, j)?);
            let ldc = c.stride();
            diag_entries.push(Syr2kEntry {
                n: self.c.tile_nb(j),
                k,
                a: aj.ptr(),
                lda: aj.stride(),
                b: bj.ptr(),
                ldb: bj.stride(),
                c: c.ptr_mut(),
                ldc,
            });
        }

        let gemm_groups = assemble_gemm_pair(
            self.gemm_params(plan, self.beta),
            self.gemm_params(plan, T::ONE),
            pairs,
        );
        let syr2k_groups = assemble_syr2k(self.syr2k_params(), diag_entries);
        log::debug!(
            "device {}: {} off-diagonal tiles in {} gemm groups, {} diagonal tiles in {} syr2k groups",
            device,
            off.len(),
            gemm_groups.len(),
            diag.len(),
            syr2k_groups.len()
        );

        let client = self.c.engine().device(device)?;
        let mut queue = client.queue(self.queue_index);
        for (batch, next) in gemm_groups {
            device::gemm_batch_pair(batch, next, &mut queue);
        }
        for batch in syr2k_groups {
            device::syr2k_batch(batch, &mut queue);
        }
        queue.sync();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::matrix::{Distribution, ProcessGrid};
    use crate::runtime::Engine;
    use crate::tile::Tile;

    fn engine() -> Engine {
        Engine::new(EngineConfig::new().with_host_threads(2).with_num_devices(2))
            .expect("engine")
    }

    fn inputs(engine: &Engine, n: usize, k: usize, nb: usize) -> (Matrix<f64>, Matrix<f64>) {
        let dist = Distribution::new(n, k, nb, k).expect("dist");
        let a = Matrix::from_fn(engine, dist, |i, j| (i + 2 * j) as f64 * 0.25 + 1.0)
            .expect("a");
        let b = Matrix::from_fn(engine, dist, |i, j| 1.0 - (2 * i + j) as f64 * 0.125).expect("b");
        (a, b)
    }

    fn expected(a: &[f64], b: &[f64], c: &[f64], n: usize, k: usize, alpha: f64, beta: f64) -> Vec<f64> {
        let mut out = c.to_vec();
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

    #[test]
    fn test_targets_agree() {
        let engine = engine();
        let (n, k, nb) = (7, 3, 3);
        let (a, b) = inputs(&engine, n, k, nb);
        let c_init = |i: usize, j: usize| ((i * 3 + j * 5) % 7) as f64;
        let dense_c: Vec<f64> = (0..n * n)
            .map(|idx| {
                let (i, j) = (idx % n, idx / n);
                if i >= j { c_init(i, j) } else { c_init(j, i) }
            })
            .collect();
        let want = expected(
            &a.to_dense().expect("a"),
            &b.to_dense().expect("b"),
            &dense_c,
            n,
            k,
            0.5,
            2.0,
        );

        for target in Target::ALL {
            let dist = Distribution::new(n, n, nb, nb).expect("dist");
            let c = SymmetricMatrix::from_fn(&engine, Uplo::Lower, dist, c_init).expect("c");
            syr2k(target, 0.5, &a, &b, 2.0, &c, 0, 0, TileLayout::ColMajor).expect("syr2k");
            let got = c.to_dense().expect("c");
            for (g, w) in got.iter().zip(&want) {
                assert!((g - w).abs() < 1e-12, "{}: {} vs {}", target, g, w);
            }
        }
    }

    #[test]
    fn test_rejects_logically_upper_c() {
        let engine = engine();
        let (a, b) = inputs(&engine, 4, 2, 2);
        let dist = Distribution::new(4, 4, 2, 2).expect("dist");
        let c = SymmetricMatrix::<f64>::zeros(&engine, Uplo::Upper, dist).expect("c");
        let err = syr2k(Target::HostTask, 1.0, &a, &b, 0.0, &c, 0, 0, TileLayout::ColMajor)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { arg: "c", .. }));
    }

    #[test]
    fn test_rejects_multiple_block_columns() {
        let engine = engine();
        let dist = Distribution::new(4, 4, 2, 2).expect("dist");
        let a = Matrix::<f64>::zeros(&engine, dist).expect("a");
        let c = SymmetricMatrix::<f64>::zeros(&engine, Uplo::Lower, dist).expect("c");
        let err = syr2k(Target::HostNest, 1.0, &a, &a, 0.0, &c, 0, 0, TileLayout::ColMajor)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { arg: "a", .. }));
    }

    #[test]
    fn test_remote_c_tiles_untouched() {
        let engine = engine();
        let grid = ProcessGrid::new(2, 1, 1).expect("grid");
        let (n, k, nb) = (4, 2, 2);
        let dist = Distribution::new(n, k, nb, k).expect("dist").with_grid(grid);
        let a = Matrix::from_fn(&engine, dist, |_, _| 1.0).expect("a");
        let b = Matrix::from_fn(&engine, dist, |_, _| 1.0).expect("b");
        // block row 0 of A and B lives on rank 0, C(1, 0) reads a received copy
        for m in [&a, &b] {
            let tile = Tile::from_fn(nb, k, TileLayout::ColMajor, |_, _| 1.0);
            m.insert_remote_tile(0, 0, tile, 1).expect("remote");
        }
        let cdist = Distribution::new(n, n, nb, nb).expect("dist").with_grid(grid);
        let c = SymmetricMatrix::<f64>::zeros(&engine, Uplo::Lower, cdist).expect("c");
        assert!(c.tile_is_local(1, 0) && !c.tile_is_local(0, 0));
        syr2k(Target::HostTask, 1.0, &a, &b, 0.0, &c, 0, 0, TileLayout::ColMajor).expect("syr2k");
        let t = c
            .tile_get_for_reading(1, 0, MemorySpace::Host, TileLayout::ColMajor)
            .expect("tile");
        assert_eq!(t.view().at(0, 0), 4.0);
        assert!(!c.tile_exists(0, 0));
        assert_eq!(a.tile_life(0, 0), Some(0));
        assert!(a.tile_valid_spaces(0, 0).is_empty());
    }
}
