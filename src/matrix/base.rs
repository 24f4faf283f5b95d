//! Tile bookkeeping shared by every matrix kind

use super::grid::{Distribution, Origin};
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::registry::{Access, RegistryStats, TileRead, TileRegistry, TileWrite};
use crate::runtime::Engine;
use crate::tile::{MemorySpace, Op, Tile, TileIndex, TileLayout};
use std::ops::Range;
use std::sync::Arc;

#[derive(Debug)]
struct Storage<T: Element> {
    dist: Distribution,
    registry: Arc<TileRegistry<T>>,
}

/// A view of distributed tile storage: a tile range plus a transpose tag.
///
/// Views are cheap to clone and share storage. Tile coordinates taken by
/// the methods here are logical (after `op`); [`storage_index`] maps them to
/// the coordinates tiles are stored under.
///
/// [`storage_index`]: BaseMatrix::storage_index
#[derive(Debug)]
pub struct BaseMatrix<T: Element> {
    storage: Arc<Storage<T>>,
    row0: usize,
    col0: usize,
    mt: usize,
    nt: usize,
    op: Op,
}

impl<T: Element> Clone for BaseMatrix<T> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            row0: self.row0,
            col0: self.col0,
            mt: self.mt,
            nt: self.nt,
            op: self.op,
        }
    }
}

impl<T: Element> BaseMatrix<T> {
    /// Create storage for `dist` and insert the local tiles for which
    /// `include` holds, filled from `f(row, col)` in global coordinates
    pub(crate) fn create(
        engine: &Engine,
        dist: Distribution,
        include: impl Fn(TileIndex) -> bool,
        mut f: impl FnMut(usize, usize) -> T,
    ) -> Result<Self> {
        if dist.origin() == Origin::Devices && engine.num_devices() == 0 {
            return Err(Error::unsupported(
                "Origin::Devices",
                "the engine has no accelerator devices",
            ));
        }
        let base = Self {
            storage: Arc::new(Storage {
                dist,
                registry: TileRegistry::shared(engine.clone()),
            }),
            row0: 0,
            col0: 0,
            mt: dist.mt(),
            nt: dist.nt(),
            op: Op::NoTrans,
        };
        let grid = dist.grid();
        for sj in 0..dist.nt() {
            for si in 0..dist.mt() {
                let index = (si, sj);
                if !grid.is_local(index) || !include(index) {
                    continue;
                }
                let (r0, c0) = (si * dist.mb(), sj * dist.nb());
                let tile = Tile::from_fn(
                    dist.row_block(si),
                    dist.col_block(sj),
                    TileLayout::ColMajor,
                    |r, c| f(r0 + r, c0 + c),
                );
                let space = match dist.origin() {
                    Origin::Host => MemorySpace::Host,
                    Origin::Devices => MemorySpace::Device(base.device_of(index)),
                };
                base.registry().insert_origin(index, space, tile)?;
            }
        }
        log::debug!(
            "matrix {}x{} in {}x{} tiles ({}x{} grid), {} local",
            dist.m(),
            dist.n(),
            dist.mb(),
            dist.nb(),
            dist.mt(),
            dist.nt(),
            base.registry().stats().allocations
        );
        Ok(base)
    }

    pub(crate) fn registry(&self) -> &TileRegistry<T> {
        &self.storage.registry
    }

    /// Distribution of the underlying storage
    pub fn distribution(&self) -> &Distribution {
        &self.storage.dist
    }

    /// Engine the tiles live in
    pub fn engine(&self) -> &Engine {
        self.registry().engine()
    }

    /// Work counters of the tile registry
    pub fn stats(&self) -> RegistryStats {
        self.registry().stats()
    }

    /// Transpose tag
    pub fn op(&self) -> Op {
        self.op
    }

    /// Tile rows
    pub fn mt(&self) -> usize {
        if self.op.is_trans() { self.nt } else { self.mt }
    }

    /// Tile columns
    pub fn nt(&self) -> usize {
        if self.op.is_trans() { self.mt } else { self.nt }
    }

    /// Storage coordinate of logical tile `(i, j)`
    pub fn storage_index(&self, i: usize, j: usize) -> TileIndex {
        let (r, c) = if self.op.is_trans() { (j, i) } else { (i, j) };
        (self.row0 + r, self.col0 + c)
    }

    /// Rows of logical tile row `i`
    pub fn tile_mb(&self, i: usize) -> usize {
        let dist = self.distribution();
        if self.op.is_trans() {
            dist.col_block(self.col0 + i)
        } else {
            dist.row_block(self.row0 + i)
        }
    }

    /// Columns of logical tile column `j`
    pub fn tile_nb(&self, j: usize) -> usize {
        let dist = self.distribution();
        if self.op.is_trans() {
            dist.row_block(self.row0 + j)
        } else {
            dist.col_block(self.col0 + j)
        }
    }

    /// Rows
    pub fn m(&self) -> usize {
        (0..self.mt()).map(|i| self.tile_mb(i)).sum()
    }

    /// Columns
    pub fn n(&self) -> usize {
        (0..self.nt()).map(|j| self.tile_nb(j)).sum()
    }

    /// Whether this process owns tile `(i, j)`
    pub fn tile_is_local(&self, i: usize, j: usize) -> bool {
        self.distribution().grid().is_local(self.storage_index(i, j))
    }

    /// Number of devices of the engine
    pub fn num_devices(&self) -> usize {
        self.engine().num_devices()
    }

    fn device_of(&self, index: TileIndex) -> usize {
        match self.num_devices() {
            0 => 0,
            nd => (index.0 / self.distribution().grid().p()) % nd,
        }
    }

    /// Device tile `(i, j)` is assigned to; `0` on an engine without devices
    pub fn tile_device(&self, i: usize, j: usize) -> usize {
        self.device_of(self.storage_index(i, j))
    }

    /// Borrow tile `(i, j)` for reading in `space`; the view carries `op`
    pub fn tile_get_for_reading(
        &self,
        i: usize,
        j: usize,
        space: MemorySpace,
        layout: TileLayout,
    ) -> Result<TileRead<'_, T>> {
        let guard = self
            .registry()
            .acquire_read(self.storage_index(i, j), space, layout)?;
        Ok(guard.with_op(self.op))
    }

    /// Borrow tile `(i, j)` for writing in `space`; the view carries `op`
    pub fn tile_get_for_writing(
        &self,
        i: usize,
        j: usize,
        space: MemorySpace,
        layout: TileLayout,
        access: Access,
    ) -> Result<TileWrite<'_, T>> {
        let guard = self
            .registry()
            .acquire_write(self.storage_index(i, j), space, layout, access)?;
        Ok(guard.with_op(self.op))
    }

    /// Release the copy of tile `(i, j)` held in `space`
    pub fn tile_release(&self, i: usize, j: usize, space: MemorySpace) -> Result<()> {
        self.registry().release(self.storage_index(i, j), space)
    }

    /// Decrement the life of tile `(i, j)`
    pub fn tile_tick(&self, i: usize, j: usize) -> Result<()> {
        self.registry().tick(self.storage_index(i, j))
    }

    /// Set the life of tile `(i, j)`: the number of consumers, local or
    /// remote, still to read its current content
    pub fn tile_set_life(&self, i: usize, j: usize, life: usize) -> Result<()> {
        self.registry().set_life(self.storage_index(i, j), life)
    }

    /// Life of tile `(i, j)`, `None` when the tile is absent
    pub fn tile_life(&self, i: usize, j: usize) -> Option<usize> {
        self.registry().life(self.storage_index(i, j))
    }

    /// Memory spaces holding a valid copy of tile `(i, j)`
    pub fn tile_valid_spaces(&self, i: usize, j: usize) -> Vec<MemorySpace> {
        self.registry().valid_spaces(self.storage_index(i, j))
    }

    /// Whether tile `(i, j)` is present on this process, owned or received
    pub fn tile_exists(&self, i: usize, j: usize) -> bool {
        self.registry().contains(self.storage_index(i, j))
    }

    /// Insert a copy of tile `(i, j)` received from its owner, to be read by
    /// `life` local consumers. `tile` is in storage orientation.
    pub fn insert_remote_tile(&self, i: usize, j: usize, tile: Tile<T>, life: usize) -> Result<()> {
        let index = self.storage_index(i, j);
        if self.distribution().grid().is_local(index) {
            return Err(Error::invalid_argument(
                "tile",
                format!("tile ({}, {}) is owned by this process", index.0, index.1),
            ));
        }
        let dist = self.distribution();
        let expected = (dist.row_block(index.0), dist.col_block(index.1));
        if (tile.mb(), tile.nb()) != expected {
            return Err(Error::shape_mismatch("tile", expected, (tile.mb(), tile.nb())));
        }
        self.registry().insert_shadow(index, tile, life)
    }

    /// Same storage seen through `outer` on top of the current tag
    pub(crate) fn with_outer_op(&self, outer: Op) -> Result<Self> {
        let op = self.op.compose(outer, !T::IS_COMPLEX).ok_or_else(|| {
            Error::invalid_argument(
                "op",
                format!("cannot apply op {} to a matrix tagged {}", outer.as_char(), self.op.as_char()),
            )
        })?;
        let mut view = self.clone();
        view.op = op;
        Ok(view)
    }

    /// View of logical tile rows `rows` and tile columns `cols`
    pub(crate) fn sub_view(&self, rows: Range<usize>, cols: Range<usize>) -> Result<Self> {
        if rows.start > rows.end || rows.end > self.mt() {
            return Err(Error::invalid_argument(
                "rows",
                format!("tile rows {:?} outside 0..{}", rows, self.mt()),
            ));
        }
        if cols.start > cols.end || cols.end > self.nt() {
            return Err(Error::invalid_argument(
                "cols",
                format!("tile columns {:?} outside 0..{}", cols, self.nt()),
            ));
        }
        let (srows, scols) = if self.op.is_trans() { (cols, rows) } else { (rows, cols) };
        let mut view = self.clone();
        view.row0 += srows.start;
        view.col0 += scols.start;
        view.mt = srows.len();
        view.nt = scols.len();
        Ok(view)
    }

    /// Logical offsets of the first row of each tile row, and of the first
    /// column of each tile column
    pub(crate) fn tile_offsets(&self) -> (Vec<usize>, Vec<usize>) {
        let prefix = |count: usize, size: &dyn Fn(usize) -> usize| {
            let mut offsets = Vec::with_capacity(count);
            let mut at = 0;
            for k in 0..count {
                offsets.push(at);
                at += size(k);
            }
            offsets
        };
        (
            prefix(self.mt(), &|i| self.tile_mb(i)),
            prefix(self.nt(), &|j| self.tile_nb(j)),
        )
    }

    /// Visit every element of the present tiles `(i, j)` for which
    /// `keep(i, j)` holds, passing its logical `(row, col, value)` to `put`
    pub(crate) fn gather(
        &self,
        mut put: impl FnMut(usize, usize, T),
        keep: impl Fn(usize, usize) -> bool,
    ) -> Result<()> {
        let (row_off, col_off) = self.tile_offsets();
        for j in 0..self.nt() {
            for i in 0..self.mt() {
                if !keep(i, j) || !self.tile_exists(i, j) {
                    continue;
                }
                let guard = self.tile_get_for_reading(i, j, MemorySpace::Host, TileLayout::ColMajor)?;
                let view = guard.view();
                for c in 0..view.cols() {
                    for r in 0..view.rows() {
                        put(row_off[i] + r, col_off[j] + c, view.at(r, c));
                    }
                }
            }
        }
        Ok(())
    }
}
