//! Process grid and block-cyclic tile distribution

use crate::error::{Error, Result};
use crate::tile::TileIndex;

/// `p × q` grid of processes; tile `(i, j)` belongs to process
/// `(i mod p) + (j mod q) · p`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ProcessGrid {
    p: usize,
    q: usize,
    rank: usize,
}

impl ProcessGrid {
    /// Grid of `p × q` processes, seen from process `rank`
    pub fn new(p: usize, q: usize, rank: usize) -> Result<Self> {
        if p == 0 || q == 0 {
            return Err(Error::invalid_argument("grid", "process grid needs p, q >= 1"));
        }
        if rank >= p * q {
            return Err(Error::invalid_argument(
                "rank",
                format!("rank {} outside a {}x{} grid", rank, p, q),
            ));
        }
        Ok(Self { p, q, rank })
    }

    /// Single-process grid
    pub fn single() -> Self {
        Self { p: 1, q: 1, rank: 0 }
    }

    /// Process rows
    pub fn p(&self) -> usize {
        self.p
    }

    /// Process columns
    pub fn q(&self) -> usize {
        self.q
    }

    /// Rank of this process
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Owner of storage tile `index`
    pub fn owner(&self, index: TileIndex) -> usize {
        (index.0 % self.p) + (index.1 % self.q) * self.p
    }

    /// Whether this process owns storage tile `index`
    pub fn is_local(&self, index: TileIndex) -> bool {
        self.owner(index) == self.rank
    }
}

impl Default for ProcessGrid {
    fn default() -> Self {
        Self::single()
    }
}

/// Memory space origin (authoritative) tiles are kept in
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Origin {
    /// Host memory
    #[default]
    Host,
    /// Memory of the device each tile is assigned to
    Devices,
}

/// Shape and distribution of a matrix: `m × n` scalars in `mb × nb` tiles,
/// the last tile row and column possibly smaller
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Distribution {
    m: usize,
    n: usize,
    mb: usize,
    nb: usize,
    grid: ProcessGrid,
    origin: Origin,
}

impl Distribution {
    /// `m × n` matrix in `mb × nb` tiles on a single process
    pub fn new(m: usize, n: usize, mb: usize, nb: usize) -> Result<Self> {
        if mb == 0 || nb == 0 {
            return Err(Error::invalid_argument("tile size", "mb and nb must be >= 1"));
        }
        Ok(Self {
            m,
            n,
            mb,
            nb,
            grid: ProcessGrid::single(),
            origin: Origin::Host,
        })
    }

    /// Distribute over `grid`
    pub fn with_grid(mut self, grid: ProcessGrid) -> Self {
        self.grid = grid;
        self
    }

    /// Keep origin tiles in `origin`
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    /// Rows
    pub fn m(&self) -> usize {
        self.m
    }

    /// Columns
    pub fn n(&self) -> usize {
        self.n
    }

    /// Nominal tile rows
    pub fn mb(&self) -> usize {
        self.mb
    }

    /// Nominal tile columns
    pub fn nb(&self) -> usize {
        self.nb
    }

    /// Process grid
    pub fn grid(&self) -> ProcessGrid {
        self.grid
    }

    /// Origin memory
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Tile rows
    pub fn mt(&self) -> usize {
        self.m.div_ceil(self.mb)
    }

    /// Tile columns
    pub fn nt(&self) -> usize {
        self.n.div_ceil(self.nb)
    }

    /// Rows of tile row `i`
    pub fn row_block(&self, i: usize) -> usize {
        self.mb.min(self.m - i * self.mb)
    }

    /// Columns of tile column `j`
    pub fn col_block(&self, j: usize) -> usize {
        self.nb.min(self.n - j * self.nb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_is_block_cyclic() {
        let grid = ProcessGrid::new(2, 3, 4).unwrap();
        assert_eq!(grid.owner((0, 0)), 0);
        assert_eq!(grid.owner((1, 0)), 1);
        assert_eq!(grid.owner((0, 2)), 4);
        assert_eq!(grid.owner((2, 5)), 4);
        assert!(grid.is_local((4, 2)));
        assert!(ProcessGrid::new(2, 2, 4).is_err());
    }

    #[test]
    fn test_ragged_last_tile() {
        let dist = Distribution::new(10, 7, 4, 3).unwrap();
        assert_eq!((dist.mt(), dist.nt()), (3, 3));
        assert_eq!(dist.row_block(2), 2);
        assert_eq!(dist.col_block(2), 1);
        assert_eq!(dist.col_block(0), 3);
    }
}
