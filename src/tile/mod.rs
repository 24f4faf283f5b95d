//! Tiles: the unit of storage, transfer, and scheduling
//!
//! A tile is a dense `mb x nb` block of scalars with a leading stride and a
//! storage layout. Matrices attach a transpose tag ([`Op`]) to the tiles they
//! hand out, so the same storage can be read as `A`, `Aᵀ`, or `Aᴴ`.
//!
//! ```text
//! Tile (owned storage)
//! ├── TileView / TileViewMut   (borrowed, op-aware element access)
//! └── TilePtr / TilePtrMut     (borrowed raw data for batched calls)
//! ```

mod layout;

pub use layout::{TileLayout, check_extent, convert_layout};

use crate::dtype::Element;
use crate::error::{Error, Result};
use std::fmt;

/// Tile grid coordinate `(row, col)`
pub type TileIndex = (usize, usize);

// ============================================================================
// Operator and triangle tags
// ============================================================================

/// Transpose tag of a matrix or tile
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Op {
    /// Use the stored data as is
    #[default]
    NoTrans,
    /// Transpose
    Trans,
    /// Conjugate transpose
    ConjTrans,
}

impl Op {
    /// True for `Trans` and `ConjTrans`
    #[inline]
    pub fn is_trans(self) -> bool {
        !matches!(self, Self::NoTrans)
    }

    /// Apply `outer` on top of `self`.
    ///
    /// Returns `None` when the result would be a conjugate without transpose,
    /// which has no tag of its own. For real element types `Trans` and
    /// `ConjTrans` are the same operator, pass `is_real = true` to fold them.
    pub fn compose(self, outer: Op, is_real: bool) -> Option<Op> {
        use Op::*;
        match (self, outer) {
            (op, NoTrans) | (NoTrans, op) => Some(op),
            (Trans, Trans) | (ConjTrans, ConjTrans) => Some(NoTrans),
            (Trans, ConjTrans) | (ConjTrans, Trans) => is_real.then_some(NoTrans),
        }
    }

    /// Short BLAS-style character
    pub fn as_char(self) -> char {
        match self {
            Self::NoTrans => 'n',
            Self::Trans => 't',
            Self::ConjTrans => 'c',
        }
    }
}

/// Which triangle of a symmetric matrix or tile holds data
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Uplo {
    /// Lower triangle, including the diagonal
    #[default]
    Lower,
    /// Upper triangle, including the diagonal
    Upper,
    /// Whole tile
    General,
}

impl Uplo {
    /// Triangle seen after transposing
    #[inline]
    pub fn flip(self) -> Self {
        match self {
            Self::Lower => Self::Upper,
            Self::Upper => Self::Lower,
            Self::General => Self::General,
        }
    }

    /// Whether stored element `(r, c)` lies in this triangle
    #[inline]
    pub fn contains(self, r: usize, c: usize) -> bool {
        match self {
            Self::Lower => r >= c,
            Self::Upper => r <= c,
            Self::General => true,
        }
    }
}

// ============================================================================
// Memory spaces
// ============================================================================

/// Where a tile instance lives
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemorySpace {
    /// Host memory
    Host,
    /// Memory of accelerator device `n`
    Device(usize),
}

impl MemorySpace {
    /// Dense index: host is 0, device `d` is `d + 1`
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Self::Host => 0,
            Self::Device(d) => d + 1,
        }
    }

    /// Inverse of [`MemorySpace::index`]
    #[inline]
    pub fn from_index(index: usize) -> Self {
        match index {
            0 => Self::Host,
            i => Self::Device(i - 1),
        }
    }
}

impl fmt::Display for MemorySpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Device(d) => write!(f, "device:{}", d),
        }
    }
}

// ============================================================================
// Owned tile
// ============================================================================

/// Owned tile storage
#[derive(Clone, Debug, PartialEq)]
pub struct Tile<T> {
    data: Vec<T>,
    mb: usize,
    nb: usize,
    stride: usize,
    layout: TileLayout,
}

impl<T: Element> Tile<T> {
    /// Packed zero tile
    pub fn zeros(mb: usize, nb: usize, layout: TileLayout) -> Self {
        let stride = layout.min_stride(mb, nb);
        Self {
            data: vec![T::ZERO; layout.required_len(mb, nb, stride)],
            mb,
            nb,
            stride,
            layout,
        }
    }

    /// Packed tile filled from `f(row, col)`
    pub fn from_fn(
        mb: usize,
        nb: usize,
        layout: TileLayout,
        mut f: impl FnMut(usize, usize) -> T,
    ) -> Self {
        let mut tile = Self::zeros(mb, nb, layout);
        for c in 0..nb {
            for r in 0..mb {
                tile.set(r, c, f(r, c));
            }
        }
        tile
    }

    /// Wrap existing storage, validating stride and length
    pub fn from_parts(
        data: Vec<T>,
        mb: usize,
        nb: usize,
        stride: usize,
        layout: TileLayout,
    ) -> Result<Self> {
        check_extent(layout, mb, nb, stride, data.len())?;
        Ok(Self {
            data,
            mb,
            nb,
            stride,
            layout,
        })
    }

    /// Rows
    #[inline]
    pub fn mb(&self) -> usize {
        self.mb
    }

    /// Columns
    #[inline]
    pub fn nb(&self) -> usize {
        self.nb
    }

    /// Leading stride
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Storage layout
    #[inline]
    pub fn layout(&self) -> TileLayout {
        self.layout
    }

    /// Raw storage
    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Element `(r, c)`
    #[inline]
    pub fn get(&self, r: usize, c: usize) -> T {
        self.data[self.layout.offset(r, c, self.stride)]
    }

    /// Overwrite element `(r, c)`
    #[inline]
    pub fn set(&mut self, r: usize, c: usize, value: T) {
        let off = self.layout.offset(r, c, self.stride);
        self.data[off] = value;
    }

    /// Convert to `layout`, packing the storage. No-op if already there.
    pub fn convert_to(&mut self, layout: TileLayout) {
        if self.layout != layout {
            self.stride = convert_layout(&mut self.data, self.mb, self.nb, self.stride, self.layout);
            self.layout = layout;
        }
    }

    /// Borrow as an untransposed view
    pub fn view(&self) -> TileView<'_, T> {
        TileView {
            data: &self.data,
            mb: self.mb,
            nb: self.nb,
            stride: self.stride,
            layout: self.layout,
            op: Op::NoTrans,
        }
    }

    /// Borrow mutably as an untransposed view
    pub fn view_mut(&mut self) -> TileViewMut<'_, T> {
        TileViewMut {
            data: &mut self.data,
            mb: self.mb,
            nb: self.nb,
            stride: self.stride,
            layout: self.layout,
            op: Op::NoTrans,
        }
    }

    pub(crate) fn into_data(self) -> Vec<T> {
        self.data
    }
}

// ============================================================================
// Borrowed views
// ============================================================================

#[inline(always)]
fn logical_to_stored(op: Op, i: usize, j: usize) -> (usize, usize) {
    if op.is_trans() { (j, i) } else { (i, j) }
}

/// Read-only tile view with a transpose tag
///
/// `mb`/`nb` describe the stored tile; [`rows`](Self::rows) and
/// [`cols`](Self::cols) describe the tile after `op` is applied.
#[derive(Copy, Clone, Debug)]
pub struct TileView<'a, T> {
    data: &'a [T],
    mb: usize,
    nb: usize,
    stride: usize,
    layout: TileLayout,
    op: Op,
}

impl<'a, T: Element> TileView<'a, T> {
    /// View `data` as a stored `mb x nb` tile
    pub fn new(
        data: &'a [T],
        mb: usize,
        nb: usize,
        stride: usize,
        layout: TileLayout,
    ) -> Result<Self> {
        check_extent(layout, mb, nb, stride, data.len())?;
        Ok(Self {
            data,
            mb,
            nb,
            stride,
            layout,
            op: Op::NoTrans,
        })
    }

    /// View whose extent the caller already validated
    pub(crate) fn from_raw_parts(
        data: &'a [T],
        mb: usize,
        nb: usize,
        stride: usize,
        layout: TileLayout,
    ) -> Self {
        debug_assert!(check_extent(layout, mb, nb, stride, data.len()).is_ok());
        Self {
            data,
            mb,
            nb,
            stride,
            layout,
            op: Op::NoTrans,
        }
    }

    /// Same storage with transpose tag `op`
    #[inline]
    pub fn with_op(mut self, op: Op) -> Self {
        self.op = op;
        self
    }

    /// Logical rows
    #[inline]
    pub fn rows(&self) -> usize {
        if self.op.is_trans() { self.nb } else { self.mb }
    }

    /// Logical columns
    #[inline]
    pub fn cols(&self) -> usize {
        if self.op.is_trans() { self.mb } else { self.nb }
    }

    /// Stored rows
    #[inline]
    pub fn mb(&self) -> usize {
        self.mb
    }

    /// Stored columns
    #[inline]
    pub fn nb(&self) -> usize {
        self.nb
    }

    /// Leading stride
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Storage layout
    #[inline]
    pub fn layout(&self) -> TileLayout {
        self.layout
    }

    /// Transpose tag
    #[inline]
    pub fn op(&self) -> Op {
        self.op
    }

    /// Stored element `(r, c)`, ignoring the transpose tag
    #[inline]
    pub fn stored(&self, r: usize, c: usize) -> T {
        self.data[self.layout.offset(r, c, self.stride)]
    }

    /// Logical element `(i, j)` of `op(tile)`
    #[inline]
    pub fn at(&self, i: usize, j: usize) -> T {
        let (r, c) = logical_to_stored(self.op, i, j);
        let v = self.stored(r, c);
        if self.op == Op::ConjTrans { v.conj() } else { v }
    }

    /// Raw data for batched calls
    #[inline]
    pub fn ptr(&self) -> TilePtr<'a, T> {
        TilePtr { data: self.data }
    }

    /// Copy into a packed owned tile of the stored shape
    pub fn to_tile(&self) -> Tile<T> {
        Tile::from_fn(self.mb, self.nb, self.layout, |r, c| self.stored(r, c))
    }
}

/// Mutable tile view with a transpose tag
#[derive(Debug)]
pub struct TileViewMut<'a, T> {
    data: &'a mut [T],
    mb: usize,
    nb: usize,
    stride: usize,
    layout: TileLayout,
    op: Op,
}

impl<'a, T: Element> TileViewMut<'a, T> {
    /// View `data` mutably as a stored `mb x nb` tile
    pub fn new(
        data: &'a mut [T],
        mb: usize,
        nb: usize,
        stride: usize,
        layout: TileLayout,
    ) -> Result<Self> {
        check_extent(layout, mb, nb, stride, data.len())?;
        Ok(Self {
            data,
            mb,
            nb,
            stride,
            layout,
            op: Op::NoTrans,
        })
    }

    /// Mutable view whose extent the caller already validated
    pub(crate) fn from_raw_parts(
        data: &'a mut [T],
        mb: usize,
        nb: usize,
        stride: usize,
        layout: TileLayout,
    ) -> Self {
        debug_assert!(check_extent(layout, mb, nb, stride, data.len()).is_ok());
        Self {
            data,
            mb,
            nb,
            stride,
            layout,
            op: Op::NoTrans,
        }
    }

    /// Same storage with transpose tag `op`
    #[inline]
    pub fn with_op(mut self, op: Op) -> Self {
        self.op = op;
        self
    }

    /// Logical rows
    #[inline]
    pub fn rows(&self) -> usize {
        if self.op.is_trans() { self.nb } else { self.mb }
    }

    /// Logical columns
    #[inline]
    pub fn cols(&self) -> usize {
        if self.op.is_trans() { self.mb } else { self.nb }
    }

    /// Stored rows
    #[inline]
    pub fn mb(&self) -> usize {
        self.mb
    }

    /// Stored columns
    #[inline]
    pub fn nb(&self) -> usize {
        self.nb
    }

    /// Leading stride
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Storage layout
    #[inline]
    pub fn layout(&self) -> TileLayout {
        self.layout
    }

    /// Transpose tag
    #[inline]
    pub fn op(&self) -> Op {
        self.op
    }

    /// Logical element `(i, j)`
    #[inline]
    pub fn at(&self, i: usize, j: usize) -> T {
        self.as_view().at(i, j)
    }

    /// Overwrite logical element `(i, j)`
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: T) {
        let (r, c) = logical_to_stored(self.op, i, j);
        let v = if self.op == Op::ConjTrans {
            value.conj()
        } else {
            value
        };
        let off = self.layout.offset(r, c, self.stride);
        self.data[off] = v;
    }

    /// Reborrow read-only
    #[inline]
    pub fn as_view(&self) -> TileView<'_, T> {
        TileView {
            data: &*self.data,
            mb: self.mb,
            nb: self.nb,
            stride: self.stride,
            layout: self.layout,
            op: self.op,
        }
    }

    /// Reborrow mutably
    #[inline]
    pub fn reborrow(&mut self) -> TileViewMut<'_, T> {
        TileViewMut {
            data: &mut *self.data,
            mb: self.mb,
            nb: self.nb,
            stride: self.stride,
            layout: self.layout,
            op: self.op,
        }
    }

    /// Raw data for batched calls, consuming the view
    #[inline]
    pub fn into_ptr(self) -> TilePtrMut<'a, T> {
        TilePtrMut { data: self.data }
    }
}

// ============================================================================
// Raw batch views
// ============================================================================

/// Non-owning tile data handed to batched and device calls
///
/// Carries only the data; shape, stride, and layout travel in the batch
/// descriptor so that one set applies to the whole group.
#[derive(Copy, Clone, Debug)]
pub struct TilePtr<'a, T> {
    data: &'a [T],
}

impl<'a, T> TilePtr<'a, T> {
    /// Wrap raw tile data
    #[inline]
    pub fn new(data: &'a [T]) -> Self {
        Self { data }
    }

    /// Number of addressable scalars
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the pointer addresses no scalars
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Scalar at `offset`, or `None` when it is out of bounds
    #[inline]
    pub fn get(&self, offset: usize) -> Option<&'a T> {
        self.data.get(offset)
    }

    /// Underlying slice
    #[inline]
    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }
}

impl<'a, T> From<&'a [T]> for TilePtr<'a, T> {
    fn from(data: &'a [T]) -> Self {
        Self::new(data)
    }
}

/// Mutable counterpart of [`TilePtr`]
#[derive(Debug)]
pub struct TilePtrMut<'a, T> {
    data: &'a mut [T],
}

impl<'a, T> TilePtrMut<'a, T> {
    /// Wrap raw tile data
    #[inline]
    pub fn new(data: &'a mut [T]) -> Self {
        Self { data }
    }

    /// Number of addressable scalars
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the pointer addresses no scalars
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read-only reborrow
    #[inline]
    pub fn as_ptr(&self) -> TilePtr<'_, T> {
        TilePtr { data: &*self.data }
    }

    /// Underlying mutable slice
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut *self.data
    }
}

impl<'a, T> From<&'a mut [T]> for TilePtrMut<'a, T> {
    fn from(data: &'a mut [T]) -> Self {
        Self::new(data)
    }
}

/// Check that a tile view has logical shape `expected`
pub(crate) fn check_tile_shape(
    arg: &'static str,
    rows: usize,
    cols: usize,
    expected: (usize, usize),
) -> Result<()> {
    if (rows, cols) != expected {
        return Err(Error::shape_mismatch(arg, expected, (rows, cols)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::Complex128;

    #[test]
    fn test_op_compose() {
        assert_eq!(Op::Trans.compose(Op::Trans, false), Some(Op::NoTrans));
        assert_eq!(Op::NoTrans.compose(Op::ConjTrans, false), Some(Op::ConjTrans));
        assert_eq!(Op::Trans.compose(Op::ConjTrans, false), None);
        assert_eq!(Op::Trans.compose(Op::ConjTrans, true), Some(Op::NoTrans));
    }

    #[test]
    fn test_uplo_flip_and_contains() {
        assert_eq!(Uplo::Lower.flip(), Uplo::Upper);
        assert!(Uplo::Lower.contains(2, 1));
        assert!(!Uplo::Upper.contains(2, 1));
        assert!(Uplo::General.contains(0, 5));
    }

    #[test]
    fn test_memory_space_index() {
        assert_eq!(MemorySpace::Host.index(), 0);
        assert_eq!(MemorySpace::Device(2).index(), 3);
        assert_eq!(MemorySpace::from_index(3), MemorySpace::Device(2));
        assert_eq!(MemorySpace::Device(1).to_string(), "device:1");
    }

    #[test]
    fn test_view_op_access() {
        let tile = Tile::from_fn(2, 3, TileLayout::ColMajor, |r, c| (10 * r + c) as f64);
        let v = tile.view();
        assert_eq!((v.rows(), v.cols()), (2, 3));
        assert_eq!(v.at(1, 2), 12.0);

        let t = v.with_op(Op::Trans);
        assert_eq!((t.rows(), t.cols()), (3, 2));
        assert_eq!(t.at(2, 1), 12.0);
    }

    #[test]
    fn test_conj_trans_view_mut() {
        let mut tile = Tile::<Complex128>::zeros(2, 2, TileLayout::RowMajor);
        {
            let mut v = tile.view_mut().with_op(Op::ConjTrans);
            v.set(0, 1, Complex128::new(1.0, 2.0));
            assert_eq!(v.at(0, 1), Complex128::new(1.0, 2.0));
        }
        assert_eq!(tile.get(1, 0), Complex128::new(1.0, -2.0));
    }

    #[test]
    fn test_tile_convert_keeps_elements() {
        let mut tile = Tile::from_fn(3, 2, TileLayout::ColMajor, |r, c| (r + 3 * c) as f32);
        let before = tile.clone();
        tile.convert_to(TileLayout::RowMajor);
        assert_eq!(tile.layout(), TileLayout::RowMajor);
        assert_eq!(tile.stride(), 2);
        for c in 0..2 {
            for r in 0..3 {
                assert_eq!(tile.get(r, c), before.get(r, c));
            }
        }
    }

    #[test]
    fn test_view_rejects_short_buffer() {
        let data = vec![0.0f64; 5];
        assert!(TileView::new(&data, 3, 2, 3, TileLayout::ColMajor).is_err());
        assert!(TileView::new(&data, 3, 2, 2, TileLayout::ColMajor).is_err());
    }
}
