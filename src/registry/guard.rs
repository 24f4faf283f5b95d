//! Scope-bound tile borrows
//!
//! A guard is the only way to reach tile data. Dropping it returns the hold to
//! the registry on every exit path, applies a pending release, and (for read
//! guards) decrements the tile's life by the number of consumers it served.

use super::TileRegistry;
use super::node::{Shape, TileBuffer, TileNode};
use crate::dtype::Element;
use crate::tile::{MemorySpace, Op, TileIndex, TileLayout, TilePtr, TilePtrMut, TileView, TileViewMut};
use std::fmt;
use std::sync::Arc;

/// Shared read access to one tile instance
pub struct TileRead<'r, T: Element> {
    pub(super) registry: &'r TileRegistry<T>,
    pub(super) node: Arc<TileNode<T>>,
    pub(super) buffer: Arc<TileBuffer<T>>,
    pub(super) space: MemorySpace,
    pub(super) shape: Shape,
    pub(super) op: Op,
    pub(super) ticks: usize,
    pub(super) release: bool,
}

impl<'r, T: Element> TileRead<'r, T> {
    /// Tag the view handed out by this guard with `op`
    pub fn with_op(mut self, op: Op) -> Self {
        self.op = op;
        self
    }

    /// Release this instance when the guard drops
    pub fn releasing(mut self) -> Self {
        self.release = true;
        self
    }

    /// Number of consumers this read serves; life drops by this much on drop
    pub fn consumers(mut self, n: usize) -> Self {
        self.ticks = n;
        self
    }

    /// Storage coordinate of the tile
    pub fn index(&self) -> TileIndex {
        self.node.index
    }

    /// Memory space of the instance
    pub fn space(&self) -> MemorySpace {
        self.space
    }

    /// Leading stride of the instance
    pub fn stride(&self) -> usize {
        self.shape.stride
    }

    /// Layout of the instance
    pub fn layout(&self) -> TileLayout {
        self.shape.layout
    }

    /// Op-tagged view of the tile
    pub fn view(&self) -> TileView<'_, T> {
        // SAFETY: this guard holds a read hold on the instance.
        let data = unsafe { self.buffer.data() };
        self.shape.view(data).with_op(self.op)
    }

    /// Raw data for batched calls
    pub fn ptr(&self) -> TilePtr<'_, T> {
        // SAFETY: this guard holds a read hold on the instance.
        TilePtr::new(unsafe { self.buffer.data() })
    }
}

impl<T: Element> fmt::Debug for TileRead<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileRead")
            .field("index", &self.node.index)
            .field("space", &self.space)
            .field("layout", &self.shape.layout)
            .field("op", &self.op)
            .field("ticks", &self.ticks)
            .finish()
    }
}

impl<T: Element> Drop for TileRead<'_, T> {
    fn drop(&mut self) {
        self.registry
            .finish(&self.node, self.space, false, self.release, self.ticks);
    }
}

/// Exclusive write access to one tile instance
pub struct TileWrite<'r, T: Element> {
    pub(super) registry: &'r TileRegistry<T>,
    pub(super) node: Arc<TileNode<T>>,
    pub(super) buffer: Arc<TileBuffer<T>>,
    pub(super) space: MemorySpace,
    pub(super) shape: Shape,
    pub(super) op: Op,
    pub(super) release: bool,
}

impl<'r, T: Element> TileWrite<'r, T> {
    /// Tag the views handed out by this guard with `op`
    pub fn with_op(mut self, op: Op) -> Self {
        self.op = op;
        self
    }

    /// Release this instance when the guard drops
    pub fn releasing(mut self) -> Self {
        self.release = true;
        self
    }

    /// Storage coordinate of the tile
    pub fn index(&self) -> TileIndex {
        self.node.index
    }

    /// Memory space of the instance
    pub fn space(&self) -> MemorySpace {
        self.space
    }

    /// Leading stride of the instance
    pub fn stride(&self) -> usize {
        self.shape.stride
    }

    /// Layout of the instance
    pub fn layout(&self) -> TileLayout {
        self.shape.layout
    }

    /// Op-tagged read-only view
    pub fn view(&self) -> TileView<'_, T> {
        // SAFETY: this guard holds the write hold; `&self` excludes `view_mut`.
        let data = unsafe { self.buffer.data() };
        self.shape.view(data).with_op(self.op)
    }

    /// Op-tagged mutable view
    pub fn view_mut(&mut self) -> TileViewMut<'_, T> {
        // SAFETY: this guard holds the only hold on the instance.
        let data = unsafe { self.buffer.data_mut() };
        self.shape.view_mut(data.as_mut_slice()).with_op(self.op)
    }

    /// Raw mutable data for batched calls
    pub fn ptr_mut(&mut self) -> TilePtrMut<'_, T> {
        // SAFETY: this guard holds the only hold on the instance.
        TilePtrMut::new(unsafe { self.buffer.data_mut() }.as_mut_slice())
    }
}

impl<T: Element> fmt::Debug for TileWrite<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileWrite")
            .field("index", &self.node.index)
            .field("space", &self.space)
            .field("layout", &self.shape.layout)
            .field("op", &self.op)
            .finish()
    }
}

impl<T: Element> Drop for TileWrite<'_, T> {
    fn drop(&mut self) {
        self.registry
            .finish(&self.node, self.space, true, self.release, 0);
    }
}
