//! Per-tile state: one node per tile coordinate, one instance per memory space

use crate::dtype::Element;
use crate::tile::{MemorySpace, Tile, TileIndex, TileLayout, TileView, TileViewMut, convert_layout};
use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::sync::Arc;

/// Tile storage shared between a node and the guards reading or writing it
///
/// The node lock and the hold counts of the owning [`Instance`] arbitrate
/// access: data is written only by the single writer hold or, with no holds
/// at all, by the node lock owner.
pub(crate) struct TileBuffer<T> {
    data: UnsafeCell<Vec<T>>,
}

// SAFETY: all access goes through the hold protocol described above.
unsafe impl<T: Send + Sync> Sync for TileBuffer<T> {}

impl<T> TileBuffer<T> {
    pub(crate) fn new(data: Vec<T>) -> Arc<Self> {
        Arc::new(Self {
            data: UnsafeCell::new(data),
        })
    }

    /// # Safety
    ///
    /// The caller must hold a read hold, a write hold, or the node lock with
    /// no writer hold outstanding.
    pub(crate) unsafe fn data(&self) -> &[T] {
        unsafe { &*self.data.get() }
    }

    /// # Safety
    ///
    /// The caller must hold the only write hold, or the node lock with no
    /// holds outstanding.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn data_mut(&self) -> &mut Vec<T> {
        unsafe { &mut *self.data.get() }
    }
}

/// Stride and layout of one instance
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Shape {
    pub(crate) mb: usize,
    pub(crate) nb: usize,
    pub(crate) stride: usize,
    pub(crate) layout: TileLayout,
}

impl Shape {
    pub(crate) fn packed(mb: usize, nb: usize, layout: TileLayout) -> Self {
        Self {
            mb,
            nb,
            stride: layout.min_stride(mb, nb),
            layout,
        }
    }

    pub(crate) fn view<'a, T: Element>(&self, data: &'a [T]) -> TileView<'a, T> {
        TileView::from_raw_parts(data, self.mb, self.nb, self.stride, self.layout)
    }

    pub(crate) fn view_mut<'a, T: Element>(&self, data: &'a mut [T]) -> TileViewMut<'a, T> {
        TileViewMut::from_raw_parts(data, self.mb, self.nb, self.stride, self.layout)
    }
}

/// A copy of a tile in one memory space
pub(crate) struct Instance<T> {
    pub(crate) space: MemorySpace,
    pub(crate) buffer: Arc<TileBuffer<T>>,
    pub(crate) shape: Shape,
    pub(crate) valid: bool,
    pub(crate) readers: usize,
    pub(crate) writer: bool,
    pub(crate) released: bool,
}

impl<T: Element> Instance<T> {
    pub(crate) fn from_tile(space: MemorySpace, tile: Tile<T>) -> Self {
        let shape = Shape {
            mb: tile.mb(),
            nb: tile.nb(),
            stride: tile.stride(),
            layout: tile.layout(),
        };
        Self {
            space,
            buffer: TileBuffer::new(tile.into_data()),
            shape,
            valid: true,
            readers: 0,
            writer: false,
            released: false,
        }
    }

    pub(crate) fn empty(space: MemorySpace, mb: usize, nb: usize, layout: TileLayout) -> Self {
        let mut inst = Self::from_tile(space, Tile::zeros(mb, nb, layout));
        inst.valid = false;
        inst
    }

    #[inline]
    pub(crate) fn is_held(&self) -> bool {
        self.readers > 0 || self.writer
    }

    /// Overwrite this instance with a copy of `src`. Needs no holds on `self`
    /// and no writer on `src`.
    pub(crate) fn copy_from(&mut self, src: &Instance<T>) {
        // SAFETY: node lock held, `self` has no holds, `src` has no writer.
        let data = unsafe { src.buffer.data() }.to_vec();
        unsafe { *self.buffer.data_mut() = data };
        self.shape = src.shape;
    }

    /// Replace the content with zeros packed in `layout`. Needs no holds.
    pub(crate) fn reset(&mut self, layout: TileLayout) {
        let tile = Tile::<T>::zeros(self.shape.mb, self.shape.nb, layout);
        self.shape = Shape::packed(self.shape.mb, self.shape.nb, layout);
        // SAFETY: node lock held and no holds outstanding.
        unsafe { *self.buffer.data_mut() = tile.into_data() };
    }

    /// Convert in place to `layout`. Needs no holds.
    pub(crate) fn convert(&mut self, layout: TileLayout) {
        if self.shape.layout == layout {
            return;
        }
        // SAFETY: node lock held and no holds outstanding.
        let data = unsafe { self.buffer.data_mut() };
        let Shape { mb, nb, stride, layout: from } = self.shape;
        let stride = convert_layout(data, mb, nb, stride, from);
        self.shape = Shape { mb, nb, stride, layout };
    }
}

/// Mutable state of one tile coordinate
pub(crate) struct NodeState<T> {
    /// Memory space of the authoritative copy, `None` for received copies
    pub(crate) origin: Option<MemorySpace>,
    /// Pending consumers of the current content
    pub(crate) life: usize,
    /// Life was ticked down to zero since it was last set
    pub(crate) consumed: bool,
    pub(crate) instances: Vec<Instance<T>>,
}

impl<T: Element> NodeState<T> {
    pub(crate) fn find(&self, space: MemorySpace) -> Option<usize> {
        self.instances.iter().position(|inst| inst.space == space)
    }

    pub(crate) fn valid_count(&self) -> usize {
        self.instances.iter().filter(|inst| inst.valid).count()
    }

    /// Whether instance `pos` may be dropped right now, given it is no longer
    /// needed
    pub(crate) fn droppable(&self, pos: usize) -> bool {
        let inst = &self.instances[pos];
        if inst.is_held() || Some(inst.space) == self.origin {
            return false;
        }
        if inst.valid && self.valid_count() == 1 {
            // last copy: only a fully consumed received tile may go
            return self.origin.is_none() && self.life == 0;
        }
        true
    }

    /// Whether instance `pos` may be evicted to make room. The last valid
    /// copy of a local tile qualifies when it can be written back first.
    pub(crate) fn evictable(&self, pos: usize) -> bool {
        let inst = &self.instances[pos];
        if !(inst.released || self.life == 0) {
            return false;
        }
        self.droppable(pos) || self.write_back_target(pos).is_some()
    }

    /// Idle origin instance able to take the content of instance `pos`,
    /// when `pos` is an idle non-origin copy holding the only valid content
    pub(crate) fn write_back_target(&self, pos: usize) -> Option<usize> {
        let inst = &self.instances[pos];
        if inst.is_held() || !inst.valid || self.valid_count() != 1 {
            return None;
        }
        let origin = self.origin.filter(|&space| space != inst.space)?;
        let target = self.find(origin)?;
        (!self.instances[target].is_held()).then_some(target)
    }

    /// Pick an instance to serve as transfer source: origin first, then host,
    /// then any valid copy
    pub(crate) fn best_source(&self) -> Option<usize> {
        let pick = |space: MemorySpace| {
            self.instances
                .iter()
                .position(|inst| inst.valid && inst.space == space)
        };
        self.origin
            .and_then(pick)
            .or_else(|| pick(MemorySpace::Host))
            .or_else(|| self.instances.iter().position(|inst| inst.valid))
    }
}

/// One tile coordinate of a registry
pub(crate) struct TileNode<T> {
    pub(crate) index: TileIndex,
    pub(crate) mb: usize,
    pub(crate) nb: usize,
    pub(crate) state: Mutex<NodeState<T>>,
}

impl<T> TileNode<T> {
    pub(crate) fn new(index: TileIndex, mb: usize, nb: usize, state: NodeState<T>) -> Arc<Self> {
        Arc::new(Self {
            index,
            mb,
            nb,
            state: Mutex::new(state),
        })
    }
}
