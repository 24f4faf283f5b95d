//! Tile Registry: residency, validity, layout, and life of every tile of one
//! matrix across memory spaces
//!
//! Each tile coordinate is a node guarded by its own mutex, so acquisitions of
//! disjoint tiles run concurrently while acquisitions of the same tile are
//! serialized. A node owns one instance per memory space it is resident in.
//!
//! ```text
//! TileRegistry
//! └── node (i, j)          origin space, life
//!     ├── instance host      valid, layout, holds, released
//!     └── instance device:d  ...
//! ```
//!
//! Lock order: a node lock may be held while taking the node map for
//! reading, and other nodes are only ever `try_lock`ed from there. The map is
//! never written while a node lock is held.

mod guard;
mod node;

pub use guard::{TileRead, TileWrite};

use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::runtime::{Allocator, Engine, TileEvictor};
use crate::tile::{MemorySpace, Op, Tile, TileIndex, TileLayout};
use node::{Instance, NodeState, TileNode};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// Access intent of an acquisition
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Access {
    /// Read the current content
    Read,
    /// Update the current content in place
    ReadWrite,
    /// Overwrite; prior content is not needed
    Write,
}

/// Counters of work done by a registry
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Copies between memory spaces
    pub transfers: u64,
    /// In-place layout conversions
    pub conversions: u64,
    /// Tile slots allocated
    pub allocations: u64,
    /// Instances dropped to make room
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct Counters {
    transfers: AtomicU64,
    conversions: AtomicU64,
    allocations: AtomicU64,
    evictions: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Tile storage of one distributed matrix on this process
pub struct TileRegistry<T: Element> {
    engine: Engine,
    nodes: RwLock<HashMap<TileIndex, Arc<TileNode<T>>>>,
    counters: Counters,
}

impl<T: Element> std::fmt::Debug for TileRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileRegistry")
            .field("dtype", &T::DTYPE)
            .field("tiles", &self.nodes.read().len())
            .field("stats", &self.stats())
            .finish()
    }
}

impl<T: Element> TileRegistry<T> {
    /// Empty registry allocating from `engine`'s memory spaces
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            nodes: RwLock::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Registry whose idle copies other matrices of `engine` may evict when
    /// they run out of room
    pub fn shared(engine: Engine) -> Arc<Self> {
        let registry = Arc::new(Self::new(engine));
        let weak: Weak<Self> = Arc::downgrade(&registry);
        let evictor: Weak<dyn TileEvictor> = weak;
        registry.engine.register_evictor(&evictor);
        registry
    }

    /// Engine this registry allocates from
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Snapshot of the work counters
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            transfers: self.counters.transfers.load(Ordering::Relaxed),
            conversions: self.counters.conversions.load(Ordering::Relaxed),
            allocations: self.counters.allocations.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    /// Insert the authoritative copy of tile `index`, resident in `space`
    pub fn insert_origin(&self, index: TileIndex, space: MemorySpace, tile: Tile<T>) -> Result<()> {
        if self.nodes.read().contains_key(&index) {
            return Err(Error::invalid_argument(
                "index",
                format!("tile ({}, {}) is already registered", index.0, index.1),
            ));
        }
        let mut state = NodeState {
            origin: Some(space),
            life: 0,
            consumed: false,
            instances: Vec::new(),
        };
        self.reserve(index, space, &mut state)?;
        let (mb, nb) = (tile.mb(), tile.nb());
        state.instances.push(Instance::from_tile(space, tile));
        self.nodes
            .write()
            .insert(index, TileNode::new(index, mb, nb, state));
        Ok(())
    }

    /// Insert a received copy of a tile owned by another process.
    ///
    /// `life` counts the local consumers still to read it; once ticks bring it
    /// to zero every idle copy is dropped.
    pub fn insert_shadow(&self, index: TileIndex, tile: Tile<T>, life: usize) -> Result<()> {
        let existing = self.nodes.read().get(&index).cloned();
        if let Some(node) = existing {
            let mut state = node.state.lock();
            if state.origin.is_some() {
                return Err(Error::invalid_argument(
                    "index",
                    format!("tile ({}, {}) is owned by this process", index.0, index.1),
                ));
            }
            if let Some(inst) = state.instances.iter().find(|inst| inst.is_held()) {
                return Err(Error::TileBusy {
                    row: index.0,
                    col: index.1,
                    space: inst.space,
                });
            }
            for inst in state.instances.iter_mut() {
                inst.valid = false;
            }
            match state.find(MemorySpace::Host) {
                Some(pos) => state.instances[pos] = Instance::from_tile(MemorySpace::Host, tile),
                None => {
                    self.reserve(index, MemorySpace::Host, &mut state)?;
                    state
                        .instances
                        .push(Instance::from_tile(MemorySpace::Host, tile));
                }
            }
            state.life = life;
            state.consumed = false;
            return Ok(());
        }

        let mut state = NodeState {
            origin: None,
            life,
            consumed: false,
            instances: Vec::new(),
        };
        self.reserve(index, MemorySpace::Host, &mut state)?;
        let (mb, nb) = (tile.mb(), tile.nb());
        state
            .instances
            .push(Instance::from_tile(MemorySpace::Host, tile));
        self.nodes
            .write()
            .insert(index, TileNode::new(index, mb, nb, state));
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    fn node(&self, index: TileIndex) -> Result<Arc<TileNode<T>>> {
        self.nodes.read().get(&index).cloned().ok_or(Error::TileMissing {
            row: index.0,
            col: index.1,
        })
    }

    /// Whether tile `index` is known to this registry
    pub fn contains(&self, index: TileIndex) -> bool {
        self.nodes.read().contains_key(&index)
    }

    /// Memory space of the origin copy; `None` for received or unknown tiles
    pub fn origin(&self, index: TileIndex) -> Option<MemorySpace> {
        let node = self.node(index).ok()?;
        let origin = node.state.lock().origin;
        origin
    }

    /// Current life of tile `index`
    pub fn life(&self, index: TileIndex) -> Option<usize> {
        let node = self.node(index).ok()?;
        let life = node.state.lock().life;
        Some(life)
    }

    /// Memory spaces holding a valid copy of tile `index`
    pub fn valid_spaces(&self, index: TileIndex) -> Vec<MemorySpace> {
        match self.node(index) {
            Ok(node) => {
                let state = node.state.lock();
                let mut spaces: Vec<_> = state
                    .instances
                    .iter()
                    .filter(|inst| inst.valid)
                    .map(|inst| inst.space)
                    .collect();
                spaces.sort();
                spaces
            }
            Err(_) => Vec::new(),
        }
    }

    /// Whether `space` holds an instance of tile `index`, valid or not
    pub fn is_resident(&self, index: TileIndex, space: MemorySpace) -> bool {
        self.node(index)
            .map(|node| node.state.lock().find(space).is_some())
            .unwrap_or(false)
    }

    // ========================================================================
    // Acquisition
    // ========================================================================

    /// Borrow tile `index` for reading in `space` with `layout`.
    ///
    /// Transfers from the best valid copy when `space` holds none, then
    /// converts the layout in place if needed. A second acquisition with the
    /// same layout finds the copy valid and does no further work.
    pub fn acquire_read(
        &self,
        index: TileIndex,
        space: MemorySpace,
        layout: TileLayout,
    ) -> Result<TileRead<'_, T>> {
        let node = self.node(index)?;
        let (buffer, shape) = {
            let mut state = node.state.lock();
            let pos = self.prepare(&node, &mut state, space, layout, Access::Read)?;
            let inst = &mut state.instances[pos];
            inst.readers += 1;
            inst.released = false;
            (inst.buffer.clone(), inst.shape)
        };
        Ok(TileRead {
            registry: self,
            node,
            buffer,
            space,
            shape,
            op: Op::NoTrans,
            ticks: 0,
            release: false,
        })
    }

    /// Borrow tile `index` for writing in `space` with `layout`.
    ///
    /// With [`Access::ReadWrite`] the prior content is made valid first; with
    /// [`Access::Write`] it is not. Every other copy becomes invalid.
    pub fn acquire_write(
        &self,
        index: TileIndex,
        space: MemorySpace,
        layout: TileLayout,
        access: Access,
    ) -> Result<TileWrite<'_, T>> {
        let access = if access == Access::Read {
            Access::ReadWrite
        } else {
            access
        };
        let node = self.node(index)?;
        let (buffer, shape) = {
            let mut state = node.state.lock();
            if let Some(inst) = state.instances.iter().find(|inst| inst.is_held()) {
                return Err(Error::TileBusy {
                    row: index.0,
                    col: index.1,
                    space: inst.space,
                });
            }
            let pos = self.prepare(&node, &mut state, space, layout, access)?;
            for (k, inst) in state.instances.iter_mut().enumerate() {
                inst.valid = k == pos;
            }
            let inst = &mut state.instances[pos];
            inst.writer = true;
            inst.released = false;
            (inst.buffer.clone(), inst.shape)
        };
        Ok(TileWrite {
            registry: self,
            node,
            buffer,
            space,
            shape,
            op: Op::NoTrans,
            release: false,
        })
    }

    /// Make the instance of `node` in `space` hold what `access` needs, in
    /// `layout`. Returns its position.
    fn prepare(
        &self,
        node: &TileNode<T>,
        state: &mut NodeState<T>,
        space: MemorySpace,
        layout: TileLayout,
        access: Access,
    ) -> Result<usize> {
        let (row, col) = node.index;
        let busy = |space| Error::TileBusy { row, col, space };

        let existing = state.find(space);
        if let Some(pos) = existing {
            if state.instances[pos].writer {
                return Err(busy(space));
            }
        }

        if access == Access::Write {
            let pos = match existing {
                Some(pos) => pos,
                None => {
                    self.reserve(node.index, space, state)?;
                    state
                        .instances
                        .push(Instance::empty(space, node.mb, node.nb, layout));
                    state.instances.len() - 1
                }
            };
            let inst = &mut state.instances[pos];
            if !inst.valid || inst.shape.layout != layout {
                inst.reset(layout);
            }
            return Ok(pos);
        }

        let pos = match existing {
            Some(pos) if state.instances[pos].valid => pos,
            _ => {
                let src = state.best_source().ok_or(Error::TileMissing { row, col })?;
                if state.instances[src].writer {
                    return Err(busy(state.instances[src].space));
                }
                let dst = match existing {
                    Some(pos) => pos,
                    None => {
                        self.reserve(node.index, space, state)?;
                        state
                            .instances
                            .push(Instance::empty(space, node.mb, node.nb, layout));
                        state.instances.len() - 1
                    }
                };
                // eviction never touches the node being prepared, so `src`
                // is still in place
                let (src_inst, dst_inst) = pair_mut(&mut state.instances, src, dst);
                dst_inst.copy_from(src_inst);
                dst_inst.valid = true;
                bump(&self.counters.transfers);
                log::trace!(
                    "tile ({}, {}): transfer {} -> {}",
                    row,
                    col,
                    src_inst.space,
                    space
                );
                dst
            }
        };

        let inst = &mut state.instances[pos];
        if inst.shape.layout != layout {
            if inst.is_held() {
                return Err(busy(space));
            }
            inst.convert(layout);
            bump(&self.counters.conversions);
            log::trace!("tile ({}, {}): converted to {:?} in {}", row, col, layout, space);
        }
        Ok(pos)
    }

    /// Take one slot of `space`, evicting idle copies of other tiles if full
    fn reserve(&self, index: TileIndex, space: MemorySpace, state: &mut NodeState<T>) -> Result<()> {
        let allocator = self.engine.allocator(space)?;
        loop {
            if allocator.try_allocate() {
                bump(&self.counters.allocations);
                return Ok(());
            }
            if !self.evict_one(index, space, state) {
                let capacity = allocator.capacity().unwrap_or(usize::MAX);
                log::warn!(
                    "tile ({}, {}): {} is full ({} tiles) and nothing is evictable",
                    index.0,
                    index.1,
                    space,
                    capacity
                );
                return Err(Error::ResourceExhausted { space, capacity });
            }
        }
    }

    /// Drop one evictable instance in `space`: first from the locked node
    /// `index`, then from any matrix sharing the space's allocator. Other
    /// nodes are only tried, never waited for.
    fn evict_one(&self, index: TileIndex, space: MemorySpace, state: &mut NodeState<T>) -> bool {
        if let Some(pos) = (0..state.instances.len())
            .find(|&pos| state.instances[pos].space == space && state.evictable(pos))
        {
            self.evict_at(index, state, pos);
            return true;
        }
        if self.evict_idle(space) {
            return true;
        }
        match self.engine.allocator(space) {
            Ok(allocator) => allocator.evict_idle(),
            Err(_) => false,
        }
    }

    /// Evict instance `pos`, copying it back to the origin instance first
    /// when it holds the only valid content
    fn evict_at(&self, index: TileIndex, state: &mut NodeState<T>, pos: usize) {
        if let Some(target) = state.write_back_target(pos) {
            let (src, dst) = pair_mut(&mut state.instances, pos, target);
            dst.copy_from(src);
            dst.valid = true;
            bump(&self.counters.transfers);
            log::trace!(
                "tile ({}, {}): wrote back {} -> {}",
                index.0,
                index.1,
                src.space,
                dst.space
            );
        }
        self.drop_instance(index, state, pos);
        bump(&self.counters.evictions);
    }

    fn drop_instance(&self, index: TileIndex, state: &mut NodeState<T>, pos: usize) {
        let inst = state.instances.swap_remove(pos);
        log::trace!("tile ({}, {}): dropped copy in {}", index.0, index.1, inst.space);
        if let Ok(allocator) = self.engine.allocator(inst.space) {
            allocator.deallocate();
        }
    }

    /// Drop idle copies that are no longer needed
    fn reclaim(&self, index: TileIndex, state: &mut NodeState<T>, consumed: bool) {
        let mut pos = 0;
        while pos < state.instances.len() {
            let wanted = state.instances[pos].released || (consumed && state.life == 0);
            if wanted && state.droppable(pos) {
                self.drop_instance(index, state, pos);
            } else {
                pos += 1;
            }
        }
    }

    // ========================================================================
    // Release and life
    // ========================================================================

    /// Mark the copy of tile `index` in `space` as no longer needed.
    ///
    /// An idle non-origin copy is dropped at once; a held one as soon as its
    /// last guard goes away. Origin copies are never dropped.
    pub fn release(&self, index: TileIndex, space: MemorySpace) -> Result<()> {
        let node = self.node(index)?;
        let mut state = node.state.lock();
        if let Some(pos) = state.find(space) {
            if Some(space) != state.origin {
                state.instances[pos].released = true;
                self.reclaim(index, &mut state, false);
            }
        }
        Ok(())
    }

    /// Decrement the life of tile `index` by one
    pub fn tick(&self, index: TileIndex) -> Result<()> {
        self.tick_by(index, 1)
    }

    /// Decrement the life of tile `index` by `n`, saturating at zero.
    ///
    /// When life reaches zero, idle shadow copies are dropped: every copy of a
    /// received tile, non-origin copies of a local one.
    pub fn tick_by(&self, index: TileIndex, n: usize) -> Result<()> {
        let node = self.node(index)?;
        let mut state = node.state.lock();
        self.apply_ticks(index, &mut state, n);
        Ok(())
    }

    fn apply_ticks(&self, index: TileIndex, state: &mut NodeState<T>, n: usize) {
        if n == 0 || state.life == 0 {
            return;
        }
        state.life = state.life.saturating_sub(n);
        if state.life == 0 {
            state.consumed = true;
            self.reclaim(index, state, true);
        }
    }

    /// Set the life of tile `index`
    pub fn set_life(&self, index: TileIndex, life: usize) -> Result<()> {
        let node = self.node(index)?;
        let mut state = node.state.lock();
        state.life = life;
        state.consumed = false;
        Ok(())
    }

    /// Return the hold of a guard
    fn finish(&self, node: &TileNode<T>, space: MemorySpace, writer: bool, release: bool, ticks: usize) {
        let mut state = node.state.lock();
        let origin = state.origin;
        if let Some(pos) = state.find(space) {
            let inst = &mut state.instances[pos];
            if writer {
                inst.writer = false;
            } else {
                inst.readers = inst.readers.saturating_sub(1);
            }
            if release && Some(space) != origin {
                inst.released = true;
            }
        }
        self.apply_ticks(node.index, &mut state, ticks);
        // copies held while their life ran out go once idle
        let consumed = state.consumed;
        self.reclaim(node.index, &mut state, consumed);
    }
}

impl<T: Element> TileEvictor for TileRegistry<T> {
    fn evict_idle(&self, space: MemorySpace) -> bool {
        let Some(nodes) = self.nodes.try_read() else {
            return false;
        };
        let nodes: Vec<Arc<TileNode<T>>> = nodes.values().cloned().collect();
        for node in nodes {
            let Some(mut state) = node.state.try_lock() else {
                continue;
            };
            let found = (0..state.instances.len())
                .find(|&pos| state.instances[pos].space == space && state.evictable(pos));
            if let Some(pos) = found {
                self.evict_at(node.index, &mut state, pos);
                return true;
            }
        }
        false
    }
}

impl<T: Element> Drop for TileRegistry<T> {
    fn drop(&mut self) {
        for node in self.nodes.get_mut().values() {
            for inst in node.state.lock().instances.iter() {
                if let Ok(allocator) = self.engine.allocator(inst.space) {
                    allocator.deallocate();
                }
            }
        }
    }
}

/// Disjoint shared and mutable borrows of two vector elements
fn pair_mut<X>(items: &mut [X], shared: usize, unique: usize) -> (&X, &mut X) {
    debug_assert_ne!(shared, unique);
    if shared < unique {
        let (head, tail) = items.split_at_mut(unique);
        (&head[shared], &mut tail[0])
    } else {
        let (head, tail) = items.split_at_mut(shared);
        (&tail[0], &mut head[unique])
    }
}
