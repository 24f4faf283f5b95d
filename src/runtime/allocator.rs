//! Tile slot allocators
//!
//! Memory spaces are budgeted in tiles rather than bytes: every resident tile
//! instance holds one slot of the allocator of the space it lives in.

use crate::tile::MemorySpace;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Slot allocator trait for memory spaces
///
/// Allocators are shared by every matrix living in the same space, so they
/// must be cheap to clone and safe to use from many tasks at once.
pub trait Allocator: Clone + Send + Sync {
    /// Reserve one tile slot. Returns false when the space is full.
    fn try_allocate(&self) -> bool;

    /// Return one tile slot
    fn deallocate(&self);

    /// Capacity in tiles (`None` = unbounded)
    fn capacity(&self) -> Option<usize> {
        None
    }

    /// Tiles currently allocated
    fn allocated_tiles(&self) -> usize {
        0 // Default: tracking not supported
    }
}

/// Holder of tile instances that can give one up when a space is full
pub trait TileEvictor: Send + Sync {
    /// Drop one idle instance resident in `space`. Returns false if none
    /// could be dropped without waiting.
    fn evict_idle(&self, space: MemorySpace) -> bool;
}

#[derive(Debug)]
struct PoolState {
    capacity: Option<usize>,
    used: AtomicUsize,
    peak: AtomicUsize,
}

/// Capacity-limited allocator for one memory space
///
/// Registries allocating from it register as evictors, so a full space can
/// be relieved by dropping idle copies of any matrix living there.
#[derive(Clone)]
pub struct TileAllocator {
    space: MemorySpace,
    state: Arc<PoolState>,
    evictors: Arc<Mutex<Vec<Weak<dyn TileEvictor>>>>,
}

impl fmt::Debug for TileAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileAllocator")
            .field("space", &self.space)
            .field("state", &self.state)
            .field("evictors", &self.evictors.lock().len())
            .finish()
    }
}

impl TileAllocator {
    /// Create an allocator for `space` holding at most `capacity` tiles
    pub fn new(space: MemorySpace, capacity: Option<usize>) -> Self {
        Self {
            space,
            state: Arc::new(PoolState {
                capacity,
                used: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
            evictors: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Memory space this allocator budgets
    pub fn space(&self) -> MemorySpace {
        self.space
    }

    /// Highest number of simultaneously allocated tiles
    pub fn peak_tiles(&self) -> usize {
        self.state.peak.load(Ordering::Relaxed)
    }

    /// Register a holder of tiles in this space; dead entries are pruned
    pub fn register_evictor(&self, evictor: Weak<dyn TileEvictor>) {
        let mut evictors = self.evictors.lock();
        evictors.retain(|e| e.strong_count() > 0);
        evictors.push(evictor);
    }

    /// Ask registered holders, in registration order, to drop one idle
    /// instance. Returns true once one did.
    pub fn evict_idle(&self) -> bool {
        let live: Vec<Arc<dyn TileEvictor>> =
            self.evictors.lock().iter().filter_map(Weak::upgrade).collect();
        live.iter().any(|evictor| evictor.evict_idle(self.space))
    }
}

impl Allocator for TileAllocator {
    fn try_allocate(&self) -> bool {
        let limit = self.state.capacity.unwrap_or(usize::MAX);
        let reserved = self
            .state
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < limit).then_some(used + 1)
            });
        match reserved {
            Ok(prev) => {
                self.state.peak.fetch_max(prev + 1, Ordering::Relaxed);
                true
            }
            Err(_) => false,
        }
    }

    fn deallocate(&self) {
        let released = self
            .state
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| used.checked_sub(1));
        debug_assert!(released.is_ok(), "deallocate without matching allocate");
    }

    fn capacity(&self) -> Option<usize> {
        self.state.capacity
    }

    fn allocated_tiles(&self) -> usize {
        self.state.used.load(Ordering::Acquire)
    }
}
