//! Execution resources: host thread pool, accelerator devices, and memory spaces
//!
//! # Architecture
//!
//! ```text
//! Engine (shared runtime context)
//! ├── CpuClient (host thread pool, task graphs, host allocator)
//! └── AccelClient × num_devices
//!     ├── device thread pool (compute units)
//!     ├── DeviceQueue slots (exclusive, in-order work queues)
//!     └── device allocator
//! ```
//!
//! Accelerators are emulated on dedicated host thread pools: a launch covers
//! a grid of work-groups which run in parallel on the device's pool, while
//! launches on one queue run in the order they were enqueued.

mod allocator;
mod engine;

pub mod accel;
pub mod cpu;

pub use accel::{AccelClient, AccelDevice, DeviceQueue};
pub use allocator::{Allocator, TileAllocator, TileEvictor};
pub use cpu::{CpuClient, CpuDevice, ErrorSlot, Schedule, TaskGraph};
pub use engine::Engine;

use crate::tile::MemorySpace;

/// Trait for device identification
pub trait Device: Clone + Send + Sync + 'static {
    /// Unique identifier for this device
    fn id(&self) -> usize;

    /// Memory space tiles resident on this device live in
    fn memory_space(&self) -> MemorySpace;

    /// Check if two devices are the same
    fn is_same(&self, other: &Self) -> bool {
        self.id() == other.id()
    }

    /// Human-readable name
    fn name(&self) -> String {
        format!("Device({})", self.id())
    }
}
