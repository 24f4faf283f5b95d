//! Accelerator client: compute pool, queue slots, device allocator

use super::device::AccelDevice;
use super::queue::{DeviceQueue, QueueSlot};
use crate::error::{Error, Result};
use crate::runtime::{Device, TileAllocator};
use parking_lot::Mutex;
use std::sync::Arc;

/// Default worker threads per emulated device
const DEFAULT_DEVICE_WORKERS: usize = 2;

pub(super) struct AccelInner {
    pub(super) device: AccelDevice,
    pub(super) pool: rayon::ThreadPool,
    pub(super) slots: Vec<Mutex<QueueSlot>>,
    pub(super) allocator: TileAllocator,
    pub(super) block_size: usize,
}

/// Client for one accelerator device
///
/// Cheap to clone; clones share the device's pool, queues, and allocator.
#[derive(Clone)]
pub struct AccelClient {
    inner: Arc<AccelInner>,
}

impl std::fmt::Debug for AccelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccelClient")
            .field("device", &self.inner.device)
            .field("queues", &self.inner.slots.len())
            .field("block_size", &self.inner.block_size)
            .finish()
    }
}

impl AccelClient {
    /// Create the client of device `id`
    pub fn new(
        id: usize,
        workers: Option<usize>,
        queues: usize,
        capacity: Option<usize>,
        block_size: usize,
    ) -> Result<Self> {
        if queues == 0 {
            return Err(Error::invalid_argument("queues", "a device needs at least one queue"));
        }
        let device = AccelDevice::new(id);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.unwrap_or(DEFAULT_DEVICE_WORKERS))
            .thread_name(move |i| format!("tilr-accel{}-{}", id, i))
            .build()
            .map_err(|e| Error::Backend(format!("failed to build pool for device {}: {}", id, e)))?;
        let slots = (0..queues).map(|_| Mutex::new(QueueSlot::default())).collect();
        Ok(Self {
            inner: Arc::new(AccelInner {
                device,
                pool,
                slots,
                allocator: TileAllocator::new(device.memory_space(), capacity),
                block_size: block_size.max(1),
            }),
        })
    }

    /// Device identity
    pub fn device(&self) -> &AccelDevice {
        &self.inner.device
    }

    /// Device tile allocator
    pub fn allocator(&self) -> &TileAllocator {
        &self.inner.allocator
    }

    /// Number of queue slots
    pub fn num_queues(&self) -> usize {
        self.inner.slots.len()
    }

    /// Work-group width of reduction kernels
    pub fn block_size(&self) -> usize {
        self.inner.block_size
    }

    /// Take exclusive ownership of queue slot `index` (modulo the slot count).
    ///
    /// Blocks while another task holds the slot.
    pub fn queue(&self, index: usize) -> DeviceQueue<'_> {
        let index = index % self.inner.slots.len();
        DeviceQueue::new(&self.inner, index)
    }

    /// Launches executed on slot `index` over the client's lifetime
    pub fn total_launches(&self, index: usize) -> u64 {
        let index = index % self.inner.slots.len();
        self.inner.slots[index].lock().launches
    }
}
