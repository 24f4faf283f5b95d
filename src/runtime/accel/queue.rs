//! In-order device work queues

use super::client::AccelInner;
use crate::device::DeviceFault;
use crate::runtime::Device;
use bytemuck::Zeroable;
use parking_lot::MutexGuard;

/// Per-slot bookkeeping, kept across queue handles
#[derive(Debug, Default)]
pub(crate) struct QueueSlot {
    pub(crate) launches: u64,
    pub(crate) memsets: u64,
}

type LaunchFn<'a> = Box<dyn FnOnce() -> Result<(), DeviceFault> + Send + 'a>;

enum Pending<'a> {
    Launch { kernel: &'static str, body: LaunchFn<'a> },
    Memset(Box<dyn FnOnce() + Send + 'a>),
}

/// Exclusive handle on one queue slot of a device
///
/// Work is enqueued without running; it executes in enqueue order on the
/// device's compute pool when [`sync`](Self::sync) is called or the handle is
/// dropped. Data borrowed by enqueued work must outlive the queue.
///
/// A launch that reports a [`DeviceFault`] is fatal: `sync` panics.
pub struct DeviceQueue<'a> {
    inner: &'a AccelInner,
    slot: MutexGuard<'a, QueueSlot>,
    index: usize,
    pending: Vec<Pending<'a>>,
    launches: usize,
    memsets: usize,
}

impl<'a> DeviceQueue<'a> {
    pub(super) fn new(inner: &'a AccelInner, index: usize) -> Self {
        let slot = inner.slots[index].lock();
        Self {
            inner,
            slot,
            index,
            pending: Vec::new(),
            launches: 0,
            memsets: 0,
        }
    }

    /// Device this queue feeds
    pub fn device_id(&self) -> usize {
        self.inner.device.id()
    }

    /// Slot index of this queue
    pub fn index(&self) -> usize {
        self.index
    }

    /// Work-group width of reduction kernels on this device
    pub fn block_size(&self) -> usize {
        self.inner.block_size
    }

    /// Enqueue one kernel launch
    pub fn launch<F>(&mut self, kernel: &'static str, body: F)
    where
        F: FnOnce() -> Result<(), DeviceFault> + Send + 'a,
    {
        self.launches += 1;
        self.pending.push(Pending::Launch {
            kernel,
            body: Box::new(body),
        });
    }

    /// Enqueue zero-filling `dst`
    pub fn memset<R>(&mut self, dst: &'a mut [R])
    where
        R: Zeroable + Copy + Send,
    {
        self.memsets += 1;
        self.pending
            .push(Pending::Memset(Box::new(move || dst.fill(R::zeroed()))));
    }

    /// Launches enqueued through this handle
    pub fn launch_count(&self) -> usize {
        self.launches
    }

    /// Memsets enqueued through this handle
    pub fn memset_count(&self) -> usize {
        self.memsets
    }

    /// Work enqueued but not yet executed
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Execute all enqueued work, in order, and wait for it.
    ///
    /// # Panics
    ///
    /// Panics if a launch reports a device fault.
    pub fn sync(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for work in pending {
            match work {
                Pending::Memset(fill) => {
                    self.inner.pool.install(fill);
                    self.slot.memsets += 1;
                }
                Pending::Launch { kernel, body } => {
                    let result = self.inner.pool.install(body);
                    self.slot.launches += 1;
                    if let Err(fault) = result {
                        log::error!(
                            "device {} queue {}: {} faulted: {}",
                            self.device_id(),
                            self.index,
                            kernel,
                            fault
                        );
                        panic!(
                            "device {} fault in {}: {}",
                            self.device_id(),
                            kernel,
                            fault
                        );
                    }
                }
            }
        }
    }
}

impl Drop for DeviceQueue<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.pending.clear();
        } else {
            self.sync();
        }
    }
}
