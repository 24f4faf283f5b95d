//! Accelerator device identity

use crate::runtime::Device;
use crate::tile::MemorySpace;

/// One accelerator device
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AccelDevice {
    id: usize,
}

impl AccelDevice {
    /// Device number `id`
    pub fn new(id: usize) -> Self {
        Self { id }
    }
}

impl Device for AccelDevice {
    fn id(&self) -> usize {
        self.id
    }

    fn memory_space(&self) -> MemorySpace {
        MemorySpace::Device(self.id)
    }

    fn name(&self) -> String {
        format!("accel:{}", self.id)
    }
}
