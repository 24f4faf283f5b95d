//! Host device implementation

use crate::runtime::Device;
use crate::tile::MemorySpace;

/// Host device (there's only one: the host CPU)
#[derive(Clone, Debug, Default)]
pub struct CpuDevice {
    id: usize,
}

impl CpuDevice {
    /// Create a new host device
    pub fn new() -> Self {
        Self { id: 0 }
    }
}

impl Device for CpuDevice {
    fn id(&self) -> usize {
        self.id
    }

    fn memory_space(&self) -> MemorySpace {
        MemorySpace::Host
    }

    fn name(&self) -> String {
        "cpu".to_string()
    }
}
