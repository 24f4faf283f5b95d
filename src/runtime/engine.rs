//! Engine: the shared runtime context matrices are created in

use super::accel::AccelClient;
use super::cpu::CpuClient;
use super::{Allocator, TileAllocator, TileEvictor};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::tile::MemorySpace;
use std::sync::{Arc, Weak};

#[derive(Debug)]
struct EngineInner {
    config: EngineConfig,
    host: CpuClient,
    devices: Vec<AccelClient>,
}

/// Host client plus the accelerator clients of one process
///
/// Cheap to clone; clones share pools, queues, and allocators.
#[derive(Clone, Debug)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Build an engine from `config`
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let host = CpuClient::new(config.host_threads, config.host_tile_capacity)?;
        let devices = (0..config.num_devices)
            .map(|id| {
                AccelClient::new(
                    id,
                    config.device_workers,
                    config.queues_per_device,
                    config.device_tile_capacity,
                    config.device_block_size,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        log::debug!(
            "engine: {} host threads, {} devices x {} queues",
            host.num_threads(),
            devices.len(),
            config.queues_per_device
        );
        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                host,
                devices,
            }),
        })
    }

    /// Host-only engine with default settings
    pub fn host_only() -> Result<Self> {
        Self::new(EngineConfig::default())
    }

    /// Configuration the engine was built from
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Host client
    pub fn host(&self) -> &CpuClient {
        &self.inner.host
    }

    /// Number of accelerator devices
    pub fn num_devices(&self) -> usize {
        self.inner.devices.len()
    }

    /// Client of device `id`
    pub fn device(&self, id: usize) -> Result<&AccelClient> {
        self.inner.devices.get(id).ok_or_else(|| {
            Error::invalid_argument(
                "device",
                format!("device {} does not exist ({} devices)", id, self.num_devices()),
            )
        })
    }

    /// Allocator of `space`
    pub fn allocator(&self, space: MemorySpace) -> Result<&TileAllocator> {
        match space {
            MemorySpace::Host => Ok(self.inner.host.allocator()),
            MemorySpace::Device(id) => Ok(self.device(id)?.allocator()),
        }
    }

    /// Register `evictor` with the allocator of every memory space
    pub fn register_evictor(&self, evictor: &Weak<dyn TileEvictor>) {
        self.inner.host.allocator().register_evictor(evictor.clone());
        for device in &self.inner.devices {
            device.allocator().register_evictor(evictor.clone());
        }
    }

    /// Tiles currently resident in `space`
    pub fn resident_tiles(&self, space: MemorySpace) -> usize {
        self.allocator(space).map(|a| a.allocated_tiles()).unwrap_or(0)
    }

    /// Whether the host batched back-end can be used
    pub fn host_batch_available(&self) -> bool {
        self.inner.config.host_batch_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_devices() {
        let engine = Engine::new(EngineConfig::new().with_num_devices(2).with_host_threads(2)).unwrap();
        assert_eq!(engine.num_devices(), 2);
        assert!(engine.device(1).is_ok());
        assert!(engine.device(2).is_err());
        assert!(engine.allocator(MemorySpace::Device(1)).is_ok());
        assert_eq!(engine.resident_tiles(MemorySpace::Host), 0);
    }

    #[test]
    fn test_engine_rejects_bad_config() {
        assert!(Engine::new(EngineConfig::new().with_host_threads(0)).is_err());
    }
}
