//! Host client: thread pool and host allocator

use super::device::CpuDevice;
use crate::error::{Error, Result};
use crate::runtime::TileAllocator;
use crate::tile::MemorySpace;
use std::sync::Arc;

/// Host client for task dispatch
#[derive(Clone, Debug)]
pub struct CpuClient {
    device: CpuDevice,
    pool: Arc<rayon::ThreadPool>,
    allocator: TileAllocator,
}

impl CpuClient {
    /// Create a host client with `threads` workers (`None` = rayon default)
    /// and room for `capacity` tiles (`None` = unbounded)
    pub fn new(threads: Option<usize>, capacity: Option<usize>) -> Result<Self> {
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|i| format!("tilr-host-{}", i));
        if let Some(n) = threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| Error::Backend(format!("failed to build host thread pool: {}", e)))?;
        Ok(Self {
            device: CpuDevice::new(),
            pool: Arc::new(pool),
            allocator: TileAllocator::new(MemorySpace::Host, capacity),
        })
    }

    /// The host device
    pub fn device(&self) -> &CpuDevice {
        &self.device
    }

    /// Host tile allocator
    pub fn allocator(&self) -> &TileAllocator {
        &self.allocator
    }

    /// Worker count of the host pool
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `f` inside the host pool so nested rayon work lands there
    pub fn install_parallelism<R, F>(&self, f: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        self.pool.install(f)
    }

    /// Minimum items per rayon job for tile-granular loops
    ///
    /// Tile units are already coarse, so every cell may become its own job.
    pub fn rayon_min_len(&self) -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_client_thread_count() {
        let client = CpuClient::new(Some(3), None).unwrap();
        assert_eq!(client.num_threads(), 3);
        let total: usize = client.install_parallelism(|| (0..100usize).into_par_iter().sum());
        assert_eq!(total, 4950);
    }
}
