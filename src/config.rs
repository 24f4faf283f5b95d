//! Engine construction and per-call dispatch settings

use crate::error::{Error, Result};
use crate::internal::Target;
use crate::tile::TileLayout;

/// Work-group width of device reductions
pub const DEVICE_BLOCK_SIZE: usize = 512;

/// Default number of exclusive queues per device
pub const DEFAULT_QUEUES_PER_DEVICE: usize = 2;

/// Configuration of an [`Engine`](crate::Engine)
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Host worker threads (`None` = rayon default)
    pub host_threads: Option<usize>,

    /// Number of accelerator devices
    pub num_devices: usize,

    /// Queue slots per device
    pub queues_per_device: usize,

    /// Worker threads emulating each device's compute units (`None` = 2)
    pub device_workers: Option<usize>,

    /// Work-group width for device reductions
    pub device_block_size: usize,

    /// Host tile capacity (`None` = unbounded)
    pub host_tile_capacity: Option<usize>,

    /// Tile capacity of each device (`None` = unbounded)
    pub device_tile_capacity: Option<usize>,

    /// Allow the host batched back-end (needs the `host-batch` feature)
    pub host_batch: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host_threads: None,
            num_devices: 0,
            queues_per_device: DEFAULT_QUEUES_PER_DEVICE,
            device_workers: None,
            device_block_size: DEVICE_BLOCK_SIZE,
            host_tile_capacity: None,
            device_tile_capacity: None,
            host_batch: true,
        }
    }
}

fn env_usize(name: &str) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    match val.trim().parse::<usize>() {
        Ok(n) => Some(n),
        Err(_) => {
            log::warn!("ignoring {}={:?}: not a count", name, val);
            None
        }
    }
}

fn env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => {
            log::warn!("ignoring {}={:?}: not a boolean", name, val);
            None
        }
    }
}

impl EngineConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `TILR_*` environment variables.
    ///
    /// Unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = env_usize("TILR_HOST_THREADS").filter(|&n| n > 0) {
            config.host_threads = Some(n);
        }
        if let Some(n) = env_usize("TILR_NUM_DEVICES") {
            config.num_devices = n;
        }
        if let Some(n) = env_usize("TILR_QUEUES_PER_DEVICE").filter(|&n| n > 0) {
            config.queues_per_device = n;
        }
        if let Some(n) = env_usize("TILR_DEVICE_WORKERS").filter(|&n| n > 0) {
            config.device_workers = Some(n);
        }
        if let Some(n) = env_usize("TILR_DEVICE_BLOCK_SIZE").filter(|&n| n > 0) {
            config.device_block_size = n;
        }
        if let Some(n) = env_usize("TILR_DEVICE_CAPACITY") {
            config.device_tile_capacity = Some(n);
        }
        if let Some(n) = env_usize("TILR_HOST_CAPACITY") {
            config.host_tile_capacity = Some(n);
        }
        if let Some(b) = env_bool("TILR_HOST_BATCH") {
            config.host_batch = b;
        }
        config
    }

    /// Set the host thread count
    pub fn with_host_threads(mut self, n: usize) -> Self {
        self.host_threads = Some(n);
        self
    }

    /// Set the number of devices
    pub fn with_num_devices(mut self, n: usize) -> Self {
        self.num_devices = n;
        self
    }

    /// Set the number of queue slots per device
    pub fn with_queues_per_device(mut self, n: usize) -> Self {
        self.queues_per_device = n;
        self
    }

    /// Set the worker count of each device
    pub fn with_device_workers(mut self, n: usize) -> Self {
        self.device_workers = Some(n);
        self
    }

    /// Set the device reduction work-group width
    pub fn with_device_block_size(mut self, n: usize) -> Self {
        self.device_block_size = n;
        self
    }

    /// Limit how many tiles host memory holds
    pub fn with_host_tile_capacity(mut self, tiles: usize) -> Self {
        self.host_tile_capacity = Some(tiles);
        self
    }

    /// Limit how many tiles each device holds
    pub fn with_device_tile_capacity(mut self, tiles: usize) -> Self {
        self.device_tile_capacity = Some(tiles);
        self
    }

    /// Enable or disable the host batched back-end
    pub fn with_host_batch(mut self, enabled: bool) -> Self {
        self.host_batch = enabled;
        self
    }

    /// Whether batched host calls can run in this build and configuration
    pub fn host_batch_available(&self) -> bool {
        cfg!(feature = "host-batch") && self.host_batch
    }

    /// Reject settings no engine can be built from
    pub fn validate(&self) -> Result<()> {
        if self.host_threads == Some(0) {
            return Err(Error::invalid_argument("host_threads", "must be at least 1"));
        }
        if self.num_devices > 0 && self.queues_per_device == 0 {
            return Err(Error::invalid_argument(
                "queues_per_device",
                "devices need at least one queue",
            ));
        }
        if self.device_workers == Some(0) {
            return Err(Error::invalid_argument("device_workers", "must be at least 1"));
        }
        if self.device_block_size == 0 {
            return Err(Error::invalid_argument(
                "device_block_size",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Per-call dispatch options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Realization to run
    pub target: Target,
    /// Base priority of the units spawned by one call.
    ///
    /// Units of a call start highest priority first; diagonal tiles of the
    /// update go one level above this. Separate calls never interleave, so
    /// the value only orders work within a call.
    pub priority: i32,
    /// Device queue slot
    pub queue_index: usize,
    /// Layout tiles are converted to before computing
    pub layout: TileLayout,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            target: Target::HostTask,
            priority: 0,
            queue_index: 0,
            layout: TileLayout::ColMajor,
        }
    }
}

impl Options {
    /// Default options for `target`
    pub fn new(target: Target) -> Self {
        Self {
            target,
            ..Self::default()
        }
    }

    /// Set the base priority of the spawned units
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the device queue slot
    pub fn with_queue_index(mut self, queue_index: usize) -> Self {
        self.queue_index = queue_index;
        self
    }

    /// Set the tile layout
    pub fn with_layout(mut self, layout: TileLayout) -> Self {
        self.layout = layout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.num_devices, 0);
        assert_eq!(config.queues_per_device, 2);
        assert_eq!(config.device_block_size, 512);
        assert!(config.validate().is_ok());
        assert_eq!(Options::default().target, Target::HostTask);
    }

    #[test]
    fn test_builder_and_validate() {
        let config = EngineConfig::new()
            .with_num_devices(2)
            .with_queues_per_device(0);
        assert!(config.validate().is_err());

        let config = EngineConfig::new().with_device_block_size(0);
        assert!(config.validate().is_err());

        let config = EngineConfig::new()
            .with_num_devices(3)
            .with_device_tile_capacity(8)
            .with_host_batch(false);
        assert!(config.validate().is_ok());
        assert!(!config.host_batch_available());
    }

    #[test]
    fn test_from_env_overrides() {
        let vars = [
            ("TILR_NUM_DEVICES", "3"),
            ("TILR_DEVICE_CAPACITY", "16"),
            ("TILR_HOST_BATCH", "off"),
            ("TILR_HOST_THREADS", "many"),
            ("TILR_DEVICE_BLOCK_SIZE", "0"),
            ("TILR_QUEUES_PER_DEVICE", "-1"),
        ];
        // SAFETY: no other test reads or writes TILR_* variables.
        unsafe {
            for (name, value) in vars {
                std::env::set_var(name, value);
            }
        }
        let config = EngineConfig::from_env();
        unsafe {
            for (name, _) in vars {
                std::env::remove_var(name);
            }
        }

        assert_eq!(config.num_devices, 3);
        assert_eq!(config.device_tile_capacity, Some(16));
        assert!(!config.host_batch);
        // unparsable and zero values keep the defaults
        let defaults = EngineConfig::default();
        assert_eq!(config.host_threads, defaults.host_threads);
        assert_eq!(config.device_block_size, 512);
        assert_eq!(config.queues_per_device, 2);
        assert!(config.validate().is_ok());
    }
}
