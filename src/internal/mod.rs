//! Target dispatch of tile-level kernels
//!
//! An internal kernel performs one step of a blocked algorithm (here the
//! update by a single block column) over all local tiles of its output. The
//! [`Target`] tag picks how the tile products are executed; every target
//! computes the same result.

mod syr2k;

pub use syr2k::syr2k;

use std::fmt;

/// Execution target of an internal kernel
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Target {
    /// One host task per output tile
    #[default]
    HostTask,
    /// Host tasks for diagonal tiles, one flattened parallel loop for the rest
    HostNest,
    /// Off-diagonal tiles in batched host calls
    HostBatch,
    /// Batched calls on the devices tiles are assigned to
    Devices,
}

impl Target {
    /// Name used in logs and errors
    pub fn name(self) -> &'static str {
        match self {
            Self::HostTask => "HostTask",
            Self::HostNest => "HostNest",
            Self::HostBatch => "HostBatch",
            Self::Devices => "Devices",
        }
    }

    /// Every target
    pub const ALL: [Target; 4] = [Self::HostTask, Self::HostNest, Self::HostBatch, Self::Devices];
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
