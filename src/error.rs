//! Error types for tilr

use crate::tile::MemorySpace;
use thiserror::Error;

/// Result type alias using tilr's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tilr operations
///
/// Device execution faults are not represented here: a fault reported by a
/// device launch is fatal and surfaces as a panic when the queue is
/// synchronized (see [`crate::device::DeviceFault`]).
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// A memory space has no room for a tile and nothing in it can be evicted
    #[error("Resource exhausted: {space} is full ({capacity} tiles) and no tile is evictable")]
    ResourceExhausted {
        /// Memory space that ran out of room
        space: MemorySpace,
        /// Capacity of the space in tiles
        capacity: usize,
    },

    /// The selected realization needs a back-end feature that is not available
    #[error("Unsupported configuration for {target}: {reason}")]
    UnsupportedConfiguration {
        /// The execution target that was selected
        target: &'static str,
        /// What is missing
        reason: String,
    },

    /// A tile is neither locally owned nor present as a received copy
    #[error("Tile ({row}, {col}) is not present on this process")]
    TileMissing {
        /// Tile row index (storage coordinates)
        row: usize,
        /// Tile column index (storage coordinates)
        col: usize,
    },

    /// An acquisition conflicts with a tile guard that is still alive
    #[error("Tile ({row}, {col}) in {space} is held by a conflicting guard")]
    TileBusy {
        /// Tile row index (storage coordinates)
        row: usize,
        /// Tile column index (storage coordinates)
        col: usize,
        /// Memory space of the conflicting instance
        space: MemorySpace,
    },

    /// Backend-specific error
    #[error("Backend error: {0}")]
    Backend(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }

    /// Create an unsupported configuration error
    pub fn unsupported(target: &'static str, reason: impl Into<String>) -> Self {
        Self::UnsupportedConfiguration {
            target,
            reason: reason.into(),
        }
    }

    /// Create a shape mismatch error for argument `arg`
    pub fn shape_mismatch(arg: &'static str, expected: (usize, usize), got: (usize, usize)) -> Self {
        Self::InvalidArgument {
            arg,
            reason: format!(
                "shape mismatch: expected {}x{}, got {}x{}",
                expected.0, expected.1, got.0, got.1
            ),
        }
    }

    /// True for errors caused by running out of tile storage
    pub fn is_resource_error(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. })
    }
}
