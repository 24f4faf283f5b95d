//! Device-side kernels: batched BLAS launches and tile-batch norm reductions
//!
//! Everything here enqueues work on a [`DeviceQueue`](crate::runtime::DeviceQueue)
//! and returns immediately; results are valid after the queue is synchronized.
//! Argument errors detected before a launch are returned as
//! [`Error::InvalidArgument`](crate::error::Error::InvalidArgument). A kernel
//! that faults while running reports a [`DeviceFault`], which the queue treats
//! as fatal.

mod blas;
mod henorm;

pub use blas::{gemm_batch, gemm_batch_pair, syr2k, syr2k_batch};
pub use henorm::henorm;

use std::fmt;

/// Execution fault reported by a device kernel
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceFault {
    /// Kernel that faulted
    pub kernel: &'static str,
    /// What went wrong
    pub reason: String,
}

impl DeviceFault {
    /// Fault of `kernel`
    pub fn new(kernel: &'static str, reason: impl Into<String>) -> Self {
        Self {
            kernel,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DeviceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kernel, self.reason)
    }
}

impl std::error::Error for DeviceFault {}
