//! Host runtime
//!
//! The host owns one rayon thread pool. Dispatcher calls build a
//! [`TaskGraph`] of tile-level units, spawn them on the pool, and join them
//! at a single barrier; unit errors are funneled through an [`ErrorSlot`].

mod client;
mod device;
mod tasks;

pub use client::CpuClient;
pub use device::CpuDevice;
pub use tasks::{ErrorSlot, Schedule, TaskGraph};
