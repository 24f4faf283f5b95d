//! Accelerator devices emulated on host thread pools

mod client;
mod device;
mod queue;

pub use client::AccelClient;
pub use device::AccelDevice;
pub use queue::DeviceQueue;
