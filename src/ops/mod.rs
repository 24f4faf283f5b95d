//! Public drivers over distributed matrices
//!
//! Drivers split an operation into internal steps and dispatch each one to
//! the target named in [`Options`](crate::config::Options).

mod norm;
mod syr2k;

pub use norm::norm;
pub use syr2k::syr2k;
